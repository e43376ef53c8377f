//! In-Memory Vector Index
//!
//! `VectorIndex` 계약을 프로세스 메모리로 구현합니다.
//! 테스트와 오프라인 실행에서 Qdrant 대신 사용합니다.
//! scroll 페이지 크기를 조절할 수 있어 페이지 순회 로직 검증에 쓰입니다.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{RagError, Result};

use super::vector::{
    cosine_similarity, CollectionInfo, FieldMatch, IndexItem, PointId, ScrollPage, SearchResult,
    VectorIndex,
};

/// 기본 scroll 페이지 크기
const DEFAULT_PAGE_SIZE: usize = 256;

/// 저장된 포인트
#[derive(Debug, Clone)]
struct StoredPoint {
    id: u64,
    vector: Vec<f32>,
    payload: super::record::Chunk,
    /// 필터 평가용 JSON
    payload_json: serde_json::Value,
}

#[derive(Debug, Default)]
struct MemoryCollection {
    dimension: usize,
    points: Vec<StoredPoint>,
    next_id: u64,
}

/// 메모리 벡터 인덱스
pub struct InMemoryIndex {
    collections: Mutex<HashMap<String, MemoryCollection>>,
    page_size: usize,
}

impl InMemoryIndex {
    /// 기본 페이지 크기로 생성
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// 페이지 크기 지정 (최소 1)
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            page_size: page_size.max(1),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, MemoryCollection>>> {
        self.collections
            .lock()
            .map_err(|e| RagError::Index(format!("Lock error: {}", e)))
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_collection(name: &str) -> RagError {
    RagError::SchemaMismatch(format!("collection '{}' does not exist", name))
}

fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(RagError::SchemaMismatch(format!(
            "vector dimension {} does not match collection dimension {}",
            actual, expected
        )));
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_collection(&self, name: &str, dim: usize, recreate: bool) -> Result<()> {
        let mut collections = self.lock()?;

        if recreate {
            collections.remove(name);
        }

        match collections.get(name) {
            Some(existing) => check_dimension(existing.dimension, dim),
            None => {
                collections.insert(
                    name.to_string(),
                    MemoryCollection {
                        dimension: dim,
                        ..Default::default()
                    },
                );
                tracing::debug!("Created in-memory collection {} (dim={})", name, dim);
                Ok(())
            }
        }
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let collections = self.lock()?;
        Ok(collections.get(name).map(|c| CollectionInfo {
            dimension: c.dimension,
            points_count: c.points.len(),
        }))
    }

    async fn upsert(&self, collection: &str, items: Vec<IndexItem>) -> Result<usize> {
        let mut collections = self.lock()?;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;

        // 전부 검증한 뒤에만 삽입 (호출 단위 원자성)
        for item in &items {
            check_dimension(target.dimension, item.vector.len())?;
        }

        let mut prepared = Vec::with_capacity(items.len());
        for item in items {
            let payload_json = serde_json::to_value(&item.payload)
                .map_err(|e| RagError::Index(format!("Failed to encode payload: {}", e)))?;
            prepared.push((item, payload_json));
        }

        let count = prepared.len();
        for (item, payload_json) in prepared {
            let id = target.next_id;
            target.next_id += 1;
            target.points.push(StoredPoint {
                id,
                vector: item.vector,
                payload: item.payload,
                payload_json,
            });
        }

        Ok(count)
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&FieldMatch>,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.lock()?;
        let target = collections
            .get(collection)
            .ok_or_else(|| missing_collection(collection))?;
        check_dimension(target.dimension, vector.len())?;

        let mut scored: Vec<SearchResult> = target
            .points
            .iter()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload_json)))
            .map(|p| SearchResult {
                payload: p.payload.clone(),
                score: cosine_similarity(vector, &p.vector),
            })
            .collect();

        // 안정 정렬: 동점이면 삽입 순서 유지
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored)
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&FieldMatch>,
        offset: Option<PointId>,
        limit: usize,
    ) -> Result<ScrollPage> {
        let collections = self.lock()?;
        let target = collections
            .get(collection)
            .ok_or_else(|| missing_collection(collection))?;

        let start = match offset {
            None => 0,
            Some(PointId::Num(id)) => id,
            Some(PointId::Uuid(other)) => {
                return Err(RagError::Index(format!("Unexpected scroll offset: {}", other)))
            }
        };

        // 저장소 제한과 같은 방식으로 페이지 크기 상한 적용
        let limit = limit.min(self.page_size).max(1);

        let mut matching = target
            .points
            .iter()
            .filter(|p| p.id >= start)
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload_json)));

        let points = matching.by_ref().take(limit).count();
        let next_offset = matching.next().map(|p| PointId::Num(p.id));

        Ok(ScrollPage {
            points,
            next_offset,
        })
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

// ============================================================================
// Tests
// ============================================================================
