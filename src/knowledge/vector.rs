//! Vector Index - 벡터 인덱스 트레이트 및 유틸리티
//!
//! 파이프라인과 검색기는 이 트레이트에만 의존합니다.
//! 구현체: `QdrantIndex` (REST), `InMemoryIndex` (프로세스 메모리)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::record::Chunk;

// ============================================================================
// Types
// ============================================================================

/// 저장할 항목 (ID는 인덱스가 부여)
#[derive(Debug, Clone)]
pub struct IndexItem {
    /// 임베딩 벡터
    pub vector: Vec<f32>,
    /// payload (청크 텍스트 + 메타데이터)
    pub payload: Chunk,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub payload: Chunk,
    /// 코사인 유사도 (높을수록 유사)
    pub score: f32,
}

/// payload 필드 완전 일치 필터
///
/// `key`는 점으로 구분된 payload 경로입니다 (예: `metadata.category`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMatch {
    pub key: String,
    pub value: String,
}

impl FieldMatch {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// payload JSON이 필터를 만족하는지 확인
    pub fn matches(&self, payload: &serde_json::Value) -> bool {
        self.key
            .split('.')
            .try_fold(payload, |value, segment| value.get(segment))
            .and_then(|value| value.as_str())
            .map(|value| value == self.value)
            .unwrap_or(false)
    }
}

/// 포인트 ID (Qdrant는 UUID 문자열 또는 정수)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(String),
}

/// scroll 한 페이지
#[derive(Debug, Clone)]
pub struct ScrollPage {
    /// 이 페이지의 포인트 수
    pub points: usize,
    /// 다음 페이지 커서 (`None`이면 마지막 페이지)
    pub next_offset: Option<PointId>,
}

/// 컬렉션 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    /// 벡터 차원
    pub dimension: usize,
    /// 저장된 포인트 수
    pub points_count: usize,
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// 벡터 인덱스 어댑터 (async)
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 컬렉션 준비
    ///
    /// `recreate`면 기존 컬렉션을 삭제(없어도 에러 아님)한 뒤 빈 컬렉션을 생성합니다.
    /// 아니면 없을 때만 생성하고, 있으면 차원이 `dim`과 같은지 확인합니다.
    async fn ensure_collection(&self, name: &str, dim: usize, recreate: bool) -> Result<()>;

    /// 컬렉션 정보 (없으면 `None`)
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// 벡터 배치 삽입 (호출 단위 원자적), 저장된 개수 반환
    async fn upsert(&self, collection: &str, items: Vec<IndexItem>) -> Result<usize>;

    /// 최근접 이웃 검색 (유사도 내림차순)
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&FieldMatch>,
    ) -> Result<Vec<SearchResult>>;

    /// 필터에 맞는 포인트 한 페이지 조회
    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&FieldMatch>,
        offset: Option<PointId>,
        limit: usize,
    ) -> Result<ScrollPage>;

    /// scroll 요청당 최대 포인트 수
    fn page_size(&self) -> usize;

    /// 인덱스 이름
    fn name(&self) -> &str;

    /// 필터에 맞는 정확한 포인트 수
    ///
    /// 저장소의 페이지 크기 제한 때문에 커서가 끝날 때까지 scroll을 반복합니다.
    async fn count(&self, collection: &str, filter: Option<&FieldMatch>) -> Result<usize> {
        let limit = self.page_size().max(1);
        let mut total = 0;
        let mut offset = None;
        let mut pages = 0usize;

        loop {
            let page = self.scroll(collection, filter, offset, limit).await?;
            total += page.points;
            pages += 1;

            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        tracing::debug!(
            "Counted {} points in {} ({} pages, filter={:?})",
            total,
            collection,
            pages,
            filter
        );
        Ok(total)
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 보험 유형 필터 생성
pub fn category_filter(category: &str) -> FieldMatch {
    FieldMatch::new(super::record::CATEGORY_KEY, category)
}

// ============================================================================
// Tests
// ============================================================================
