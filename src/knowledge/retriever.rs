//! Filtered Retriever - 보험 유형 필터 검색
//!
//! 질의를 임베딩한 뒤 `metadata.category` 완전 일치 필터로 k-NN 검색합니다.
//! 허용 목록에 없는 유형은 임베딩/인덱스 호출 전에 거부합니다.

use std::sync::Arc;

use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::record::ChunkMetadata;
use super::vector::{category_filter, VectorIndex};

/// 검색된 청크
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// 인덱스가 반환한 유사도
    pub score: f32,
}

/// 보험 유형별 청크 수
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    /// 허용 목록 순서
    pub per_category: Vec<(String, usize)>,
    /// 필터 없는 전체 수
    pub total: usize,
}

impl CategoryCounts {
    /// 허용 목록 밖의 유형으로 저장된 청크 수
    pub fn uncategorized(&self) -> usize {
        let categorized: usize = self.per_category.iter().map(|(_, n)| n).sum();
        self.total.saturating_sub(categorized)
    }
}

/// 필터 검색기
pub struct FilteredRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    collection: String,
    top_k: usize,
    allowed_categories: Vec<String>,
}

impl FilteredRetriever {
    /// 설정으로 생성
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            embedder,
            index,
            collection: config.collection_name.clone(),
            top_k: config.top_k,
            allowed_categories: config.allowed_categories.clone(),
        }
    }

    /// 결과 개수 변경
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn allowed_categories(&self) -> &[String] {
        &self.allowed_categories
    }

    /// 보험 유형 검증 (앞뒤 공백 제거 후 비교)
    pub fn validate_category<'a>(&self, category: &'a str) -> Result<&'a str> {
        validate_category(&self.allowed_categories, category)
    }

    /// 질의와 유사한 청크 검색
    ///
    /// `category`가 공백뿐이면 필터 없이 검색합니다.
    /// 빈 질의는 네트워크 호출 없이 빈 결과입니다.
    pub async fn retrieve(&self, query: &str, category: Option<&str>) -> Result<Vec<RetrievedChunk>> {
        let category = match category.map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => Some(self.validate_category(c)?),
            None => None,
        };

        let query = query.trim();
        if query.is_empty() {
            return Ok(vec![]);
        }

        let vector = self.embedder.embed_query(query).await?;
        let filter = category.map(category_filter);

        let results = self
            .index
            .search(&self.collection, &vector, self.top_k, filter.as_ref())
            .await?;

        tracing::debug!(
            "Retrieved {} chunks for query (category={:?})",
            results.len(),
            category
        );

        Ok(results
            .into_iter()
            .map(|r| RetrievedChunk {
                text: r.payload.text,
                metadata: r.payload.metadata,
                score: r.score,
            })
            .collect())
    }

    /// 보험 유형별 정확한 청크 수
    pub async fn category_counts(&self) -> Result<CategoryCounts> {
        count_by_category(self.index.as_ref(), &self.collection, &self.allowed_categories).await
    }
}

/// 허용 목록 기준 보험 유형 검증
pub fn validate_category<'a>(allowed: &[String], category: &'a str) -> Result<&'a str> {
    let category = category.trim();
    if allowed.iter().any(|c| c == category) {
        Ok(category)
    } else {
        Err(RagError::InvalidCategory {
            category: category.to_string(),
            allowed: allowed.to_vec(),
        })
    }
}

/// 유형별 청크 수와 전체 수 집계 (임베딩 불필요)
pub async fn count_by_category(
    index: &dyn VectorIndex,
    collection: &str,
    categories: &[String],
) -> Result<CategoryCounts> {
    let mut per_category = Vec::with_capacity(categories.len());
    for category in categories {
        let filter = category_filter(category);
        let count = index.count(collection, Some(&filter)).await?;
        per_category.push((category.clone(), count));
    }

    let total = index.count(collection, None).await?;
    Ok(CategoryCounts {
        per_category,
        total,
    })
}

// ============================================================================
// Tests
// ============================================================================
