//! Qdrant Vector Index - REST API 어댑터
//!
//! source: https://api.qdrant.tech/api-reference
//!
//! - 컬렉션 생성/삭제/조회: `/collections/{name}`
//! - 포인트 upsert: `PUT /collections/{name}/points?wait=true`
//! - 필터 검색: `POST /collections/{name}/points/search`
//! - 페이지 순회: `POST /collections/{name}/points/scroll`
//!
//! 연결 실패/타임아웃은 `Connectivity`, 404/400은 `SchemaMismatch`로 구분합니다.
//! 재시도는 하지 않습니다.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::QdrantConfig;
use crate::error::{RagError, Result};

use super::record::Chunk;
use super::vector::{
    CollectionInfo, FieldMatch, IndexItem, PointId, ScrollPage, SearchResult, VectorIndex,
};

// ============================================================================
// Wire Types
// ============================================================================

/// Qdrant 응답 봉투
#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Serialize)]
struct Point<'a> {
    id: String,
    vector: &'a [f32],
    payload: &'a Chunk,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    points: Vec<Point<'a>>,
}

#[derive(Debug, Deserialize)]
struct UpdateResult {
    status: String,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    filter: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    #[serde(default)]
    score: f32,
    payload: Option<serde_json::Value>,
}

/// `offset`/`filter`는 `null`이어도 항상 보냅니다 (Qdrant는 null을 미지정으로 처리)
#[derive(Debug, Serialize)]
struct ScrollRequest {
    limit: usize,
    offset: Option<PointId>,
    filter: Option<serde_json::Value>,
    with_payload: bool,
    with_vector: bool,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<IgnoredAny>,
    next_page_offset: Option<PointId>,
}

/// 단일 필드 완전 일치 필터
fn filter_json(filter: &FieldMatch) -> serde_json::Value {
    serde_json::json!({
        "must": [
            { "key": filter.key, "match": { "value": filter.value } }
        ]
    })
}

// ============================================================================
// QdrantIndex
// ============================================================================

/// Qdrant REST 벡터 인덱스
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    page_size: usize,
}

impl QdrantIndex {
    /// 설정으로 생성
    pub fn new(config: &QdrantConfig) -> Result<Self> {
        Self::with_base_url(
            &config.base_url()?,
            config.api_key.as_deref(),
            config.page_size,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// 주소 지정하여 생성
    pub fn with_base_url(
        base_url: &str,
        api_key: Option<&str>,
        page_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            headers.insert(
                "api-key",
                HeaderValue::from_str(key.trim())
                    .map_err(|_| RagError::Config("invalid Qdrant API key".to_string()))?,
            );
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: page_size.max(1),
        })
    }

    /// REST 기본 주소
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, name: &str, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, name, suffix)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| RagError::from_transport(e, RagError::Index))
    }

    /// 성공 응답 본문을 JSON으로 파싱
    async fn parse<T: for<'de> Deserialize<'de>>(response: Response, action: &str) -> Result<T> {
        let response = Self::check_status(response, action).await?;
        let body: QdrantResponse<T> = response
            .json()
            .await
            .map_err(|e| RagError::Index(format!("Failed to parse {} response: {}", action, e)))?;
        Ok(body.result)
    }

    /// 상태 코드 분류
    async fn check_status(response: Response, action: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());

        Err(match status {
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
                RagError::SchemaMismatch(format!("{} failed ({}): {}", action, status, body))
            }
            _ => RagError::Index(format!("{} failed ({}): {}", action, status, body)),
        })
    }

    /// 컬렉션 삭제 (없어도 성공)
    async fn delete_collection(&self, name: &str) -> Result<()> {
        let response = self
            .send(self.client.delete(self.collection_url(name, "")))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check_status(response, "delete collection").await?;
        tracing::info!("Deleted Qdrant collection {}", name);
        Ok(())
    }

    /// 빈 컬렉션 생성 (코사인 거리)
    async fn create_collection(&self, name: &str, dim: usize) -> Result<()> {
        let body = serde_json::json!({
            "vectors": { "size": dim, "distance": "Cosine" }
        });
        let response = self
            .send(self.client.put(self.collection_url(name, "")).json(&body))
            .await?;
        Self::check_status(response, "create collection").await?;
        tracing::info!("Created Qdrant collection {} (dim={})", name, dim);
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self, name: &str, dim: usize, recreate: bool) -> Result<()> {
        if recreate {
            self.delete_collection(name).await?;
        } else if let Some(info) = self.collection_info(name).await? {
            if info.dimension != dim {
                return Err(RagError::SchemaMismatch(format!(
                    "collection '{}' has dimension {}, embedding provider produces {}; recreate the collection",
                    name, info.dimension, dim
                )));
            }
            return Ok(());
        }

        self.create_collection(name, dim).await
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let response = self
            .send(self.client.get(self.collection_url(name, "")))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let result: serde_json::Value = Self::parse(response, "get collection").await?;
        let dimension = result["config"]["params"]["vectors"]["size"]
            .as_u64()
            .ok_or_else(|| {
                RagError::SchemaMismatch(format!(
                    "collection '{}' does not use a single unnamed vector",
                    name
                ))
            })?;
        let points_count = result["points_count"].as_u64().unwrap_or(0);

        Ok(Some(CollectionInfo {
            dimension: dimension as usize,
            points_count: points_count as usize,
        }))
    }

    async fn upsert(&self, collection: &str, items: Vec<IndexItem>) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let request = UpsertRequest {
            points: items
                .iter()
                .map(|item| Point {
                    id: Uuid::new_v4().to_string(),
                    vector: &item.vector,
                    payload: &item.payload,
                })
                .collect(),
        };

        let response = self
            .send(
                self.client
                    .put(self.collection_url(collection, "/points"))
                    .query(&[("wait", "true")])
                    .json(&request),
            )
            .await?;

        let result: UpdateResult = Self::parse(response, "upsert points").await?;
        if result.status != "completed" && result.status != "acknowledged" {
            return Err(RagError::Index(format!(
                "upsert of {} points finished with status '{}'",
                items.len(),
                result.status
            )));
        }

        Ok(items.len())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&FieldMatch>,
    ) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(vec![]);
        }

        let request = SearchRequest {
            vector,
            limit: k,
            with_payload: true,
            filter: filter.map(filter_json),
        };

        let response = self
            .send(
                self.client
                    .post(self.collection_url(collection, "/points/search"))
                    .json(&request),
            )
            .await?;

        let points: Vec<ScoredPoint> = Self::parse(response, "search points").await?;

        let mut results = Vec::with_capacity(points.len());
        for point in points {
            let payload = point
                .payload
                .and_then(|p| serde_json::from_value::<Chunk>(p).ok());
            match payload {
                Some(payload) => results.push(SearchResult {
                    payload,
                    score: point.score,
                }),
                None => tracing::warn!("Skipping point with unexpected payload in {}", collection),
            }
        }

        Ok(results)
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: Option<&FieldMatch>,
        offset: Option<PointId>,
        limit: usize,
    ) -> Result<ScrollPage> {
        let request = ScrollRequest {
            limit,
            offset,
            filter: filter.map(filter_json),
            with_payload: false,
            with_vector: false,
        };

        let response = self
            .send(
                self.client
                    .post(self.collection_url(collection, "/points/scroll"))
                    .json(&request),
            )
            .await?;

        let result: ScrollResult = Self::parse(response, "scroll points").await?;
        Ok(ScrollPage {
            points: result.points.len(),
            next_offset: result.next_page_offset,
        })
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

// ============================================================================
// Tests
// ============================================================================
