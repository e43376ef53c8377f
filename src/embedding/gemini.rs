//! Google Gemini 임베딩
//!
//! source: https://ai.google.dev/gemini-api/docs/embeddings
//!
//! 여러 텍스트를 `batchEmbedContents` 한 번으로 보냅니다.
//! 문서는 `RETRIEVAL_DOCUMENT`, 질의는 `RETRIEVAL_QUERY` 태스크 타입을 씁니다.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

use super::{check_vectors, EmbeddingProvider};

/// Gemini API 기본 주소
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// `batchEmbedContents` 한 번에 보낼 수 있는 최대 요청 수
pub const GEMINI_MAX_BATCH_SIZE: usize = 100;

/// MRL 권장 차원
const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// 임베딩 태스크 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    model: String,
    dimension: usize,
    base_url: String,
}

impl GeminiEmbedding {
    /// 새 Gemini 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `model` - 모델 이름 (예: `gemini-embedding-001`)
    /// * `dimension` - 임베딩 차원 (768, 1536, 3072 중 선택)
    pub fn new(api_key: String, model: &str, dimension: usize, timeout: Duration) -> Result<Self> {
        if !SUPPORTED_DIMENSIONS.contains(&dimension) {
            return Err(RagError::Config(format!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            client,
            model: model.trim_start_matches("models/").to_string(),
            dimension,
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    /// 설정으로 생성
    pub fn from_config(api_key: String, config: &EmbeddingConfig) -> Result<Self> {
        let embedder = Self::new(
            api_key,
            &config.model,
            config.dimension,
            Duration::from_secs(config.timeout_secs),
        )?;

        Ok(match &config.base_url {
            Some(base_url) => embedder.with_base_url(base_url),
            None => embedder,
        })
    }

    /// API 주소 변경 (프록시, 테스트 서버)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn batch_url(&self) -> String {
        format!("{}/models/{}:batchEmbedContents", self.base_url, self.model)
    }

    /// `batchEmbedContents` 호출
    async fn request(&self, texts: &[String], task_type: TaskType) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let model = format!("models/{}", self.model);
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: &model,
                    content: EmbedContent {
                        parts: vec![EmbedPart { text }],
                    },
                    task_type,
                    output_dimensionality: self.dimension,
                })
                .collect(),
        };

        // API 키는 URL이 아닌 헤더로 전송
        let response = self
            .client
            .post(self.batch_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::from_transport(e, RagError::Embedding))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RagError::from_transport(e, RagError::Embedding))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
                return Err(RagError::Embedding(format!(
                    "Gemini API error ({}): {}",
                    error.error.status, error.error.message
                )));
            }
            return Err(RagError::Embedding(format!(
                "Gemini API error ({}): {}",
                status, body
            )));
        }

        let parsed: BatchEmbedResponse = serde_json::from_str(&body).map_err(|e| {
            RagError::Embedding(format!("Failed to parse embedding response: {}", e))
        })?;

        let vectors = parsed.embeddings.into_iter().map(|e| e.values).collect();
        check_vectors("Gemini", texts.len(), self.dimension, vectors)
    }
}

/// Gemini 배치 요청 본문
#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: EmbedContent<'a>,
    task_type: TaskType,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<EmbedPart<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

/// Gemini 배치 응답
#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .request(&[text.to_string()], TaskType::RetrievalDocument)
            .await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("Empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        tracing::debug!("Embedding batch of {} texts", texts.len());
        self.request(texts, TaskType::RetrievalDocument).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .request(&[text.to_string()], TaskType::RetrievalQuery)
            .await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("Empty embedding response".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const BATCH_PATH: &str = "/models/gemini-embedding-001:batchEmbedContents";

    fn embedder_for(server: &Server) -> GeminiEmbedding {
        GeminiEmbedding::new(
            "fake_key".to_string(),
            "gemini-embedding-001",
            768,
            Duration::from_secs(5),
        )
        .unwrap()
        .with_base_url(&server.url())
    }

    fn values(n: usize, dim: usize) -> serde_json::Value {
        let embeddings: Vec<serde_json::Value> = (0..n)
            .map(|i| json!({ "values": vec![i as f32 * 0.01; dim] }))
            .collect();
        json!({ "embeddings": embeddings })
    }

    #[test]
    fn test_invalid_dimension() {
        let result = GeminiEmbedding::new(
            "fake_key".to_string(),
            "gemini-embedding-001",
            999,
            Duration::from_secs(5),
        );
        let err = result.err();
        assert!(err
            .as_ref()
            .map(|e| e.to_string().contains("Invalid dimension"))
            .unwrap_or(false));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in [768, 1536, 3072] {
            let result = GeminiEmbedding::new(
                "fake_key".to_string(),
                "models/gemini-embedding-001",
                dim,
                Duration::from_secs(5),
            );
            assert!(result.is_ok());
        }
    }

    #[tokio::test]
    async fn test_batch_uses_document_task() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", BATCH_PATH)
            .match_header("x-goog-api-key", "fake_key")
            .match_body(Matcher::Regex(r#""taskType":"RETRIEVAL_DOCUMENT""#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(values(3, 768).to_string())
            .expect(1)
            .create_async()
            .await;

        let embedder = embedder_for(&server);
        let texts: Vec<String> = ["제1조", "제2조", "제3조"].iter().map(|s| s.to_string()).collect();
        let vectors = embedder.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 768));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_uses_query_task() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", BATCH_PATH)
            .match_body(Matcher::Regex(r#""taskType":"RETRIEVAL_QUERY""#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(values(1, 768).to_string())
            .expect(1)
            .create_async()
            .await;

        let embedder = embedder_for(&server);
        let vector = embedder.embed_query("화재 보상 범위").await.unwrap();
        assert_eq!(vector.len(), 768);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", BATCH_PATH)
            .with_status(429)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "error": { "code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED" } })
                    .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let embedder = embedder_for(&server);
        let err = embedder.embed("제1조").await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert!(err.to_string().contains("RESOURCE_EXHAUSTED"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", BATCH_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(values(1, 384).to_string())
            .create_async()
            .await;

        let embedder = embedder_for(&server);
        let err = embedder.embed("제1조").await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let server = Server::new_async().await;
        let embedder = embedder_for(&server);
        assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
    }
}
