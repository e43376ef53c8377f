//! OpenAI 호환 임베딩
//!
//! `POST {base_url}/embeddings` 형식을 쓰는 모든 서버를 지원합니다.
//! OpenAI 외에도 sentence-transformers 모델
//! (예: `paraphrase-multilingual-MiniLM-L12-v2`, 384차원)을 서빙하는
//! 자체 호스팅 서버에 사용합니다.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

use super::{check_vectors, EmbeddingProvider};

/// OpenAI 기본 주소
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// OpenAI 호환 임베딩 구현체
#[derive(Debug, Clone)]
pub struct OpenAiCompatEmbedding {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl OpenAiCompatEmbedding {
    /// 새 인스턴스 생성
    ///
    /// `api_key`가 없으면 `Authorization` 헤더 없이 요청합니다.
    pub fn new(
        api_key: Option<String>,
        base_url: &str,
        model: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(RagError::Config("missing embedding model name".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            let auth = format!("Bearer {}", key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth)
                    .map_err(|_| RagError::Config("invalid embedding API key".to_string()))?,
            );
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimension,
        })
    }

    /// 설정으로 생성
    pub fn from_config(api_key: Option<String>, config: &EmbeddingConfig) -> Result<Self> {
        Self::new(
            api_key,
            config.base_url.as_deref().unwrap_or(OPENAI_API_BASE),
            &config.model,
            config.dimension,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("Empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::from_transport(e, RagError::Embedding))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::Embedding(format!(
                "embeddings request failed ({}): {}",
                status, body
            )));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            RagError::Embedding(format!("Failed to parse embedding response: {}", e))
        })?;
        parsed.data.sort_by_key(|entry| entry.index);

        let vectors = parsed.data.into_iter().map(|entry| entry.embedding).collect();
        check_vectors("embeddings endpoint", texts.len(), self.dimension, vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

// ============================================================================
// Tests
// ============================================================================
