//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 청크 텍스트와 질의 텍스트를 같은 차원의 벡터로 변환합니다.
//! 적재와 검색은 반드시 같은 프로바이더/모델을 사용해야 합니다.
//!
//! - [`GeminiEmbedding`]: Google Gemini `batchEmbedContents`
//! - [`OpenAiCompatEmbedding`]: OpenAI 호환 `/embeddings` 엔드포인트
//!
//! 재시도는 하지 않습니다. 실패는 그대로 호출자에게 전달됩니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&config.embedding)?;
//! let vectors = embedder.embed_batch(&texts).await?;
//! ```

mod gemini;
mod openai;

pub use gemini::{GeminiEmbedding, GEMINI_MAX_BATCH_SIZE};
pub use openai::OpenAiCompatEmbedding;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::error::{RagError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 문서 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    ///
    /// 결과 순서는 입력 순서와 같습니다.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 검색 질의 임베딩 (기본 구현: 문서와 동일)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

/// 응답 벡터 검증
///
/// 입력 개수와 응답 개수, 모든 벡터의 차원이 맞아야 합니다.
pub(crate) fn check_vectors(
    provider: &str,
    inputs: usize,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != inputs {
        return Err(RagError::Embedding(format!(
            "{} returned {} embeddings for {} inputs",
            provider,
            vectors.len(),
            inputs
        )));
    }

    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(RagError::Embedding(format!(
            "{} returned a {}-dimensional vector, expected {}",
            provider,
            bad.len(),
            dimension
        )));
    }

    Ok(vectors)
}

// ============================================================================
// API Key Management
// ============================================================================

/// Gemini API 키 환경변수 (우선순위 순)
const GEMINI_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];

/// OpenAI 호환 API 키 기본 환경변수
pub const DEFAULT_OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";

/// 비어있지 않은 첫 번째 환경변수 값
fn first_env(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| {
                tracing::debug!("Using API key from {}", name);
                value
            })
    })
}

/// Gemini API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    first_env(&GEMINI_KEY_VARS).ok_or_else(|| {
        RagError::Config(
            "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
             Get your API key at: https://aistudio.google.com/app/apikey"
                .to_string(),
        )
    })
}

/// Gemini API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    first_env(&GEMINI_KEY_VARS).is_some()
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbeddingProviderKind::Gemini => {
            let api_key = get_api_key()?;
            Arc::new(GeminiEmbedding::from_config(api_key, config)?)
        }
        EmbeddingProviderKind::OpenAi => {
            let key_var = config
                .api_key_env
                .as_deref()
                .unwrap_or(DEFAULT_OPENAI_KEY_VAR);
            let api_key = first_env(&[key_var]);

            // 자체 호스팅 서버는 키 없이 허용, 공식 엔드포인트는 키 필수
            if api_key.is_none() && config.base_url.is_none() {
                return Err(RagError::Config(format!(
                    "{} not set. Set it or configure embedding.base_url for a self-hosted server",
                    key_var
                )));
            }
            Arc::new(OpenAiCompatEmbedding::from_config(api_key, config)?)
        }
    };

    tracing::info!(
        "Using {} embedding (model: {}, dimension: {})",
        embedder.name(),
        config.model,
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================
