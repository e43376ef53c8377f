//! 설정 모듈
//!
//! 우선순위 (낮음 → 높음):
//! 1. 코드 기본값
//! 2. YAML 설정 파일 (`--config` 경로, 또는 `./insurance-rag.yaml`, `~/.config/insurance-rag/config.yaml`)
//! 3. `INSURANCE_RAG_` 접두사 환경변수 (`__`로 중첩 구분, 예: `INSURANCE_RAG_QDRANT__HOST`)
//!
//! 설정은 시작 시 한 번 로드되어 각 컴포넌트 생성자에 명시적으로 전달됩니다.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::embedding::GEMINI_MAX_BATCH_SIZE;
use crate::error::{RagError, Result};
use crate::knowledge::ChunkConfig;

/// 환경변수 접두사
pub const ENV_PREFIX: &str = "INSURANCE_RAG_";

/// 작업 디렉토리 설정 파일 이름
pub const LOCAL_CONFIG_FILE: &str = "insurance-rag.yaml";

// ============================================================================
// Config Types
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Qdrant 접속 정보
    pub qdrant: QdrantConfig,
    /// 컬렉션 이름 (배포당 하나)
    pub collection_name: String,
    /// 임베딩 프로바이더
    pub embedding: EmbeddingConfig,
    /// 검색 결과 개수
    pub top_k: usize,
    /// 허용된 보험 유형 목록
    pub allowed_categories: Vec<String>,
    /// 청킹 설정
    pub chunk: ChunkConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            qdrant: QdrantConfig::default(),
            collection_name: "insurance_docs".to_string(),
            embedding: EmbeddingConfig::default(),
            top_k: 5,
            allowed_categories: [
                "상해보험",
                "손해보험",
                "연금보험",
                "자동차보험",
                "질병보험",
                "책임보험",
                "화재보험",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            chunk: ChunkConfig::default(),
        }
    }
}

/// Qdrant 접속 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QdrantConfig {
    pub host: String,
    pub port: u16,
    /// `api-key` 헤더 (Qdrant Cloud)
    pub api_key: Option<String>,
    pub https: bool,
    /// scroll 요청당 최대 포인트 수
    pub page_size: usize,
    pub timeout_secs: u64,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6333,
            api_key: None,
            https: false,
            page_size: 1000,
            timeout_secs: 30,
        }
    }
}

impl QdrantConfig {
    /// REST 기본 URL (예: `http://localhost:6333`)
    pub fn base_url(&self) -> Result<String> {
        let scheme = if self.https { "https" } else { "http" };
        let url = Url::parse(&format!("{}://{}:{}", scheme, self.host, self.port))
            .map_err(|e| RagError::Config(format!("invalid Qdrant address: {}", e)))?;
        Ok(url.as_str().trim_end_matches('/').to_string())
    }
}

/// 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Google Gemini (gemini-embedding-001)
    Gemini,
    /// OpenAI 호환 `/embeddings` 엔드포인트
    OpenAi,
}

/// 임베딩 설정
///
/// 모델과 차원은 컬렉션 스키마의 일부입니다.
/// 모델을 바꾸면 반드시 `--recreate`로 다시 적재해야 합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub dimension: usize,
    /// OpenAI 호환 서버 주소 (예: `http://localhost:8080/v1`)
    pub base_url: Option<String>,
    /// API 키를 읽을 환경변수 이름 (OpenAI 호환 전용)
    pub api_key_env: Option<String>,
    /// 배치당 텍스트 수
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Gemini,
            model: "gemini-embedding-001".to_string(),
            dimension: 768,
            base_url: None,
            api_key_env: None,
            batch_size: 32,
            timeout_secs: 30,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl RagConfig {
    /// 설정 로드
    ///
    /// `path`가 주어지면 해당 파일이 반드시 존재해야 합니다.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(RagConfig::default()));

        match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(RagError::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                figment = figment.merge(Yaml::file(path));
            }
            None => {
                for candidate in default_config_paths() {
                    figment = figment.merge(Yaml::file(candidate));
                }
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(figment)
    }

    /// figment에서 추출 후 검증
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: RagConfig = figment
            .extract()
            .map_err(|e| RagError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.collection_name.trim().is_empty() {
            return Err(RagError::Config("collection_name cannot be empty".to_string()));
        }
        if self.qdrant.host.trim().is_empty() {
            return Err(RagError::Config("qdrant.host cannot be empty".to_string()));
        }
        if self.qdrant.page_size == 0 {
            return Err(RagError::Config("qdrant.page_size must be at least 1".to_string()));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be at least 1".to_string()));
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::Config("embedding.dimension must be at least 1".to_string()));
        }
        if self.embedding.batch_size == 0 {
            return Err(RagError::Config("embedding.batch_size must be at least 1".to_string()));
        }
        if self.embedding.provider == EmbeddingProviderKind::Gemini
            && self.embedding.batch_size > GEMINI_MAX_BATCH_SIZE
        {
            return Err(RagError::Config(format!(
                "embedding.batch_size ({}) exceeds the Gemini batch limit of {}",
                self.embedding.batch_size, GEMINI_MAX_BATCH_SIZE
            )));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(RagError::Config("embedding.model cannot be empty".to_string()));
        }
        if self.allowed_categories.is_empty() {
            return Err(RagError::Config("allowed_categories cannot be empty".to_string()));
        }
        if self.allowed_categories.iter().any(|c| c.trim().is_empty()) {
            return Err(RagError::Config("allowed_categories contains an empty entry".to_string()));
        }
        self.chunk.validate()?;
        self.qdrant.base_url()?;
        Ok(())
    }
}

/// 기본 설정 파일 후보 (낮은 우선순위부터)
fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("insurance-rag").join("config.yaml"));
    }
    paths.push(PathBuf::from(LOCAL_CONFIG_FILE));
    paths
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RagConfig::default();
        config.validate().unwrap();
        assert_eq!(config.collection_name, "insurance_docs");
        assert_eq!(config.top_k, 5);
        assert_eq!(config.allowed_categories.len(), 7);
        assert!(config.allowed_categories.contains(&"화재보험".to_string()));
        assert_eq!(config.qdrant.base_url().unwrap(), "http://localhost:6333");
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let yaml = r#"
collection_name: policies
top_k: 3
qdrant:
  host: qdrant.internal
  port: 7333
  page_size: 10
embedding:
  provider: openai
  model: paraphrase-multilingual-MiniLM-L12-v2
  dimension: 384
  base_url: http://localhost:8080/v1
allowed_categories:
  - 화재보험
chunk:
  max_chunk_chars: 800
"#;
        let figment = Figment::new()
            .merge(Serialized::defaults(RagConfig::default()))
            .merge(Yaml::string(yaml));
        let config = RagConfig::from_figment(figment).unwrap();

        assert_eq!(config.collection_name, "policies");
        assert_eq!(config.top_k, 3);
        assert_eq!(config.qdrant.base_url().unwrap(), "http://qdrant.internal:7333");
        assert_eq!(config.qdrant.page_size, 10);
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::OpenAi);
        assert_eq!(config.embedding.dimension, 384);
        assert_eq!(config.allowed_categories, vec!["화재보험".to_string()]);
        assert_eq!(config.chunk.max_chunk_chars, 800);
        // 지정하지 않은 값은 기본값 유지
        assert_eq!(config.chunk.min_chunk_chars, 100);
        assert_eq!(config.embedding.batch_size, 32);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = RagConfig::default();
        config.top_k = 0;
        assert!(matches!(config.validate(), Err(RagError::Config(_))));

        let mut config = RagConfig::default();
        config.allowed_categories.clear();
        assert!(config.validate().is_err());

        let mut config = RagConfig::default();
        config.qdrant.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = RagConfig::default();
        config.chunk.min_chunk_chars = 2000;
        assert!(config.validate().is_err());

        let mut config = RagConfig::default();
        config.collection_name = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gemini_batch_size_capped() {
        let mut config = RagConfig::default();
        config.embedding.batch_size = GEMINI_MAX_BATCH_SIZE;
        assert!(config.validate().is_ok());

        config.embedding.batch_size = GEMINI_MAX_BATCH_SIZE + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch limit"));

        // 자체 호스팅 서버는 상한 없음
        config.embedding.provider = EmbeddingProviderKind::OpenAi;
        config.embedding.base_url = Some("http://localhost:8080/v1".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_explicit_config_file() {
        let result = RagConfig::load(Some(Path::new("/nonexistent/insurance-rag.yaml")));
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "collection_name: from_file\ntop_k: 8\n").unwrap();

        let config = RagConfig::load(Some(&path)).unwrap();
        assert_eq!(config.collection_name, "from_file");
        assert_eq!(config.top_k, 8);
    }
}
