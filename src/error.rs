//! 에러 타입
//!
//! 파이프라인 전체에서 사용하는 에러 분류입니다.
//! 파일 단위 에러(`Parse`, `EmptyContent`)만 적재 배치 안에서 복구되고,
//! 나머지는 호출자에게 그대로 전달됩니다.

use thiserror::Error;

/// 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// XML 구조/인코딩 오류 (파일 단위, 복구 가능)
    #[error("failed to parse {file}: {reason}")]
    Parse { file: String, reason: String },

    /// 추출 가능한 본문 없음 (파일 단위, 복구 가능)
    #[error("no extractable content in {file}")]
    EmptyContent { file: String },

    /// 벡터 인덱스 또는 임베딩 프로바이더에 연결할 수 없음
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// 허용 목록에 없는 보험 유형
    #[error("invalid category '{category}' (allowed: {})", allowed.join(", "))]
    InvalidCategory {
        category: String,
        allowed: Vec<String>,
    },

    /// 컬렉션 없음, 벡터 차원 불일치 등
    #[error("index schema mismatch: {0}")]
    SchemaMismatch(String),

    /// 임베딩 API 응답 오류
    #[error("embedding error: {0}")]
    Embedding(String),

    /// 기타 벡터 인덱스 오류
    #[error("index error: {0}")]
    Index(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// 적재 배치에서 해당 파일만 건너뛰고 계속 진행할 수 있는 에러인지
    pub fn is_per_file(&self) -> bool {
        matches!(self, RagError::Parse { .. } | RagError::EmptyContent { .. })
    }

    /// reqwest 전송 에러 분류
    ///
    /// 연결 실패와 타임아웃은 `Connectivity`, 그 외는 `make`로 감싼 논리 에러입니다.
    pub(crate) fn from_transport(err: reqwest::Error, make: fn(String) -> RagError) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            RagError::Connectivity(err.to_string())
        } else {
            make(err.to_string())
        }
    }
}

/// 파이프라인 Result 별칭
pub type Result<T> = std::result::Result<T, RagError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_file_classification() {
        let parse = RagError::Parse {
            file: "a.xml".to_string(),
            reason: "bad".to_string(),
        };
        let empty = RagError::EmptyContent {
            file: "b.xml".to_string(),
        };
        assert!(parse.is_per_file());
        assert!(empty.is_per_file());
        assert!(!RagError::Connectivity("down".to_string()).is_per_file());
        assert!(!RagError::SchemaMismatch("missing".to_string()).is_per_file());
    }

    #[test]
    fn test_invalid_category_message_lists_allowed() {
        let err = RagError::InvalidCategory {
            category: "fire".to_string(),
            allowed: vec!["화재보험".to_string(), "상해보험".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'fire'"));
        assert!(msg.contains("화재보험, 상해보험"));
    }
}
