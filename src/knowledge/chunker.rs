//! Clause Chunking Module
//!
//! 약관 본문을 조항 표시("제N조")를 기준으로 분할합니다.
//! I/O 없는 순수 함수이며 결정적입니다.
//!
//! 길이는 모두 문자(char) 단위로 계산합니다. 한글 1자는 UTF-8로 3바이트이므로
//! 바이트 기준으로 자르면 청크 크기가 1/3로 줄어듭니다.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

use super::record::{Chunk, ChunkMetadata, SourceRecord};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// 조항 구분자 (정규식이 아닌 리터럴 문자열)
    pub delimiter: String,
    /// 최소 청크 크기 (문자 수), 미만이면 버림
    pub min_chunk_chars: usize,
    /// 최대 청크 크기 (문자 수), 초과분은 잘라냄
    pub max_chunk_chars: usize,
    /// 최소 본문 크기 (문자 수), 미만이면 청크 없음
    pub min_body_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            delimiter: "제".to_string(),
            min_chunk_chars: 100,
            max_chunk_chars: 1000,
            min_body_chars: 50,
        }
    }
}

impl ChunkConfig {
    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.delimiter.is_empty() {
            return Err(RagError::Config("chunk.delimiter cannot be empty".to_string()));
        }
        if self.max_chunk_chars == 0 {
            return Err(RagError::Config("chunk.max_chunk_chars must be at least 1".to_string()));
        }
        if self.min_chunk_chars > self.max_chunk_chars {
            return Err(RagError::Config(format!(
                "chunk.min_chunk_chars ({}) exceeds chunk.max_chunk_chars ({})",
                self.min_chunk_chars, self.max_chunk_chars
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 레코드를 청크로 분할 (내용이 없으면 빈 벡터)
    fn chunk(&self, record: &SourceRecord) -> Vec<Chunk>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// ClauseChunker
// ============================================================================

/// 조항 단위 청커
///
/// - 구분자로 본문 분할 (구분자는 분할 시 소비됨)
/// - 구분자로 시작하지 않는 세그먼트는 구분자를 다시 붙여 조항 번호 복원
///   (첫 세그먼트 포함)
/// - `min_chunk_chars` 미만 조각은 노이즈로 간주하고 버림
/// - `max_chunk_chars` 초과분은 재분할 없이 잘라냄
pub struct ClauseChunker {
    config: ChunkConfig,
}

impl ClauseChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }

    /// 세그먼트 하나를 청크 텍스트로 정리
    ///
    /// 버려야 하는 조각이면 `None`.
    fn prepare_segment(&self, segment: &str) -> Option<String> {
        let segment = segment.trim();
        if segment.chars().count() < self.config.min_chunk_chars {
            return None;
        }

        let delimiter = self.config.delimiter.as_str();
        let text = if !segment.starts_with(delimiter) {
            format!("{}{}", delimiter, segment)
        } else {
            segment.to_string()
        };

        Some(truncate_chars(text, self.config.max_chunk_chars))
    }
}

impl Chunker for ClauseChunker {
    fn chunk(&self, record: &SourceRecord) -> Vec<Chunk> {
        let body = record.body.trim();
        if body.is_empty() || body.chars().count() < self.config.min_body_chars {
            return vec![];
        }

        let mut chunks = Vec::new();

        for segment in body.split(self.config.delimiter.as_str()) {
            if let Some(text) = self.prepare_segment(segment) {
                let chunk_index = chunks.len();
                chunks.push(Chunk {
                    text,
                    metadata: ChunkMetadata {
                        source_id: record.source_id.clone(),
                        category: record.category.clone(),
                        name: record.name.clone(),
                        chunk_index,
                    },
                });
            }
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "ClauseChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 문자 수 기준으로 자르기 (UTF-8 안전)
fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((byte_index, _)) = text.char_indices().nth(max_chars) {
        text.truncate(byte_index);
    }
    text
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(ClauseChunker::with_defaults())
}

/// 조항 청커 생성 (설정 지정)
pub fn clause_chunker(config: ChunkConfig) -> Result<Box<dyn Chunker>> {
    Ok(Box::new(ClauseChunker::new(config)?))
}

// ============================================================================
// Tests
// ============================================================================
