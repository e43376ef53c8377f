//! 약관 레코드 및 청크 타입
//!
//! 약관 XML 파일 하나가 `SourceRecord` 하나가 됩니다.
//!
//! ```xml
//! <root>
//!   <file>
//!     <category>화재보험</category>
//!     <name>주택화재보험 보통약관</name>
//!     <cn>제1조(목적) ... 제2조(용어의 정의) ...</cn>
//!   </file>
//! </root>
//! ```

use std::path::Path;

use roxmltree::{Document, Node, ParsingOptions};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ============================================================================
// SourceRecord
// ============================================================================

/// 약관 파일 하나에서 읽은 레코드 (적재 중에만 존재)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// 원본 파일 이름
    pub source_id: String,
    /// 보험 유형 (예: 화재보험)
    pub category: String,
    /// 약관 제목
    pub name: String,
    /// 약관 전문
    pub body: String,
}

impl SourceRecord {
    /// XML 파일 읽기
    ///
    /// 읽기 실패도 파일 단위 `Parse` 에러로 취급합니다.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let source_id = source_id_of(path);
        let bytes = tokio::fs::read(path).await.map_err(|e| RagError::Parse {
            file: source_id.clone(),
            reason: format!("failed to read file: {}", e),
        })?;
        Self::from_xml(&source_id, &bytes)
    }

    /// XML 바이트에서 레코드 파싱
    ///
    /// UTF-8만 허용합니다 (선행 BOM은 무시).
    /// `<file>` 요소가 없으면 `Parse` 에러, `<cn>`이 없으면 빈 본문입니다.
    pub fn from_xml(source_id: &str, bytes: &[u8]) -> Result<Self> {
        let parse_error = |reason: String| RagError::Parse {
            file: source_id.to_string(),
            reason,
        };

        let text = std::str::from_utf8(bytes)
            .map_err(|e| parse_error(format!("invalid UTF-8: {}", e)))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut options = ParsingOptions::default();
        options.allow_dtd = true;
        let doc = Document::parse_with_options(text, options)
            .map_err(|e| parse_error(format!("malformed XML: {}", e)))?;

        let root = doc.root_element();
        let file = if root.has_tag_name("file") {
            root
        } else {
            child_element(root, "file")
                .ok_or_else(|| parse_error("missing <file> element".to_string()))?
        };

        Ok(Self {
            source_id: source_id.to_string(),
            category: child_text(file, "category"),
            name: child_text(file, "name"),
            body: child_text(file, "cn"),
        })
    }
}

/// 경로에서 파일 이름 추출
pub fn source_id_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.is_element() && n.has_tag_name(tag))
}

/// 자식 요소의 텍스트 (CDATA 포함, 앞뒤 공백 제거)
fn child_text(node: Node<'_, '_>, tag: &str) -> String {
    child_element(node, tag)
        .map(|el| {
            el.descendants()
                .filter(|d| d.is_text())
                .filter_map(|d| d.text())
                .collect::<String>()
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

// ============================================================================
// Chunk
// ============================================================================

/// 청크 메타데이터 (Qdrant payload의 `metadata` 필드)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_id: String,
    pub category: String,
    pub name: String,
    /// 레코드 내 청크 순서 (0-based)
    pub chunk_index: usize,
}

/// 저장/검색 단위
///
/// 직렬화 형태가 곧 벡터 인덱스 payload입니다:
/// `{ "text": ..., "metadata": { "source_id", "category", "name", "chunk_index" } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// 보험 유형 필터 키 (payload 경로)
pub const CATEGORY_KEY: &str = "metadata.category";

// ============================================================================
// Tests
// ============================================================================
