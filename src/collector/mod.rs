//! 약관 파일 수집 모듈
//!
//! 입력 폴더에서 `*.xml` 약관 파일 목록을 만듭니다.
//! 실행마다 같은 순서가 되도록 경로 기준으로 정렬합니다.

use std::io;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::{RagError, Result};

/// 약관 파일 확장자
pub const SOURCE_EXTENSION: &str = "xml";

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedFile {
    /// 파일 경로
    pub path: PathBuf,
    /// 파일 크기 (바이트)
    pub size: u64,
}

/// 약관 확장자인지 확인 (대소문자 무시)
pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION))
        .unwrap_or(false)
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 하위 폴더까지 수집
    pub recursive: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            recursive: false,
            include_hidden: false,
            max_file_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    /// 새 수집기 생성
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 수집기 생성
    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 단일 파일 확인
    ///
    /// 확장자가 `.xml`이 아니면 `None`.
    pub fn collect_file(&self, path: &Path) -> Result<Option<CollectedFile>> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            RagError::Io(io::Error::new(
                e.kind(),
                format!("File not found: {}: {}", path.display(), e),
            ))
        })?;

        if !metadata.is_file() {
            return Err(RagError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Not a file: {}", path.display()),
            )));
        }

        if !is_source_file(path) {
            return Ok(None);
        }

        Ok(Some(CollectedFile {
            path: path.to_path_buf(),
            size: metadata.len(),
        }))
    }

    /// 폴더의 약관 파일 수집 (경로순 정렬)
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        if !path.is_dir() {
            return Err(RagError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Directory not found: {}", path.display()),
            )));
        }

        let mut builder = WalkBuilder::new(path);
        builder
            .hidden(!self.config.include_hidden)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .ignore(false)
            .parents(false);
        if !self.config.recursive {
            builder.max_depth(Some(1));
        }

        let mut files = Vec::new();

        for entry in builder.build() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            // 파일만 처리
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }
            if !is_source_file(entry.path()) {
                continue;
            }

            let size = match entry.metadata() {
                Ok(m) => m.len(),
                Err(e) => {
                    tracing::warn!("Failed to read metadata of {:?}: {}", entry.path(), e);
                    continue;
                }
            };

            if self.config.max_file_size > 0 && size > self.config.max_file_size {
                tracing::debug!("Skipping large file: {:?} ({} bytes)", entry.path(), size);
                continue;
            }

            files.push(CollectedFile {
                path: entry.path().to_path_buf(),
                size,
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::info!("Collected {} XML files from {:?}", files.len(), path);
        Ok(files)
    }
}

/// 폴더의 약관 파일 경로 (기본 설정, 정렬됨)
pub fn collect_source_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(FileCollector::with_defaults()
        .collect_directory(dir)?
        .into_iter()
        .map(|f| f.path)
        .collect())
}

// ============================================================================
// Statistics
// ============================================================================

/// 수집 통계
#[derive(Debug, Default)]
pub struct CollectionStats {
    pub total_files: usize,
    pub total_size: u64,
}

impl CollectionStats {
    /// 수집된 파일 목록에서 통계 계산
    pub fn from_files(files: &[CollectedFile]) -> Self {
        Self {
            total_files: files.len(),
            total_size: files.iter().map(|f| f.size).sum(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
