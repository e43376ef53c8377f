//! Ingestion Pipeline - 약관 적재 파이프라인
//!
//! XML 읽기 → 청킹 → 배치 임베딩 → 벡터 인덱스 upsert
//!
//! 파일은 하나씩 순서대로 처리합니다.
//! 파일 단위 에러(`Parse`, `EmptyContent`)는 리포트에 기록하고 다음 파일로 넘어가며,
//! 그 외 에러(연결 실패, 스키마 불일치, 임베딩 실패)는 전체 실행을 중단합니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::chunker::{clause_chunker, Chunker};
use super::record::{source_id_of, SourceRecord};
use super::vector::{IndexItem, VectorIndex};

// ============================================================================
// Types
// ============================================================================

/// 적재에 실패한 파일
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub name: String,
    pub reason: String,
}

/// 적재에 성공한 파일
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedFile {
    pub name: String,
    pub chunks: usize,
}

/// 배치 적재 결과
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// 저장된 청크 총합
    pub total_chunks: usize,
    /// 건너뛴 파일 (처리 순서)
    pub failed_files: Vec<FailedFile>,
    /// 저장된 파일별 청크 수 (처리 순서)
    pub ingested_files: Vec<IngestedFile>,
    /// 소요 시간
    pub elapsed: Duration,
}

impl IngestReport {
    /// 실패한 파일 이름 목록
    pub fn failed_names(&self) -> Vec<&str> {
        self.failed_files.iter().map(|f| f.name.as_str()).collect()
    }
}

// ============================================================================
// IngestPipeline
// ============================================================================

/// 적재 파이프라인
pub struct IngestPipeline {
    chunker: Box<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    collection: String,
    batch_size: usize,
}

impl IngestPipeline {
    /// 설정으로 생성
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self> {
        let chunker = clause_chunker(config.chunk.clone())?;
        Ok(Self::with_chunker(
            chunker,
            embedder,
            index,
            &config.collection_name,
            config.embedding.batch_size,
        ))
    }

    /// 청커 지정하여 생성
    pub fn with_chunker(
        chunker: Box<dyn Chunker>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        collection: &str,
        batch_size: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            index,
            collection: collection.to_string(),
            batch_size: batch_size.max(1),
        }
    }

    /// 대상 컬렉션 이름
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// 컬렉션 준비 (`recreate`면 비우고 새로 생성)
    pub async fn prepare(&self, recreate: bool) -> Result<()> {
        self.index
            .ensure_collection(&self.collection, self.embedder.dimension(), recreate)
            .await
    }

    /// 파일 목록 적재
    ///
    /// 컬렉션 준비에 실패하면 파일을 하나도 처리하지 않고 에러를 반환합니다.
    pub async fn ingest_all(&self, files: &[PathBuf], recreate: bool) -> Result<IngestReport> {
        let started = Instant::now();
        self.prepare(recreate).await?;

        tracing::info!(
            "Ingesting {} files into {} (index={}, embedder={}, chunker={}, recreate={})",
            files.len(),
            self.collection,
            self.index.name(),
            self.embedder.name(),
            self.chunker.name(),
            recreate
        );

        let mut report = IngestReport::default();

        for path in files {
            let name = source_id_of(path);
            match self.ingest_file(path).await {
                Ok(chunks) => {
                    report.total_chunks += chunks;
                    report.ingested_files.push(IngestedFile { name, chunks });
                }
                Err(e) if e.is_per_file() => {
                    tracing::warn!("Skipping {}: {}", name, e);
                    report.failed_files.push(FailedFile {
                        name,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::error!("Aborting ingestion at {}: {}", name, e);
                    return Err(e);
                }
            }
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            "Ingestion finished: {} chunks from {} files, {} failed, {:.1}s",
            report.total_chunks,
            report.ingested_files.len(),
            report.failed_files.len(),
            report.elapsed.as_secs_f64()
        );

        Ok(report)
    }

    /// 파일 하나 적재, 저장된 청크 수 반환
    ///
    /// 컬렉션은 이미 준비되어 있어야 합니다 ([`IngestPipeline::prepare`]).
    pub async fn ingest_file(&self, path: &Path) -> Result<usize> {
        let record = SourceRecord::from_path(path).await?;

        let chunks = self.chunker.chunk(&record);
        if chunks.is_empty() {
            return Err(RagError::EmptyContent {
                file: record.source_id,
            });
        }

        let mut items = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "{} returned {} embeddings for {} chunks",
                    self.embedder.name(),
                    vectors.len(),
                    batch.len()
                )));
            }

            items.extend(
                vectors
                    .into_iter()
                    .zip(batch.iter().cloned())
                    .map(|(vector, payload)| IndexItem { vector, payload }),
            );
        }

        // 파일 하나의 청크는 한 번에 저장
        let stored = self.index.upsert(&self.collection, items).await?;

        tracing::info!(
            "Ingested {} ({}, {}): {} chunks",
            record.source_id,
            record.category,
            record.name,
            stored
        );

        Ok(stored)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::chunker::default_chunker;
    use crate::knowledge::fakes::{policy_xml, write_file, CountingEmbedder, UnreachableEmbedder};
    use crate::knowledge::memory::InMemoryIndex;
    use crate::knowledge::qdrant::QdrantIndex;
    use crate::knowledge::vector::category_filter;
    use tempfile::TempDir;

    const COLLECTION: &str = "insurance_docs";

    fn pipeline(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        batch_size: usize,
    ) -> IngestPipeline {
        IngestPipeline::with_chunker(default_chunker(), embedder, index, COLLECTION, batch_size)
    }

    #[tokio::test]
    async fn test_malformed_file_is_isolated() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            write_file(dir.path(), "001.xml", &policy_xml("화재보험", "주택화재", 3)),
            write_file(dir.path(), "002.xml", "<root><file><cn>깨진 파일"),
            write_file(dir.path(), "003.xml", &policy_xml("상해보험", "상해", 2)),
        ];

        let index = Arc::new(InMemoryIndex::new());
        let pipeline = pipeline(Arc::new(CountingEmbedder::new(8)), index.clone(), 32);
        let report = pipeline.ingest_all(&files, true).await.unwrap();

        assert_eq!(report.failed_names(), vec!["002.xml"]);
        assert_eq!(report.total_chunks, 5);
        assert_eq!(
            report.ingested_files,
            vec![
                IngestedFile { name: "001.xml".to_string(), chunks: 3 },
                IngestedFile { name: "003.xml".to_string(), chunks: 2 },
            ]
        );
        assert_eq!(index.count(COLLECTION, None).await.unwrap(), 5);
        assert_eq!(
            index.count(COLLECTION, Some(&category_filter("화재보험"))).await.unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_empty_content_recorded() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            write_file(
                dir.path(),
                "no_cn.xml",
                "<root><file><category>화재보험</category><name>빈 약관</name></file></root>",
            ),
            write_file(
                dir.path(),
                "short.xml",
                "<root><file><category>화재보험</category><name>짧은 약관</name><cn>제1조 짧음</cn></file></root>",
            ),
            write_file(dir.path(), "ok.xml", &policy_xml("화재보험", "주택화재", 1)),
        ];

        let pipeline = pipeline(Arc::new(CountingEmbedder::new(8)), Arc::new(InMemoryIndex::new()), 32);
        let report = pipeline.ingest_all(&files, true).await.unwrap();

        assert_eq!(report.failed_names(), vec!["no_cn.xml", "short.xml"]);
        assert!(report.failed_files[0].reason.contains("no extractable content"));
        assert_eq!(report.total_chunks, 1);
    }

    #[tokio::test]
    async fn test_missing_file_recorded() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            dir.path().join("missing.xml"),
            write_file(dir.path(), "ok.xml", &policy_xml("연금보험", "연금", 2)),
        ];

        let pipeline = pipeline(Arc::new(CountingEmbedder::new(8)), Arc::new(InMemoryIndex::new()), 32);
        let report = pipeline.ingest_all(&files, true).await.unwrap();

        assert_eq!(report.failed_names(), vec!["missing.xml"]);
        assert_eq!(report.total_chunks, 2);
    }

    #[tokio::test]
    async fn test_recreate_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            write_file(dir.path(), "001.xml", &policy_xml("화재보험", "주택화재", 4)),
            write_file(dir.path(), "002.xml", &policy_xml("자동차보험", "자동차", 3)),
        ];

        let index = Arc::new(InMemoryIndex::with_page_size(2));
        let pipeline = pipeline(Arc::new(CountingEmbedder::new(8)), index.clone(), 32);

        let first = pipeline.ingest_all(&files, true).await.unwrap();
        let second = pipeline.ingest_all(&files, true).await.unwrap();

        assert_eq!(first.total_chunks, 7);
        assert_eq!(second.total_chunks, first.total_chunks);
        assert_eq!(index.count(COLLECTION, None).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_without_recreate_appends() {
        let dir = TempDir::new().unwrap();
        let files = vec![write_file(dir.path(), "001.xml", &policy_xml("화재보험", "주택화재", 2))];

        let index = Arc::new(InMemoryIndex::new());
        let pipeline = pipeline(Arc::new(CountingEmbedder::new(8)), index.clone(), 32);

        pipeline.ingest_all(&files, true).await.unwrap();
        pipeline.ingest_all(&files, false).await.unwrap();
        assert_eq!(index.count(COLLECTION, None).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_batches_embedding_calls() {
        let dir = TempDir::new().unwrap();
        let files = vec![write_file(dir.path(), "001.xml", &policy_xml("질병보험", "질병", 5))];

        let embedder = Arc::new(CountingEmbedder::new(8));
        let pipeline = pipeline(embedder.clone(), Arc::new(InMemoryIndex::new()), 2);
        let report = pipeline.ingest_all(&files, true).await.unwrap();

        assert_eq!(report.total_chunks, 5);
        // 5개 청크, 배치 크기 2 → 3회
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_index_aborts_before_files() {
        let dir = TempDir::new().unwrap();
        let files = vec![write_file(dir.path(), "001.xml", &policy_xml("화재보험", "주택화재", 2))];

        let index = QdrantIndex::with_base_url("http://127.0.0.1:1", None, 100, Duration::from_secs(2))
            .unwrap();
        let embedder = Arc::new(CountingEmbedder::new(8));
        let pipeline = pipeline(embedder.clone(), Arc::new(index), 32);

        let err = pipeline.ingest_all(&files, true).await.unwrap_err();
        assert!(matches!(err, RagError::Connectivity(_)));
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_run() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            write_file(dir.path(), "001.xml", &policy_xml("화재보험", "주택화재", 2)),
            write_file(dir.path(), "002.xml", &policy_xml("화재보험", "주택화재", 2)),
        ];

        let index = Arc::new(InMemoryIndex::new());
        let pipeline = pipeline(Arc::new(UnreachableEmbedder), index.clone(), 32);

        let err = pipeline.ingest_all(&files, true).await.unwrap_err();
        assert!(!err.is_per_file());
        assert_eq!(index.count(COLLECTION, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_aborts() {
        let dir = TempDir::new().unwrap();
        let files = vec![write_file(dir.path(), "001.xml", &policy_xml("화재보험", "주택화재", 1))];

        let index = Arc::new(InMemoryIndex::new());
        index.ensure_collection(COLLECTION, 4, true).await.unwrap();

        let pipeline = pipeline(Arc::new(CountingEmbedder::new(8)), index, 32);
        let err = pipeline.ingest_all(&files, false).await.unwrap_err();
        assert!(matches!(err, RagError::SchemaMismatch(_)));
    }

    #[tokio::test]
    async fn test_ingest_single_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "001.xml", &policy_xml("책임보험", "배상책임", 3));

        let index = Arc::new(InMemoryIndex::new());
        let pipeline = pipeline(Arc::new(CountingEmbedder::new(8)), index.clone(), 32);
        pipeline.prepare(true).await.unwrap();

        assert_eq!(pipeline.ingest_file(&path).await.unwrap(), 3);
        assert_eq!(pipeline.collection(), COLLECTION);
        assert_eq!(index.count(COLLECTION, None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_new_from_config() {
        let mut config = RagConfig::default();
        config.collection_name = "policies".to_string();
        config.chunk.min_chunk_chars = 5000;
        let result = IngestPipeline::new(
            &config,
            Arc::new(CountingEmbedder::new(8)),
            Arc::new(InMemoryIndex::new()),
        );
        assert!(matches!(result, Err(RagError::Config(_))));

        let config = RagConfig::default();
        let pipeline = IngestPipeline::new(
            &config,
            Arc::new(CountingEmbedder::new(8)),
            Arc::new(InMemoryIndex::new()),
        )
        .unwrap();
        assert_eq!(pipeline.collection(), "insurance_docs");
    }
}
