//! insurance-rag - 보험 약관 RAG 파이프라인
//!
//! 약관 XML을 조항 단위로 청킹하고 임베딩하여 Qdrant에 저장한 뒤,
//! 보험 유형 필터와 함께 시맨틱 검색합니다.
//!
//! - `ingest(file) -> chunk_count`: [`IngestPipeline`]
//! - `retrieve(query, category?) -> chunks`: [`FilteredRetriever`]

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;

// Re-exports
pub use config::{EmbeddingConfig, EmbeddingProviderKind, QdrantConfig, RagConfig};
pub use embedding::{
    create_embedder, get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding,
    OpenAiCompatEmbedding,
};
pub use error::{RagError, Result};
pub use knowledge::{
    Chunk, ChunkConfig, ChunkMetadata, Chunker, ClauseChunker, FilteredRetriever, InMemoryIndex,
    IngestPipeline, IngestReport, QdrantIndex, RetrievedChunk, SourceRecord, VectorIndex,
};
