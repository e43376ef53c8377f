//! Knowledge 모듈 - 약관 적재 및 필터 검색
//!
//! - Record: 약관 XML → `SourceRecord`
//! - Chunker: 조항("제N조") 단위 분할
//! - Vector: `VectorIndex` 트레이트 (Qdrant REST / 메모리)
//! - Pipeline: 청킹 → 임베딩 → upsert
//! - Retriever: 보험 유형 필터 k-NN 검색

mod chunker;
mod memory;
mod pipeline;
mod qdrant;
mod record;
mod retriever;
mod vector;

#[cfg(test)]
mod fakes;

// Re-exports
pub use chunker::{clause_chunker, default_chunker, ChunkConfig, Chunker, ClauseChunker};
pub use memory::InMemoryIndex;
pub use pipeline::{FailedFile, IngestPipeline, IngestReport, IngestedFile};
pub use qdrant::QdrantIndex;
pub use record::{source_id_of, Chunk, ChunkMetadata, SourceRecord, CATEGORY_KEY};
pub use retriever::{
    count_by_category, validate_category, CategoryCounts, FilteredRetriever, RetrievedChunk,
};
pub use vector::{
    category_filter, cosine_similarity, CollectionInfo, FieldMatch, IndexItem, PointId,
    ScrollPage, SearchResult, VectorIndex,
};
