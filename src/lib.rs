// Strata Library
// Hierarchical retrieval-augmented question answering over PDF documents.

pub mod answer;
pub mod chunk;
pub mod config;
pub mod enrich;
pub mod index;
pub mod llm;
pub mod loader;
pub mod pipeline;
pub mod retrieve;
pub mod store;

#[cfg(test)]
pub mod testutil;

// Re-export the types the CLI and embedders touch most.
pub use answer::AnswerComposer;
pub use chunk::{Hierarchy, HierarchicalChunker, Segment, SegmentMetadata};
pub use config::{ConfigError, PipelineConfig};
pub use enrich::{enrich_leaves, IndexedLeaf, Summarizer, Synopsis, SynopsisSource};
pub use index::{ChromaIndex, IndexError, LeafRecord, SearchHit, VectorIndex};
pub use llm::{CompletionPort, EmbeddingPort, LlmError, OpenAiClient};
pub use loader::{derive_collection_id, PageLoader, PageUnit, PdfTextExtractor};
pub use pipeline::{IngestError, IngestPipeline, IngestReport, IngestSummary};
pub use retrieve::{
    AutoMergingRetriever, ContextUnit, EngineError, LongestAnswer, QueryEngine, QueryOutcome,
    RankingStrategy, RetrievedContext,
};
pub use store::{CollectionLocks, NodeStore, StoreError};
