//! Retrieval
//!
//! Similarity search over leaf embeddings, auto-merging of retrieved
//! leaves into parent segments, and multi-collection query fan-out.

mod engine;
mod merge;
mod retriever;

pub use engine::{EngineError, LongestAnswer, QueryEngine, QueryOutcome, RankingStrategy};
pub use merge::auto_merge;
pub use retriever::{AutoMergingRetriever, ContextUnit, RetrieveError, RetrievedContext};
