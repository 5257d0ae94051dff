//! Context Enrichment
//!
//! Interior segments get short generated synopses; leaves get an
//! ancestor-synopsis breadcrumb prepended before embedding. The indexed
//! text therefore differs from the stored text; retrieval always maps
//! back to raw segments by id.

mod context;
mod summarizer;

pub use context::{enrich_leaves, IndexedLeaf, BREADCRUMB_SEPARATOR};
pub use summarizer::{Summarizer, Synopsis, SynopsisMap, SynopsisSource};
