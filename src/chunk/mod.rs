//! Hierarchical Chunking
//!
//! Builds the multi-level segment tree for a document: one root covering
//! the whole text, successively finer levels bounded by the configured
//! sizes, leaves at the finest level.

mod hierarchy;

pub use hierarchy::{
    ChunkError, Hierarchy, HierarchicalChunker, Segment, SegmentMetadata,
};
