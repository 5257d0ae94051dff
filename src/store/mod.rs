//! Node Storage
//!
//! Durable per-collection map from segment id to the full segment
//! record, the substrate auto-merging resolves parents against. Also
//! hosts the per-collection lock registry that keeps ingestion and
//! queries mutually exclusive.

mod nodes;

pub use nodes::{CollectionLocks, NodeStore, StoreError};
