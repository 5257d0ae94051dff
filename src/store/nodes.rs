//! Per-Collection Segment Store
//!
//! One JSON file per collection holding every segment of the tree.
//! Loadable independently of the vector index; a save/load cycle
//! round-trips segment text, links, and metadata exactly.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::chunk::Segment;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No node store for collection: {0}")]
    NotFound(String),
}

/// On-disk envelope for a collection's segments.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreFile {
    collection: String,
    saved_at: DateTime<Utc>,
    nodes: HashMap<String, Segment>,
}

/// In-memory segment table for one collection.
#[derive(Debug, Clone)]
pub struct NodeStore {
    collection: String,
    nodes: HashMap<String, Segment>,
}

impl NodeStore {
    pub fn from_segments(collection: &str, segments: &[Segment]) -> Self {
        let nodes = segments
            .iter()
            .map(|s| (s.id.clone(), s.clone()))
            .collect();
        Self {
            collection: collection.to_string(),
            nodes,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Segment> {
        self.nodes.get(id)
    }

    /// Borrowed id-to-segment table for merge traversal.
    pub fn table(&self) -> &HashMap<String, Segment> {
        &self.nodes
    }

    fn file_path(dir: &Path, collection: &str) -> PathBuf {
        dir.join(format!("{}_nodes.json", collection))
    }

    /// Whether a persisted store exists for a collection.
    pub fn exists(dir: &Path, collection: &str) -> bool {
        Self::file_path(dir, collection).exists()
    }

    /// Persist to `dir`, replacing any previous file for the collection.
    pub fn save(&self, dir: &Path) -> Result<(), StoreError> {
        std::fs::create_dir_all(dir)?;
        let file = StoreFile {
            collection: self.collection.clone(),
            saved_at: Utc::now(),
            nodes: self.nodes.clone(),
        };
        let path = Self::file_path(dir, &self.collection);
        std::fs::write(&path, serde_json::to_string_pretty(&file)?)?;
        info!(collection = %self.collection, nodes = self.nodes.len(), path = %path.display(), "Saved node store");
        Ok(())
    }

    /// Load a collection's store from `dir`.
    pub fn load(dir: &Path, collection: &str) -> Result<Self, StoreError> {
        let path = Self::file_path(dir, collection);
        if !path.exists() {
            return Err(StoreError::NotFound(collection.to_string()));
        }
        let raw = std::fs::read_to_string(&path)?;
        let file: StoreFile = serde_json::from_str(&raw)?;
        info!(collection = %collection, nodes = file.nodes.len(), "Loaded node store");
        Ok(Self {
            collection: file.collection,
            nodes: file.nodes,
        })
    }

    /// Delete a collection's persisted store, if any.
    pub fn delete(dir: &Path, collection: &str) -> Result<(), StoreError> {
        let path = Self::file_path(dir, collection);
        if path.exists() {
            std::fs::remove_file(&path)?;
            info!(collection = %collection, "Deleted node store");
        } else {
            warn!(collection = %collection, "No node store to delete");
        }
        Ok(())
    }
}

/// Per-collection read/write locks: ingestion (full rebuild) takes the
/// write half, queries take the read half. Serialized at collection-id
/// granularity so unrelated collections never contend.
#[derive(Default)]
pub struct CollectionLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::RwLock<()>>>>,
}

impl CollectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_collection(&self, collection: &str) -> Arc<tokio::sync::RwLock<()>> {
        let mut map = self.inner.lock();
        Arc::clone(
            map.entry(collection.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::RwLock::new(()))),
        )
    }
}
