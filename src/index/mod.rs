//! Vector Index Port
//!
//! The pipeline stores leaf embeddings and runs similarity search through
//! this boundary. The production implementation talks to Chroma over
//! REST; tests use an in-memory stand-in.

mod chroma;

pub use chroma::ChromaIndex;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index HTTP error: {0}")]
    Http(String),
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    #[error("Vector index not available")]
    Unavailable,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

impl From<reqwest::Error> for IndexError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            IndexError::Unavailable
        } else {
            IndexError::Http(e.to_string())
        }
    }
}

/// One indexed leaf as stored in the vector index.
#[derive(Debug, Clone)]
pub struct LeafRecord {
    /// Leaf segment id.
    pub id: String,
    /// Breadcrumb-prefixed text that was embedded.
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: Value,
}

/// One similarity-search result, nearest first.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub document: Option<String>,
    pub metadata: Option<Value>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create a collection; fails if it already exists.
    async fn create_collection(&self, name: &str) -> Result<(), IndexError>;

    /// Delete a collection. Deleting a missing collection is not an error.
    async fn delete_collection(&self, name: &str) -> Result<(), IndexError>;

    async fn list_collections(&self) -> Result<Vec<String>, IndexError>;

    /// Insert-or-replace leaf records in a collection.
    async fn upsert(&self, collection: &str, records: Vec<LeafRecord>) -> Result<(), IndexError>;

    /// `k` nearest leaves to the query vector, nearest first.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError>;
}
