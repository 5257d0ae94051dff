//! Auto-Merging Retriever
//!
//! Embeds the query, searches leaf embeddings, maps the hits back to
//! stored segments, and applies the merge rule. When the node store is
//! missing the retriever degrades to raw leaf results, flagged so the
//! caller can tell.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::chunk::SegmentMetadata;
use crate::index::{IndexError, VectorIndex};
use crate::llm::{EmbeddingPort, LlmError};
use crate::store::NodeStore;

use super::merge::auto_merge;

#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] LlmError),
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// One unit of retrieved context: an original leaf or a promoted
/// ancestor, carrying the raw stored text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUnit {
    pub id: String,
    pub text: String,
    /// Absent in degraded mode, where tree positions are unknown.
    pub level: Option<u32>,
    pub metadata: Option<SegmentMetadata>,
}

/// Result of one retrieval. The unit set is deterministic for a fixed
/// query, index state, and threshold; unit order is unspecified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedContext {
    pub units: Vec<ContextUnit>,
    /// False when the retriever fell back to raw leaves because no node
    /// store was available.
    pub used_auto_merging: bool,
}

pub struct AutoMergingRetriever {
    embedder: Arc<dyn EmbeddingPort>,
    index: Arc<dyn VectorIndex>,
    /// Merge substrate; `None` puts the retriever in degraded mode.
    store: Option<NodeStore>,
    collection: String,
    top_k: usize,
    merge_threshold: f64,
}

impl AutoMergingRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingPort>,
        index: Arc<dyn VectorIndex>,
        store: Option<NodeStore>,
        collection: &str,
        top_k: usize,
        merge_threshold: f64,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
            collection: collection.to_string(),
            top_k,
            merge_threshold,
        }
    }

    pub async fn retrieve(&self, query: &str) -> Result<RetrievedContext, RetrieveError> {
        let embeddings = self.embedder.embed(&[query.to_string()]).await?;
        let query_embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Malformed("no embedding returned for query".to_string()))?;

        let hits = self
            .index
            .search(&self.collection, &query_embedding, self.top_k)
            .await?;

        let Some(store) = &self.store else {
            warn!(
                collection = %self.collection,
                "No node store available; returning raw leaves without merging"
            );
            return Ok(RetrievedContext {
                units: hits
                    .into_iter()
                    .map(|hit| ContextUnit {
                        id: hit.id,
                        text: hit.document.unwrap_or_default(),
                        level: None,
                        metadata: hit
                            .metadata
                            .and_then(|m| serde_json::from_value(m).ok()),
                    })
                    .collect(),
                used_auto_merging: false,
            });
        };

        let leaf_ids: Vec<String> = hits.into_iter().map(|hit| hit.id).collect();
        for id in &leaf_ids {
            if store.get(id).is_none() {
                warn!(collection = %self.collection, id = %id, "Retrieved leaf missing from node store");
            }
        }

        let merged_ids = auto_merge(&leaf_ids, store.table(), self.merge_threshold);
        let merged = merged_ids.len() != leaf_ids.len();
        info!(
            collection = %self.collection,
            retrieved = leaf_ids.len(),
            returned = merged_ids.len(),
            merged = merged,
            "Retrieval complete"
        );

        let units = merged_ids
            .into_iter()
            .filter_map(|id| store.get(&id).cloned())
            .map(|segment| ContextUnit {
                id: segment.id,
                // Raw stored text, never the enriched embedding text.
                text: segment.text,
                level: Some(segment.level),
                metadata: Some(segment.metadata),
            })
            .collect();

        Ok(RetrievedContext {
            units,
            used_auto_merging: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{HierarchicalChunker, Segment};
    use crate::loader::PageUnit;
    use crate::testutil::{HashEmbedder, MemoryIndex};
    use crate::index::LeafRecord;

    fn page(text: &str) -> PageUnit {
        PageUnit {
            text: text.to_string(),
            page: 1,
            total_pages: 1,
            filename: "doc.pdf".to_string(),
            file_path: "/doc.pdf".to_string(),
            collection: "doc".to_string(),
        }
    }

    async fn indexed_fixture() -> (Arc<MemoryIndex>, Vec<Segment>, Arc<HashEmbedder>) {
        let chunker = HierarchicalChunker::new(vec![120, 40]).unwrap();
        let text = "Storage engines persist data on disk. Caches keep hot data in memory. \
                    Replication copies data across nodes. Sharding splits data across nodes.";
        let tree = chunker.build(&[page(text)]).unwrap();

        let embedder = Arc::new(HashEmbedder::new(64));
        let index = Arc::new(MemoryIndex::new());
        index.create_collection("doc").await.unwrap();

        let mut records = Vec::new();
        for leaf in tree.leaves() {
            let embedding = embedder.embed_one(&leaf.text);
            records.push(LeafRecord {
                id: leaf.id.clone(),
                document: leaf.text.clone(),
                embedding,
                metadata: serde_json::to_value(&leaf.metadata).unwrap(),
            });
        }
        index.upsert("doc", records).await.unwrap();
        (index, tree.segments, embedder)
    }

    #[tokio::test]
    async fn test_degraded_mode_sets_flag() {
        let (index, _segments, embedder) = indexed_fixture().await;
        let retriever = AutoMergingRetriever::new(embedder, index, None, "doc", 3, 0.5);

        let result = retriever.retrieve("replication across nodes").await.unwrap();
        assert!(!result.used_auto_merging);
        assert!(!result.units.is_empty());
        assert!(result.units.iter().all(|u| u.level.is_none()));
    }

    #[tokio::test]
    async fn test_merging_mode_returns_store_text() {
        let (index, segments, embedder) = indexed_fixture().await;
        let store = NodeStore::from_segments("doc", &segments);
        let retriever =
            AutoMergingRetriever::new(embedder, index, Some(store), "doc", 2, 0.5);

        let result = retriever.retrieve("sharding splits data").await.unwrap();
        assert!(result.used_auto_merging);
        for unit in &result.units {
            let original = segments.iter().find(|s| s.id == unit.id).unwrap();
            assert_eq!(unit.text, original.text);
            assert_eq!(unit.level, Some(original.level));
        }
    }

    #[tokio::test]
    async fn test_search_unknown_collection_fails() {
        let (index, _segments, embedder) = indexed_fixture().await;
        let retriever = AutoMergingRetriever::new(embedder, index, None, "ghost", 3, 0.5);
        let err = retriever.retrieve("anything").await.unwrap_err();
        assert!(matches!(
            err,
            RetrieveError::Index(IndexError::CollectionNotFound(_))
        ));
    }
}
