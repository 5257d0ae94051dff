//! Ingestion Pipeline
//!
//! One document in, one rebuilt collection out: load pages, build the
//! segment tree, summarize interior segments, enrich and embed leaves,
//! then atomically replace the vector collection and the node store under
//! the collection's write lock.

use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::chunk::{ChunkError, HierarchicalChunker};
use crate::config::PipelineConfig;
use crate::enrich::{enrich_leaves, IndexedLeaf, Summarizer};
use crate::index::{IndexError, LeafRecord, VectorIndex};
use crate::llm::{CompletionPort, EmbeddingPort, LlmError};
use crate::loader::{list_pdf_files, LoaderError, PageLoader, TextExtractor};
use crate::store::{CollectionLocks, NodeStore, StoreError};

/// Leaves embedded per embedding request.
const EMBED_BATCH_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error("Embedding failed: {0}")]
    Embedding(#[from] LlmError),
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
    #[error("Node store error: {0}")]
    Store(#[from] StoreError),
}

/// What one successful ingestion produced.
#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub collection: String,
    pub pages: usize,
    pub segments: usize,
    pub leaves: usize,
}

/// Outcome of a directory sweep. Failures are per-file; one bad PDF
/// never aborts the sweep.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub succeeded: Vec<IngestSummary>,
    pub failed: Vec<(PathBuf, String)>,
}

pub struct IngestPipeline<E: TextExtractor> {
    config: Arc<PipelineConfig>,
    loader: PageLoader<E>,
    embedder: Arc<dyn EmbeddingPort>,
    completion: Arc<dyn CompletionPort>,
    index: Arc<dyn VectorIndex>,
    locks: Arc<CollectionLocks>,
}

impl<E: TextExtractor> IngestPipeline<E> {
    pub fn new(
        config: Arc<PipelineConfig>,
        extractor: E,
        embedder: Arc<dyn EmbeddingPort>,
        completion: Arc<dyn CompletionPort>,
        index: Arc<dyn VectorIndex>,
        locks: Arc<CollectionLocks>,
    ) -> Self {
        Self {
            config,
            loader: PageLoader::new(extractor),
            embedder,
            completion,
            index,
            locks,
        }
    }

    /// Ingest one file, fully replacing its collection.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestSummary, IngestError> {
        let pages = self.loader.load(path)?;
        let collection = pages[0].collection.clone();

        let chunker = HierarchicalChunker::new(self.config.chunk_sizes.clone())?;
        let tree = chunker.build(&pages)?;

        let summarizer =
            Summarizer::new(Arc::clone(&self.completion), self.config.summary_concurrency);
        let synopses = summarizer.summarize(&tree.interior()).await;
        let leaves = enrich_leaves(&tree.segments, &synopses);

        let records = self.embed_leaves(&leaves).await?;

        // Everything model-side is done; swap both stores under the
        // write lock so readers never see a half-built collection.
        let lock = self.locks.for_collection(&collection);
        let _guard = lock.write().await;

        self.index.delete_collection(&collection).await?;
        NodeStore::delete(&self.config.docstore_dir, &collection)?;

        self.index.create_collection(&collection).await?;
        self.index.upsert(&collection, records).await?;
        NodeStore::from_segments(&collection, &tree.segments)
            .save(&self.config.docstore_dir)?;

        let summary = IngestSummary {
            collection: collection.clone(),
            pages: pages.len(),
            segments: tree.len(),
            leaves: leaves.len(),
        };
        info!(
            collection = %collection,
            pages = summary.pages,
            segments = summary.segments,
            leaves = summary.leaves,
            "Ingested document"
        );
        Ok(summary)
    }

    /// Ingest every PDF in a directory, isolating per-file failures.
    pub async fn ingest_dir(&self, dir: &Path) -> Result<IngestReport, IngestError> {
        let files = list_pdf_files(dir)?;
        let mut report = IngestReport::default();

        for file in files {
            match self.ingest_file(&file).await {
                Ok(summary) => report.succeeded.push(summary),
                Err(e) => {
                    error!(file = %file.display(), error = %e, "Ingestion failed");
                    report.failed.push((file, e.to_string()));
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Directory sweep complete"
        );
        Ok(report)
    }

    async fn embed_leaves(&self, leaves: &[IndexedLeaf]) -> Result<Vec<LeafRecord>, IngestError> {
        let mut records = Vec::with_capacity(leaves.len());
        for batch in leaves.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|l| l.embedded_text.clone()).collect();
            let embeddings = self.embedder.embed(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(IngestError::Embedding(LlmError::Malformed(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                ))));
            }

            for (leaf, embedding) in batch.iter().zip(embeddings) {
                let mut metadata = serde_json::to_value(&leaf.metadata)
                    .unwrap_or_else(|_| json!({}));
                if let Some(map) = metadata.as_object_mut() {
                    map.insert("hierarchyDepth".to_string(), json!(leaf.hierarchy_depth));
                    map.insert("hasContext".to_string(), json!(leaf.has_context));
                }
                records.push(LeafRecord {
                    id: leaf.leaf_id.clone(),
                    document: leaf.embedded_text.clone(),
                    embedding,
                    metadata,
                });
            }
        }
        Ok(records)
    }
}
