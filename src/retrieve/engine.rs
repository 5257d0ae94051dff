//! Query Engine
//!
//! Answers questions against one collection or fans out across all of
//! them. Per-collection failures during fan-out are isolated: one bad
//! collection degrades the result map, it never sinks the whole query.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::answer::AnswerComposer;
use crate::config::PipelineConfig;
use crate::index::{IndexError, VectorIndex};
use crate::llm::{CompletionPort, EmbeddingPort, LlmError};
use crate::store::{CollectionLocks, NodeStore};

use super::retriever::{AutoMergingRetriever, RetrieveError, RetrievedContext};

/// Upper bound on a single collection's query during fan-out.
const COLLECTION_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Collection not found: {name}. Available: {available:?}")]
    CollectionNotFound { name: String, available: Vec<String> },
    #[error("No collections available to query")]
    NoCollections,
    #[error("Every collection failed to produce an answer")]
    AllFailed,
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
    #[error("Model error: {0}")]
    Llm(#[from] LlmError),
}

/// A completed query against one collection.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub collection: String,
    pub answer: String,
    pub context: RetrievedContext,
}

/// Picks the best outcome from a fan-out.
pub trait RankingStrategy: Send + Sync {
    fn pick<'a>(&self, outcomes: &'a [QueryOutcome]) -> Option<&'a QueryOutcome>;
}

/// Crude but serviceable default: prefer the longest answer, which
/// correlates with the model having found substantive context.
pub struct LongestAnswer;

impl RankingStrategy for LongestAnswer {
    fn pick<'a>(&self, outcomes: &'a [QueryOutcome]) -> Option<&'a QueryOutcome> {
        outcomes.iter().max_by_key(|o| o.answer.len())
    }
}

#[derive(Clone)]
pub struct QueryEngine {
    config: Arc<PipelineConfig>,
    embedder: Arc<dyn EmbeddingPort>,
    completion: Arc<dyn CompletionPort>,
    index: Arc<dyn VectorIndex>,
    locks: Arc<CollectionLocks>,
}

impl QueryEngine {
    pub fn new(
        config: Arc<PipelineConfig>,
        embedder: Arc<dyn EmbeddingPort>,
        completion: Arc<dyn CompletionPort>,
        index: Arc<dyn VectorIndex>,
        locks: Arc<CollectionLocks>,
    ) -> Self {
        Self {
            config,
            embedder,
            completion,
            index,
            locks,
        }
    }

    /// Answer a question against one collection.
    pub async fn query_collection(
        &self,
        collection: &str,
        question: &str,
    ) -> Result<QueryOutcome, EngineError> {
        let available = self.index.list_collections().await?;
        if !available.iter().any(|c| c == collection) {
            return Err(EngineError::CollectionNotFound {
                name: collection.to_string(),
                available,
            });
        }

        // Hold the read half so a concurrent rebuild cannot swap the
        // collection out from under the retrieval.
        let lock = self.locks.for_collection(collection);
        let _guard = lock.read().await;

        let store = self.load_store(collection);
        let retriever = AutoMergingRetriever::new(
            Arc::clone(&self.embedder),
            Arc::clone(&self.index),
            store,
            collection,
            self.config.similarity_top_k,
            self.config.merge_threshold,
        );
        let context = retriever.retrieve(question).await?;

        let composer = AnswerComposer::new(Arc::clone(&self.completion));
        let answer = composer.compose(question, &context.units).await?;

        info!(
            collection = %collection,
            units = context.units.len(),
            merged = context.used_auto_merging,
            "Answered query"
        );
        Ok(QueryOutcome {
            collection: collection.to_string(),
            answer,
            context,
        })
    }

    /// Fan a question out to every collection. The result map always has
    /// one entry per collection; failures carry their error text.
    pub async fn query_all(
        &self,
        question: &str,
    ) -> Result<BTreeMap<String, Result<QueryOutcome, String>>, EngineError> {
        let collections = self.index.list_collections().await?;
        if collections.is_empty() {
            return Err(EngineError::NoCollections);
        }

        let mut tasks = Vec::with_capacity(collections.len());
        for collection in collections {
            let engine = self.clone();
            let question = question.to_string();
            tasks.push(tokio::spawn(async move {
                let result = tokio::time::timeout(
                    COLLECTION_QUERY_TIMEOUT,
                    engine.query_collection(&collection, &question),
                )
                .await;
                let outcome = match result {
                    Ok(Ok(outcome)) => Ok(outcome),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err("query timed out".to_string()),
                };
                (collection, outcome)
            }));
        }

        let mut results = BTreeMap::new();
        for task in tasks {
            match task.await {
                Ok((collection, outcome)) => {
                    if let Err(e) = &outcome {
                        warn!(collection = %collection, error = %e, "Collection query failed");
                    }
                    results.insert(collection, outcome);
                }
                Err(e) => warn!(error = %e, "Collection query task panicked"),
            }
        }
        Ok(results)
    }

    /// Fan out and keep only the best answer per the given strategy.
    pub async fn query_best(
        &self,
        question: &str,
        strategy: &dyn RankingStrategy,
    ) -> Result<QueryOutcome, EngineError> {
        let results = self.query_all(question).await?;
        let outcomes: Vec<QueryOutcome> =
            results.into_values().filter_map(|r| r.ok()).collect();
        strategy
            .pick(&outcomes)
            .cloned()
            .ok_or(EngineError::AllFailed)
    }

    /// Load the collection's node store; any failure means degraded
    /// retrieval rather than a hard error.
    fn load_store(&self, collection: &str) -> Option<NodeStore> {
        if !self.config.enable_auto_merging {
            return None;
        }
        match NodeStore::load(&self.config.docstore_dir, collection) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(collection = %collection, error = %e, "Node store unavailable, querying without merging");
                None
            }
        }
    }
}
