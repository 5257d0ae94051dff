//! Test doubles: a deterministic feature-hash embedder, a scripted
//! completion stub, and an in-memory vector index with cosine search.
//! No network, no model keys, stable across runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::index::{IndexError, LeafRecord, SearchHit, VectorIndex};
use crate::llm::{CompletionPort, EmbeddingPort, LlmError};

/// Hashes word features into a fixed-width vector. Similar texts share
/// buckets, so cosine ranking behaves like a crude semantic search.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text.to_lowercase().split_whitespace() {
            let word: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
            if word.is_empty() {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimensions;
            vector[bucket] += 1.0;
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingPort for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Returns a fixed answer for every prompt and records the prompts it saw.
pub struct ScriptedCompletion {
    pub answer: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CompletionPort for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}

/// In-memory vector index with exact cosine search.
#[derive(Default)]
pub struct MemoryIndex {
    collections: Mutex<HashMap<String, Vec<LeafRecord>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn create_collection(&self, name: &str) -> Result<(), IndexError> {
        let mut map = self.collections.lock();
        if map.contains_key(name) {
            return Err(IndexError::InvalidInput(format!(
                "collection already exists: {}",
                name
            )));
        }
        map.insert(name.to_string(), Vec::new());
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), IndexError> {
        self.collections.lock().remove(name);
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        let mut names: Vec<String> = self.collections.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn upsert(&self, collection: &str, records: Vec<LeafRecord>) -> Result<(), IndexError> {
        let mut map = self.collections.lock();
        let existing = map
            .get_mut(collection)
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;
        for record in records {
            existing.retain(|r| r.id != record.id);
            existing.push(record);
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let map = self.collections.lock();
        let records = map
            .get(collection)
            .ok_or_else(|| IndexError::CollectionNotFound(collection.to_string()))?;

        let mut hits: Vec<SearchHit> = records
            .iter()
            .map(|r| SearchHit {
                id: r.id.clone(),
                score: cosine(embedding, &r.embedding),
                document: Some(r.document.clone()),
                metadata: Some(r.metadata.clone()),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}
