//! Chroma HTTP Adapter
//!
//! Direct HTTP client for Chroma's REST API. Uses reqwest instead of
//! third-party wrapper crates for stability and full API control.
//! Collections are addressed by name externally; the server-assigned
//! collection id is resolved per call.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{IndexError, LeafRecord, SearchHit, VectorIndex};

/// Chroma collection info returned by the API.
#[derive(Debug, Clone, Deserialize)]
struct CollectionInfo {
    id: String,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct QueryResult {
    ids: Vec<Vec<String>>,
    documents: Option<Vec<Vec<Option<String>>>>,
    metadatas: Option<Vec<Vec<Option<Value>>>>,
    distances: Option<Vec<Vec<f32>>>,
}

#[derive(Clone)]
pub struct ChromaIndex {
    http: Client,
    base_url: String,
    tenant: String,
    database: String,
}

impl ChromaIndex {
    pub fn new(base_url: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tenant: "default_tenant".to_string(),
            database: "default_database".to_string(),
        }
    }

    /// Health check: true if the server answers the heartbeat.
    pub async fn heartbeat(&self) -> Result<bool, IndexError> {
        debug!("Chroma heartbeat check");
        let resp = self
            .http
            .get(format!("{}/api/v1/heartbeat", self.base_url))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v1/tenants/{}/databases/{}/collections",
            self.base_url, self.tenant, self.database
        )
    }

    async fn fetch_collections(&self) -> Result<Vec<CollectionInfo>, IndexError> {
        let resp = self.http.get(self.collections_url()).send().await?;
        if !resp.status().is_success() {
            return Err(IndexError::Http(format!(
                "List collections failed: {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| IndexError::Deserialize(e.to_string()))
    }

    /// Resolve a collection name to its server-side id.
    async fn resolve(&self, name: &str) -> Result<String, IndexError> {
        self.fetch_collections()
            .await?
            .into_iter()
            .find(|c| c.name == name)
            .map(|c| c.id)
            .ok_or_else(|| IndexError::CollectionNotFound(name.to_string()))
    }
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    async fn create_collection(&self, name: &str) -> Result<(), IndexError> {
        let body = json!({ "name": name, "get_or_create": false });
        let resp = self
            .http
            .post(self.collections_url())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(name = %name, status = %status, "Collection create failed");
            return Err(IndexError::Http(format!(
                "Create collection failed ({}): {}",
                status, text
            )));
        }

        info!(name = %name, "Created collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), IndexError> {
        let resp = self
            .http
            .delete(format!("{}/{}", self.collections_url(), name))
            .send()
            .await?;

        if resp.status().as_u16() == 404 {
            warn!(name = %name, "Collection already deleted (404)");
            Ok(())
        } else if resp.status().is_success() {
            info!(name = %name, "Deleted collection");
            Ok(())
        } else {
            Err(IndexError::Http(format!(
                "Delete collection failed: {}",
                resp.status()
            )))
        }
    }

    async fn list_collections(&self) -> Result<Vec<String>, IndexError> {
        Ok(self
            .fetch_collections()
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect())
    }

    async fn upsert(&self, collection: &str, records: Vec<LeafRecord>) -> Result<(), IndexError> {
        if records.is_empty() {
            return Err(IndexError::InvalidInput("records cannot be empty".to_string()));
        }
        let collection_id = self.resolve(collection).await?;

        let count = records.len();
        let mut ids = Vec::with_capacity(count);
        let mut documents = Vec::with_capacity(count);
        let mut embeddings = Vec::with_capacity(count);
        let mut metadatas = Vec::with_capacity(count);
        for record in records {
            ids.push(record.id);
            documents.push(record.document);
            embeddings.push(record.embedding);
            metadatas.push(record.metadata);
        }

        let body = json!({
            "ids": ids,
            "documents": documents,
            "embeddings": embeddings,
            "metadatas": metadatas,
        });

        let resp = self
            .http
            .post(format!(
                "{}/api/v1/collections/{}/upsert",
                self.base_url, collection_id
            ))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Chroma HTTP error");
            return Err(IndexError::Http(format!("Upsert failed: {}", text)));
        }

        info!(collection = %collection, count = count, "Upserted leaf records");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let collection_id = self.resolve(collection).await?;

        let body = json!({
            "query_embeddings": [embedding],
            "n_results": k as u32,
            "include": ["documents", "metadatas", "distances"],
        });

        debug!(collection = %collection, k = k, "Querying collection");
        let resp = self
            .http
            .post(format!(
                "{}/api/v1/collections/{}/query",
                self.base_url, collection_id
            ))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Chroma HTTP error");
            return Err(IndexError::Http(format!("Query failed: {}", text)));
        }

        let result: QueryResult = resp
            .json()
            .await
            .map_err(|e| IndexError::Deserialize(e.to_string()))?;

        let mut hits = Vec::new();
        if let Some(ids) = result.ids.first() {
            for (i, id) in ids.iter().enumerate() {
                let document = result
                    .documents
                    .as_ref()
                    .and_then(|d| d.first())
                    .and_then(|d| d.get(i))
                    .and_then(|d| d.clone());
                let metadata = result
                    .metadatas
                    .as_ref()
                    .and_then(|m| m.first())
                    .and_then(|m| m.get(i))
                    .and_then(|m| m.clone());
                let distance = result
                    .distances
                    .as_ref()
                    .and_then(|d| d.first())
                    .and_then(|d| d.get(i))
                    .copied()
                    .unwrap_or(f32::MAX);

                hits.push(SearchHit {
                    id: id.clone(),
                    // Chroma returns distances; smaller is closer.
                    score: 1.0 / (1.0 + distance),
                    document,
                    metadata,
                });
            }
        }

        Ok(hits)
    }
}
