//! Pipeline Configuration
//!
//! All tunables live in one `PipelineConfig` value loaded from the
//! environment and threaded through every component constructor. There is
//! deliberately no global "current model" state.

use std::path::PathBuf;
use thiserror::Error;

/// Default target sizes per hierarchy level, coarsest first (bytes).
pub const DEFAULT_CHUNK_SIZES: &[usize] = &[2048, 512, 128];

/// Default number of leaves retrieved per query.
pub const DEFAULT_TOP_K: usize = 6;

/// Default merge threshold: a parent is promoted when the retrieved
/// fraction of its children is strictly greater than this.
pub const DEFAULT_MERGE_THRESHOLD: f64 = 0.5;

/// Default embedding vector width.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 3072;

/// Default bound on concurrent synopsis requests.
pub const DEFAULT_SUMMARY_CONCURRENCY: usize = 4;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

/// Complete pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// OpenAI-compatible API key.
    pub api_key: String,
    /// OpenAI-compatible base URL, e.g. `https://api.openai.com/v1`.
    pub api_base_url: String,
    /// Chat model used for synopses and answers.
    pub chat_model: String,
    /// Embedding model.
    pub embedding_model: String,
    /// Embedding vector width. Fixed at collection-creation time; changing
    /// it invalidates existing collections and requires a full rebuild.
    pub embedding_dimensions: usize,
    /// Chroma server base URL.
    pub chroma_url: String,
    /// Target segment sizes per level, coarsest first, strictly decreasing.
    pub chunk_sizes: Vec<usize>,
    /// Leaves retrieved per query before merging.
    pub similarity_top_k: usize,
    /// Strict-greater-than fraction for parent promotion.
    pub merge_threshold: f64,
    /// Whether retrieval attempts auto-merging at all.
    pub enable_auto_merging: bool,
    /// Bound on concurrent synopsis generation requests.
    pub summary_concurrency: usize,
    /// Directory holding one node-store JSON file per collection.
    pub docstore_dir: PathBuf,
    /// Directory scanned for PDFs by `ingest`.
    pub pdf_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("strata");
        Self {
            api_key: String::new(),
            api_base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-3-large".to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            chroma_url: "http://127.0.0.1:8000".to_string(),
            chunk_sizes: DEFAULT_CHUNK_SIZES.to_vec(),
            similarity_top_k: DEFAULT_TOP_K,
            merge_threshold: DEFAULT_MERGE_THRESHOLD,
            enable_auto_merging: true,
            summary_concurrency: DEFAULT_SUMMARY_CONCURRENCY,
            docstore_dir: data_dir.join("docstore"),
            pdf_dir: PathBuf::from("data/pdfs"),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for everything except credentials.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.api_key = key;
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config.api_base_url = url;
        }
        if let Ok(model) = std::env::var("CHAT_MODEL") {
            config.chat_model = model;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Ok(dims) = std::env::var("EMBEDDING_DIMENSIONS") {
            config.embedding_dimensions = dims
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSIONS", dims))?;
        }
        if let Ok(url) = std::env::var("CHROMA_URL") {
            config.chroma_url = url;
        }
        if let Ok(sizes) = std::env::var("CHUNK_SIZES") {
            config.chunk_sizes = parse_chunk_sizes(&sizes)?;
        }
        if let Ok(k) = std::env::var("SIMILARITY_TOP_K") {
            config.similarity_top_k = k
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SIMILARITY_TOP_K", k))?;
        }
        if let Ok(t) = std::env::var("MERGE_THRESHOLD") {
            config.merge_threshold = t
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MERGE_THRESHOLD", t))?;
        }
        if let Ok(flag) = std::env::var("ENABLE_AUTO_MERGING") {
            config.enable_auto_merging = flag.to_lowercase() == "true";
        }
        if let Ok(dir) = std::env::var("DOCSTORE_DIR") {
            config.docstore_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("PDF_DIRECTORY") {
            config.pdf_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Validate that credentials required for model calls are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingVar("OPENAI_API_KEY"));
        }
        Ok(())
    }
}

/// Parse a comma-separated size list, e.g. `"2048,512,128"`.
fn parse_chunk_sizes(raw: &str) -> Result<Vec<usize>, ConfigError> {
    raw.split(',')
        .map(|s| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue("CHUNK_SIZES", raw.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk_sizes() {
        assert_eq!(parse_chunk_sizes("2048,512,128").unwrap(), vec![2048, 512, 128]);
        assert_eq!(parse_chunk_sizes(" 200 , 50 ").unwrap(), vec![200, 50]);
        assert!(parse_chunk_sizes("200,fifty").is_err());
    }

    #[test]
    fn test_validate_requires_api_key() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            api_key: "sk-test".to_string(),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
