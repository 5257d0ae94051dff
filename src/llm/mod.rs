//! Model Ports
//!
//! Two capability ports the pipeline depends on: text completion and
//! text embedding. Implementations are injected through constructors;
//! nothing in the pipeline knows which vendor sits behind them.

mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Model HTTP error: {0}")]
    Http(String),
    #[error("Malformed model response: {0}")]
    Malformed(String),
    #[error("Model request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Http(e.to_string())
    }
}

/// Prompt in, generated text out.
#[async_trait]
pub trait CompletionPort: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Texts in, fixed-dimension vectors out (one per input, same order).
#[async_trait]
pub trait EmbeddingPort: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;

    /// Vector width every returned embedding has. Fixed per collection.
    fn dimensions(&self) -> usize;
}
