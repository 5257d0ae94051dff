//! Interior Segment Summaries
//!
//! Generates a 2-3 sentence synopsis for every non-leaf segment through
//! the completion port, a bounded number in flight at once. A failed
//! generation never aborts the batch: the segment falls back to a prefix
//! of its own text, and the result is tagged so callers can tell the two
//! apart.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::chunk::Segment;
use crate::llm::CompletionPort;

/// Synopsis input is truncated to this many bytes of segment text.
const SYNOPSIS_INPUT_LIMIT: usize = 3000;

/// Fallback synopsis length (prefix of the segment's own text).
const FALLBACK_PREFIX_LEN: usize = 150;

/// Where a synopsis came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynopsisSource {
    /// Produced by the completion port.
    Generated,
    /// Prefix of the segment's own text after a generation failure.
    Fallback,
}

/// A synopsis for one interior segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Synopsis {
    pub text: String,
    pub source: SynopsisSource,
}

impl Synopsis {
    pub fn is_fallback(&self) -> bool {
        self.source == SynopsisSource::Fallback
    }
}

/// Segment id to synopsis. Guaranteed to hold an entry for every segment
/// passed to `Summarizer::summarize`.
pub type SynopsisMap = HashMap<String, Synopsis>;

pub struct Summarizer {
    completion: Arc<dyn CompletionPort>,
    concurrency: usize,
}

impl Summarizer {
    pub fn new(completion: Arc<dyn CompletionPort>, concurrency: usize) -> Self {
        Self {
            completion,
            concurrency: concurrency.max(1),
        }
    }

    /// Summarize every given segment independently. Order of completion
    /// is irrelevant; results are keyed by segment id.
    pub async fn summarize(&self, segments: &[&Segment]) -> SynopsisMap {
        let results: Vec<(String, Synopsis)> = stream::iter(segments.iter().copied())
            .map(|segment| {
                let completion = Arc::clone(&self.completion);
                async move {
                    let synopsis = summarize_one(completion.as_ref(), segment).await;
                    (segment.id.clone(), synopsis)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let fallbacks = results.iter().filter(|(_, s)| s.is_fallback()).count();
        info!(
            total = results.len(),
            fallbacks = fallbacks,
            "Generated interior synopses"
        );
        results.into_iter().collect()
    }
}

async fn summarize_one(completion: &dyn CompletionPort, segment: &Segment) -> Synopsis {
    let excerpt = truncate_at_char_boundary(&segment.text, SYNOPSIS_INPUT_LIMIT);
    let prompt = format!(
        "Provide a concise summary (2-3 sentences, max 100 tokens) of this text section: {} Summary:",
        excerpt
    );

    match completion.complete(&prompt).await {
        Ok(text) if !text.trim().is_empty() => Synopsis {
            text: text.trim().to_string(),
            source: SynopsisSource::Generated,
        },
        Ok(_) => {
            warn!(segment = %segment.id, "Empty synopsis response, using fallback");
            fallback_synopsis(segment)
        }
        Err(e) => {
            warn!(segment = %segment.id, error = %e, "Synopsis generation failed, using fallback");
            fallback_synopsis(segment)
        }
    }
}

fn fallback_synopsis(segment: &Segment) -> Synopsis {
    let prefix = truncate_at_char_boundary(&segment.text, FALLBACK_PREFIX_LEN);
    Synopsis {
        text: format!("{}...", prefix.trim_end()),
        source: SynopsisSource::Fallback,
    }
}

fn truncate_at_char_boundary(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SegmentMetadata;
    use crate::llm::LlmError;
    use async_trait::async_trait;

    fn segment(id: &str, text: &str) -> Segment {
        Segment {
            id: id.to_string(),
            text: text.to_string(),
            level: 1,
            parent_id: None,
            child_ids: vec!["child".to_string()],
            metadata: SegmentMetadata {
                filename: "doc.pdf".to_string(),
                file_path: "/doc.pdf".to_string(),
                collection: "doc".to_string(),
                page_start: 1,
                page_end: 1,
                total_pages: 1,
                source_type: "pdf".to_string(),
            },
        }
    }

    /// Fails for any prompt containing the given marker.
    struct FlakyCompletion {
        fail_marker: String,
    }

    #[async_trait]
    impl CompletionPort for FlakyCompletion {
        async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
            if prompt.contains(&self.fail_marker) {
                Err(LlmError::Http("connection reset".to_string()))
            } else {
                Ok("A short generated synopsis.".to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_every_segment_gets_an_entry() {
        let completion = Arc::new(FlakyCompletion {
            fail_marker: "UNSTABLE".to_string(),
        });
        let summarizer = Summarizer::new(completion, 2);

        let good = segment("a", "Ordinary section text about storage engines.");
        let bad = segment("b", "UNSTABLE section that the model refuses.");
        let map = summarizer.summarize(&[&good, &bad]).await;

        assert_eq!(map.len(), 2);
        assert_eq!(map["a"].source, SynopsisSource::Generated);
        assert_eq!(map["b"].source, SynopsisSource::Fallback);
        assert!(map["b"].text.starts_with("UNSTABLE section"));
        assert!(map["b"].text.ends_with("..."));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "héllo wörld";
        let truncated = truncate_at_char_boundary(text, 2);
        assert_eq!(truncated, "h");
        assert_eq!(truncate_at_char_boundary("short", 100), "short");
    }
}
