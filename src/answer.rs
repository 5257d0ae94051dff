//! Answer Composition
//!
//! Builds the grounding prompt from retrieved context units and asks the
//! completion port for the final answer. Prompt construction is a pure
//! function so its shape can be pinned down in tests without a model.

use std::sync::Arc;

use crate::llm::{CompletionPort, LlmError};
use crate::retrieve::ContextUnit;

pub struct AnswerComposer {
    completion: Arc<dyn CompletionPort>,
}

impl AnswerComposer {
    pub fn new(completion: Arc<dyn CompletionPort>) -> Self {
        Self { completion }
    }

    pub async fn compose(
        &self,
        question: &str,
        units: &[ContextUnit],
    ) -> Result<String, LlmError> {
        let prompt = build_prompt(question, units);
        let answer = self.completion.complete(&prompt).await?;
        Ok(answer.trim().to_string())
    }
}

/// Assemble the grounding prompt: numbered context blocks with source
/// citations, then the question. Answers must come from the supplied
/// context, not model priors.
pub fn build_prompt(question: &str, units: &[ContextUnit]) -> String {
    let mut context = String::new();
    for (i, unit) in units.iter().enumerate() {
        context.push_str(&format!("[Source {}{}]\n{}\n\n", i + 1, citation(unit), unit.text));
    }

    format!(
        "Context information is below.\n\
         ---------------------\n\
         {}---------------------\n\
         Given the context information and not prior knowledge, \
         answer the question. If the context does not contain the \
         answer, say so.\n\
         Question: {}\n\
         Answer:",
        context, question
    )
}

fn citation(unit: &ContextUnit) -> String {
    match &unit.metadata {
        Some(m) if m.page_start == m.page_end => {
            format!(": {}, page {}", m.filename, m.page_start)
        }
        Some(m) => format!(": {}, pages {}-{}", m.filename, m.page_start, m.page_end),
        None => String::new(),
    }
}
