//! Question decomposition with strict output validation
//!
//! One retry with a stricter reformulation prompt, then
//! `DeepquestError::Decomposition`, which the solver converts into the
//! atomic fallback rather than failing the node.

use crate::prompts;
use deepquest_core::{DeepquestError, DeepquestResult};
use deepquest_llm::{parse_json_lenient, CompletionClient, CompletionRequest, ModelRole};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns a composite question into an ordered list of sub-questions
pub struct Decomposer {
    client: Arc<dyn CompletionClient>,
    max_fanout: usize,
}

impl Decomposer {
    pub fn new(client: Arc<dyn CompletionClient>, max_fanout: usize) -> Self {
        Self { client, max_fanout }
    }

    /// Decompose a question, given the chain of ancestor questions as
    /// context. The returned order is preserved verbatim as child order.
    pub async fn decompose(
        &self,
        question: &str,
        ancestors: &[String],
    ) -> DeepquestResult<Vec<String>> {
        match self.attempt(question, ancestors, false).await {
            Ok(sub_questions) => Ok(sub_questions),
            Err(first_err) => {
                warn!(error = %first_err, "Decomposition attempt failed, retrying with strict prompt");
                self.attempt(question, ancestors, true).await.map_err(|e| {
                    DeepquestError::decomposition(
                        format!("decomposition failed after strict retry: {}", e),
                        "decomposer",
                    )
                })
            }
        }
    }

    async fn attempt(
        &self,
        question: &str,
        ancestors: &[String],
        strict: bool,
    ) -> DeepquestResult<Vec<String>> {
        let (system, user) = prompts::decomposition(question, ancestors, self.max_fanout, strict);
        let request = CompletionRequest::prompted(system, user, ModelRole::Fast);

        let completion = self
            .client
            .complete(request)
            .await
            .map_err(DeepquestError::from)?;

        let candidates = parse_sub_questions(&completion.content).map_err(|e| {
            DeepquestError::decomposition(format!("unparseable sub-question list: {}", e), "decomposer")
        })?;

        let validated = self.validate(question, candidates)?;
        debug!(count = validated.len(), "Decomposition produced sub-questions");
        Ok(validated)
    }

    /// Enforce the decomposition contract: non-empty list, non-empty
    /// members, no self-loop, bounded fanout.
    fn validate(&self, question: &str, candidates: Vec<String>) -> DeepquestResult<Vec<String>> {
        let parent = question.trim().to_lowercase();
        let mut sub_questions: Vec<String> = Vec::new();

        for candidate in candidates {
            let trimmed = candidate.trim();
            if trimmed.is_empty() {
                return Err(DeepquestError::decomposition(
                    "empty sub-question in decomposition output",
                    "decomposer",
                ));
            }
            if trimmed.to_lowercase() == parent {
                return Err(DeepquestError::decomposition(
                    "sub-question repeats the parent question (self-loop)",
                    "decomposer",
                ));
            }
            // Duplicate siblings add no coverage; keep the first occurrence
            if !sub_questions.iter().any(|s| s.eq_ignore_ascii_case(trimmed)) {
                sub_questions.push(trimmed.to_string());
            }
        }

        if sub_questions.is_empty() {
            return Err(DeepquestError::decomposition(
                "decomposition produced no sub-questions",
                "decomposer",
            ));
        }

        if sub_questions.len() > self.max_fanout {
            debug!(
                returned = sub_questions.len(),
                max_fanout = self.max_fanout,
                "Truncating decomposition to max fanout"
            );
            sub_questions.truncate(self.max_fanout);
        }

        Ok(sub_questions)
    }
}

/// Accept both `["q1", "q2"]` and `[{"question": "q1"}, ...]` shapes;
/// models drift between the two however firmly the prompt asks.
fn parse_sub_questions(content: &str) -> Result<Vec<String>, String> {
    let value: Value = parse_json_lenient(content).map_err(|e| e.to_string())?;
    let items = value.as_array().ok_or("expected a JSON array")?;

    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.clone()),
            Value::Object(map) => map
                .get("question")
                .or_else(|| map.get("description"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| "object item lacks a question field".to_string()),
            other => Err(format!("unexpected item type: {}", other)),
        })
        .collect()
}
