//! Complexity evaluation: atomic vs composite
//!
//! The evaluator is deliberately infallible: any problem with the
//! classification call degrades to `Atomic`, the terminating branch, so a
//! flaky classifier can never blow up the recursion.

use crate::prompts;
use deepquest_llm::{parse_json_lenient, CompletionClient, CompletionRequest, ModelRole};
use deepquest_core::{Complexity, ComplexityAssessment};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct Classification {
    composite: bool,
    #[serde(default)]
    rationale: Option<String>,
}

/// Classifies a question as directly answerable or needing decomposition
pub struct ComplexityEvaluator {
    client: Arc<dyn CompletionClient>,
}

impl ComplexityEvaluator {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Evaluate a question given the remaining recursion budget.
    ///
    /// `remaining_budget == 0` forces `Atomic` without consulting the
    /// model; this is the recursion base case.
    pub async fn evaluate(
        &self,
        question: &str,
        depth: usize,
        remaining_budget: usize,
    ) -> ComplexityAssessment {
        if remaining_budget == 0 {
            return ComplexityAssessment::atomic("recursion budget exhausted");
        }

        let (system, user) = prompts::classification(question, depth, remaining_budget);
        let request = CompletionRequest::prompted(system, user, ModelRole::Fast);

        let content = match self.client.complete(request).await {
            Ok(completion) => completion.content,
            Err(e) => {
                warn!(error = %e, "Classification call failed, treating question as atomic");
                return ComplexityAssessment::atomic(format!("classification failed: {}", e));
            }
        };

        match parse_json_lenient::<Classification>(&content) {
            Ok(classification) => {
                debug!(
                    composite = classification.composite,
                    "Complexity classification parsed"
                );
                ComplexityAssessment {
                    complexity: if classification.composite {
                        Complexity::Composite
                    } else {
                        Complexity::Atomic
                    },
                    rationale: classification.rationale,
                }
            }
            Err(e) => {
                warn!(error = %e, "Malformed classification output, using keyword fallback");
                keyword_fallback(&content)
            }
        }
    }
}

/// Last-resort reading of a classification reply that was not valid JSON
fn keyword_fallback(content: &str) -> ComplexityAssessment {
    let lowered = content.to_lowercase();
    let composite = ["composite", "decompose", "multiple", "several aspects", "break down"]
        .iter()
        .any(|keyword| lowered.contains(keyword));

    ComplexityAssessment {
        complexity: if composite {
            Complexity::Composite
        } else {
            Complexity::Atomic
        },
        rationale: Some("keyword fallback after malformed classifier output".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use deepquest_llm::{
        chunks_from_completion, ChunkStream, Completion, LlmError, LlmResult,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedClient {
        reply: LlmResult<&'static str>,
        calls: AtomicUsize,
    }

    impl CannedClient {
        fn new(reply: LlmResult<&'static str>) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for CannedClient {
        async fn complete(&self, _request: CompletionRequest) -> LlmResult<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(Completion {
                    content: text.to_string(),
                    reasoning: None,
                }),
                Err(e) => Err(LlmError::Provider(e.to_string())),
            }
        }

        async fn complete_stream(&self, request: CompletionRequest) -> LlmResult<ChunkStream> {
            Ok(chunks_from_completion(self.complete(request).await?))
        }
    }

    #[tokio::test]
    async fn zero_budget_forces_atomic_without_model_call() {
        let client = Arc::new(CannedClient::new(Ok(r#"{"composite": true}"#)));
        let evaluator = ComplexityEvaluator::new(client.clone());

        let assessment = evaluator.evaluate("huge question", 3, 0).await;

        assert_eq!(assessment.complexity, Complexity::Atomic);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn composite_classification_is_honored() {
        let client = Arc::new(CannedClient::new(Ok(
            r#"{"composite": true, "rationale": "spans two domains"}"#,
        )));
        let evaluator = ComplexityEvaluator::new(client);

        let assessment = evaluator.evaluate("question", 0, 3).await;
        assert!(assessment.is_composite());
        assert_eq!(assessment.rationale.as_deref(), Some("spans two domains"));
    }

    #[tokio::test]
    async fn call_failure_degrades_to_atomic() {
        let client = Arc::new(CannedClient::new(Err(LlmError::Provider(
            "503".to_string(),
        ))));
        let evaluator = ComplexityEvaluator::new(client);

        let assessment = evaluator.evaluate("question", 0, 3).await;
        assert_eq!(assessment.complexity, Complexity::Atomic);
    }

    #[tokio::test]
    async fn malformed_output_uses_keyword_fallback() {
        let client = Arc::new(CannedClient::new(Ok(
            "This question is clearly composite and should be decomposed.",
        )));
        let evaluator = ComplexityEvaluator::new(client);

        let assessment = evaluator.evaluate("question", 0, 3).await;
        assert!(assessment.is_composite());

        let client = Arc::new(CannedClient::new(Ok("A simple lookup.")));
        let evaluator = ComplexityEvaluator::new(client);
        let assessment = evaluator.evaluate("question", 0, 3).await;
        assert_eq!(assessment.complexity, Complexity::Atomic);
    }
}
