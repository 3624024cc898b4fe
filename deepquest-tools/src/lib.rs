//! Deepquest Tools - retrieval over web search and the knowledge store
//!
//! Retrieval is best-effort enrichment for leaf solves: a failing or empty
//! tool never fails a research node. Every adapter answers the same
//! contract, ranked text snippets with provenance, and the [`Toolset`]
//! fans a query out across all of them concurrently.

pub mod knowledge;
pub mod web;

pub use knowledge::KnowledgeSearchTool;
pub use web::WebSearchTool;

use async_trait::async_trait;
use deepquest_core::{DeepquestResult, Snippet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Uniform interface over retrieval backends
#[async_trait]
pub trait RetrievalTool: Send + Sync {
    /// Short tool name for logs and provenance
    fn name(&self) -> &str;

    /// Search for snippets relevant to the query. An empty result is not
    /// an error; errors mean the backend itself misbehaved.
    async fn search(&self, query: &str) -> DeepquestResult<Vec<Snippet>>;
}

/// All configured retrieval tools, queried together
pub struct Toolset {
    tools: Vec<Arc<dyn RetrievalTool>>,
    max_results: usize,
}

impl Toolset {
    pub fn new(tools: Vec<Arc<dyn RetrievalTool>>, max_results: usize) -> Self {
        Self { tools, max_results }
    }

    /// A toolset with no backends; `gather` always returns nothing
    pub fn empty() -> Self {
        Self {
            tools: Vec::new(),
            max_results: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run every tool for the query concurrently and merge the snippets
    /// by descending score, bounded by `max_results`.
    ///
    /// Tool failures are logged and skipped; the merged result is empty
    /// only if every tool returned nothing.
    pub async fn gather(&self, query: &str) -> Vec<Snippet> {
        if self.tools.is_empty() {
            return Vec::new();
        }

        let searches = self.tools.iter().map(|tool| {
            let tool = Arc::clone(tool);
            let query = query.to_string();
            async move { (tool.name().to_string(), tool.search(&query).await) }
        });

        let mut merged = Vec::new();
        for (name, result) in futures::future::join_all(searches).await {
            match result {
                Ok(snippets) => {
                    debug!(tool = %name, count = snippets.len(), "Retrieval tool returned");
                    merged.extend(snippets);
                }
                Err(e) => {
                    warn!(tool = %name, error = %e, "Retrieval tool failed, skipping");
                }
            }
        }

        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(self.max_results);
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepquest_core::DeepquestError;

    struct FixedTool {
        name: &'static str,
        snippets: Vec<Snippet>,
    }

    #[async_trait]
    impl RetrievalTool for FixedTool {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, _query: &str) -> DeepquestResult<Vec<Snippet>> {
            Ok(self.snippets.clone())
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl RetrievalTool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }

        async fn search(&self, _query: &str) -> DeepquestResult<Vec<Snippet>> {
            Err(DeepquestError::retrieval("backend down", "test"))
        }
    }

    fn snippet(text: &str, score: f32) -> Snippet {
        Snippet {
            text: text.to_string(),
            source: "test".to_string(),
            score,
        }
    }

    #[tokio::test]
    async fn gather_merges_by_score_and_truncates() {
        let toolset = Toolset::new(
            vec![
                Arc::new(FixedTool {
                    name: "a",
                    snippets: vec![snippet("low", 0.2), snippet("high", 0.9)],
                }),
                Arc::new(FixedTool {
                    name: "b",
                    snippets: vec![snippet("mid", 0.5)],
                }),
            ],
            2,
        );

        let merged = toolset.gather("query").await;
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].text, "high");
        assert_eq!(merged[1].text, "mid");
    }

    #[tokio::test]
    async fn gather_skips_failing_tools() {
        let toolset = Toolset::new(
            vec![
                Arc::new(BrokenTool),
                Arc::new(FixedTool {
                    name: "ok",
                    snippets: vec![snippet("works", 0.7)],
                }),
            ],
            5,
        );

        let merged = toolset.gather("query").await;
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "works");
    }

    #[tokio::test]
    async fn empty_toolset_returns_nothing() {
        assert!(Toolset::empty().gather("query").await.is_empty());
    }
}
