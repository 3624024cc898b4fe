//! Knowledge-store retrieval adapter
//!
//! Makes already-solved subtasks available as retrieval context for later
//! leaves, so sibling subtrees can build on each other's findings.

use crate::RetrievalTool;
use async_trait::async_trait;
use deepquest_core::{DeepquestResult, KnowledgeStore, Snippet};
use std::sync::Arc;

/// Searches the run's knowledge store
pub struct KnowledgeSearchTool {
    store: Arc<KnowledgeStore>,
    max_results: usize,
}

impl KnowledgeSearchTool {
    pub fn new(store: Arc<KnowledgeStore>, max_results: usize) -> Self {
        Self { store, max_results }
    }
}

#[async_trait]
impl RetrievalTool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        "knowledge_search"
    }

    async fn search(&self, query: &str) -> DeepquestResult<Vec<Snippet>> {
        let entries = self.store.search(query, self.max_results).await;
        let total = entries.len() as f32;

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(rank, entry)| Snippet {
                text: format!("{}\n{}", entry.question, entry.answer),
                source: format!("knowledge:{}", entry.node_id),
                score: (total - rank as f32) / total,
            })
            .collect())
    }
}
