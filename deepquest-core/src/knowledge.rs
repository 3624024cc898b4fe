//! Append-only knowledge store for solved research nodes
//!
//! Every node that reaches `Done` writes its question/answer/evidence here
//! exactly once. Appends from concurrently solving subtrees are serialized
//! through a single mutex, which also assigns `created_order`, so the
//! counter is a total order with no gaps or duplicates regardless of how
//! child completions interleave.

use crate::types::{NodeId, Snippet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Persisted fact derived from a solved node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Node this entry was derived from
    pub node_id: NodeId,
    /// The question the node answered
    pub question: String,
    /// The answer text
    pub answer: String,
    /// Snippets the answer was grounded on
    pub evidence: Vec<Snippet>,
    /// Completion order within the run, strictly increasing
    pub created_order: u64,
    /// Wall-clock completion time
    pub created_at: DateTime<Utc>,
}

/// Summary counters for progress reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub total_entries: usize,
    /// Entries written by leaf solves (no children)
    pub leaf_entries: usize,
    /// Entries written by aggregation (root-ward nodes)
    pub aggregate_entries: usize,
}

#[derive(Debug, Default)]
struct StoreInner {
    entries: Vec<KnowledgeEntry>,
    leaf_entries: usize,
}

/// Append-only collection of solved-subtask entries
#[derive(Debug, Default)]
pub struct KnowledgeStore {
    inner: Mutex<StoreInner>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, assigning the next `created_order`.
    ///
    /// `is_leaf` only feeds the stats breakdown.
    pub async fn add(
        &self,
        node_id: NodeId,
        question: impl Into<String>,
        answer: impl Into<String>,
        evidence: Vec<Snippet>,
        is_leaf: bool,
    ) -> KnowledgeEntry {
        let mut inner = self.inner.lock().await;
        let entry = KnowledgeEntry {
            node_id,
            question: question.into(),
            answer: answer.into(),
            evidence,
            created_order: inner.entries.len() as u64,
            created_at: Utc::now(),
        };
        if is_leaf {
            inner.leaf_entries += 1;
        }
        inner.entries.push(entry.clone());
        entry
    }

    /// All entries in `created_order`
    pub async fn all(&self) -> Vec<KnowledgeEntry> {
        self.inner.lock().await.entries.clone()
    }

    /// Entry for a specific node, if it completed
    pub async fn get(&self, node_id: &NodeId) -> Option<KnowledgeEntry> {
        self.inner
            .lock()
            .await
            .entries
            .iter()
            .find(|e| &e.node_id == node_id)
            .cloned()
    }

    /// Entries whose node lies in the subtree rooted at `ancestor`,
    /// in `created_order`
    pub async fn subtree(&self, ancestor: &NodeId) -> Vec<KnowledgeEntry> {
        self.inner
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| e.node_id.is_self_or_descendant_of(ancestor))
            .cloned()
            .collect()
    }

    /// Lexical relevance search over stored entries.
    ///
    /// Scores by query-term overlap against question + answer text. Semantic
    /// indexes can stand behind the same contract; this keyword scoring is
    /// the in-process fallback.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<KnowledgeEntry> {
        let terms: Vec<String> = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let inner = self.inner.lock().await;
        let mut scored: Vec<(f32, &KnowledgeEntry)> = inner
            .entries
            .iter()
            .filter_map(|entry| {
                let haystack = format!("{} {}", entry.question, entry.answer).to_lowercase();
                let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                if hits == 0 {
                    None
                } else {
                    Some((hits as f32 / terms.len() as f32, entry))
                }
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(top_k).map(|(_, e)| e.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    pub async fn stats(&self) -> KnowledgeStats {
        let inner = self.inner.lock().await;
        KnowledgeStats {
            total_entries: inner.entries.len(),
            leaf_entries: inner.leaf_entries,
            aggregate_entries: inner.entries.len() - inner.leaf_entries,
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 2)
        .collect()
}
