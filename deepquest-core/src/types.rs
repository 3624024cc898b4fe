//! Core data type definitions for the research task tree

use serde::{Deserialize, Serialize};

/// Identifier of a node in the research task tree.
///
/// Ids are hierarchical: the root is `"root"` and the k-th child of a node
/// appends `.k` to its parent's id (`root.0`, `root.0.2`, ...). The ordinal
/// path doubles as the document order of the final report, so sorting by
/// [`NodeId::ordinals`] recovers the tree's depth-first section order even
/// when only knowledge entries survived a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Id of the root node of a run
    pub fn root() -> Self {
        Self("root".to_string())
    }

    /// Id for the child at the given ordinal (0-based)
    pub fn child(&self, ordinal: usize) -> Self {
        Self(format!("{}.{}", self.0, ordinal))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ordinal path below the root; empty for the root itself.
    pub fn ordinals(&self) -> Vec<usize> {
        self.0
            .split('.')
            .skip(1)
            .filter_map(|part| part.parse().ok())
            .collect()
    }

    /// Whether `self` is `ancestor` or lies in its subtree
    pub fn is_self_or_descendant_of(&self, ancestor: &NodeId) -> bool {
        self == ancestor || self.0.starts_with(&format!("{}.", ancestor.0))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a research node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Created, not yet evaluated
    Pending,
    /// Being split into sub-questions
    Decomposing,
    /// Waiting for child subtrees to finish
    SolvingChildren,
    /// Being answered directly (leaf path)
    Solving,
    /// Child answers being merged into this node's answer
    Aggregating,
    /// Answer available
    Done,
    /// Irrecoverably failed
    Failed,
}

impl NodeState {
    /// Whether the node has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Done | NodeState::Failed)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeState::Pending => "pending",
            NodeState::Decomposing => "decomposing",
            NodeState::SolvingChildren => "solving-children",
            NodeState::Solving => "solving",
            NodeState::Aggregating => "aggregating",
            NodeState::Done => "done",
            NodeState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// A retrieval result snippet with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    /// Snippet text
    pub text: String,
    /// Where the snippet came from (URL, knowledge entry id, ...)
    pub source: String,
    /// Relevance score, higher is better
    pub score: f32,
}

/// A node of the research task tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchNode {
    /// Stable identifier, unique within a run
    pub id: NodeId,
    /// The question this node must answer
    pub question: String,
    /// Owning node; the root has none
    pub parent_id: Option<NodeId>,
    /// 0 at the root, parent depth + 1 below
    pub depth: usize,
    /// Current lifecycle state
    pub state: NodeState,
    /// Child ids in sub-question order; this order is preserved into the
    /// final report
    pub children: Vec<NodeId>,
    /// Answer text once `Done`
    pub answer: Option<String>,
    /// Snippets the answer was grounded on
    pub evidence: Vec<Snippet>,
    /// Failure detail when `Failed`
    pub error: Option<String>,
}

impl ResearchNode {
    pub fn new(id: NodeId, question: impl Into<String>, parent_id: Option<NodeId>, depth: usize) -> Self {
        Self {
            id,
            question: question.into(),
            parent_id,
            depth,
            state: NodeState::Pending,
            children: Vec::new(),
            answer: None,
            evidence: Vec::new(),
            error: None,
        }
    }

    /// Mark the node done with the given answer
    pub fn complete(&mut self, answer: String, evidence: Vec<Snippet>) {
        self.answer = Some(answer);
        self.evidence = evidence;
        self.state = NodeState::Done;
    }

    /// Mark the node failed with the given reason
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.error = Some(reason.into());
        self.state = NodeState::Failed;
    }
}

/// Completed research run: the task-tree arena plus the root handle.
///
/// The arena is a flat id-to-node map; parent/child links are id
/// references, and the orchestrator is the only writer during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveOutcome {
    pub root_id: NodeId,
    /// Every node the run produced, keyed by id
    pub nodes: std::collections::HashMap<NodeId, ResearchNode>,
    /// Failure reason when the run as a whole failed (root failed or the
    /// run timed out); partial knowledge may still exist
    pub failure: Option<String>,
}

impl SolveOutcome {
    pub fn root(&self) -> Option<&ResearchNode> {
        self.nodes.get(&self.root_id)
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Nodes in document order: depth-first, children in sub-question
    /// order. This is the order the report mirrors.
    pub fn document_order(&self) -> Vec<&ResearchNode> {
        let mut ordered = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![&self.root_id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(id) {
                ordered.push(node);
                for child in node.children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        ordered
    }
}

/// Outcome of a complexity evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Complexity {
    /// Answerable directly via retrieval + reasoning
    Atomic,
    /// Needs decomposition into sub-questions
    Composite,
}

/// Complexity decision plus the classifier's advisory rationale
#[derive(Debug, Clone)]
pub struct ComplexityAssessment {
    pub complexity: Complexity,
    /// Advisory only, never load-bearing for control flow
    pub rationale: Option<String>,
}

impl ComplexityAssessment {
    pub fn atomic(rationale: impl Into<String>) -> Self {
        Self {
            complexity: Complexity::Atomic,
            rationale: Some(rationale.into()),
        }
    }

    pub fn is_composite(&self) -> bool {
        self.complexity == Complexity::Composite
    }
}
