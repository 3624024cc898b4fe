//! Recursive research solver
//!
//! Owns the task-tree arena and drives each node through its lifecycle:
//!
//! ```text
//! Pending -> (evaluate) -> Decomposing | Solving
//! Decomposing -> (decompose ok)   -> SolvingChildren
//! Decomposing -> (decompose fail) -> Solving            # atomic fallback
//! SolvingChildren -> (all children terminal) -> Aggregating
//! Aggregating -> Done | Failed
//! Solving -> Done | Failed
//! ```
//!
//! Sibling subtrees run concurrently; each child task owns its node record
//! outright and hands it back on completion, so no node state is ever
//! shared mutably across branches. The knowledge store is the single
//! synchronized append point.

use crate::{decomposer::Decomposer, evaluator::ComplexityEvaluator, prompts};
use deepquest_core::{
    retry_async, DeepquestConfig, DeepquestError, DeepquestResult, KnowledgeStore, NodeId,
    NodeState, ProgressSink, ProgressStage, RateLimiter, ResearchNode, RetrievalConfig,
    RetryConfig, RunConfig, SolveOutcome,
};
use deepquest_llm::{
    collect_stream, Completion, CompletionClient, CompletionRequest, ModelRole, ThrottledClient,
};
use deepquest_tools::Toolset;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Drives a research run from the root question to a terminal task tree
pub struct ResearchSolver {
    inner: Arc<SolverInner>,
}

struct SolverInner {
    client: Arc<dyn CompletionClient>,
    evaluator: ComplexityEvaluator,
    decomposer: Decomposer,
    toolset: Arc<Toolset>,
    knowledge: Arc<KnowledgeStore>,
    run: RunConfig,
    retrieval: RetrievalConfig,
    progress: ProgressSink,
    /// Nodes created so far, bounded by `run.max_total_nodes`
    nodes_created: AtomicUsize,
}

impl ResearchSolver {
    /// Wire a solver from its collaborators. Every model and retrieval
    /// call shares one rate limiter sized by the run configuration.
    pub fn new(
        client: Arc<dyn CompletionClient>,
        toolset: Arc<Toolset>,
        knowledge: Arc<KnowledgeStore>,
        config: &DeepquestConfig,
        progress: ProgressSink,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            config.run.max_concurrent_calls,
            config.run.min_call_interval_ms,
        ));
        let client: Arc<dyn CompletionClient> = Arc::new(ThrottledClient::new(client, limiter));

        Self {
            inner: Arc::new(SolverInner {
                evaluator: ComplexityEvaluator::new(Arc::clone(&client)),
                decomposer: Decomposer::new(Arc::clone(&client), config.run.max_fanout),
                client,
                toolset,
                knowledge: Arc::clone(&knowledge),
                run: config.run.clone(),
                retrieval: config.retrieval.clone(),
                progress,
                nodes_created: AtomicUsize::new(0),
            }),
        }
    }

    /// Access to the knowledge store this solver writes into
    pub fn knowledge(&self) -> Arc<KnowledgeStore> {
        Arc::clone(&self.inner.knowledge)
    }

    /// Run a full research pass over the query.
    ///
    /// Always returns an outcome: a failed root or a run timeout is
    /// reported through `SolveOutcome::failure` together with whatever
    /// knowledge was accumulated, never as a silently partial success.
    pub async fn solve(&self, query: &str) -> DeepquestResult<SolveOutcome> {
        let inner = Arc::clone(&self.inner);
        info!(query = %query, max_depth = inner.run.max_depth, "Starting research run");
        inner
            .progress
            .emit(ProgressStage::RunStarted, 0.02, format!("Starting research: {}", query));

        inner.nodes_created.store(1, Ordering::SeqCst);
        let root = ResearchNode::new(NodeId::root(), query, None, 0);

        let solve_future = SolverInner::solve_node(Arc::clone(&inner), root, Vec::new());
        let outcome = match tokio::time::timeout(inner.run.timeout(), solve_future).await {
            Ok((root_node, descendants)) => {
                let failure = match root_node.state {
                    NodeState::Failed => Some(
                        root_node
                            .error
                            .clone()
                            .unwrap_or_else(|| "root research node failed".to_string()),
                    ),
                    _ => None,
                };

                let mut nodes = HashMap::with_capacity(descendants.len() + 1);
                for node in descendants {
                    nodes.insert(node.id.clone(), node);
                }
                nodes.insert(root_node.id.clone(), root_node);

                SolveOutcome {
                    root_id: NodeId::root(),
                    nodes,
                    failure,
                }
            }
            Err(_) => {
                warn!(
                    timeout_secs = inner.run.timeout_secs,
                    "Research run timed out, abandoning in-flight subtrees"
                );
                let reason = format!("research run timed out after {}s", inner.run.timeout_secs);
                let mut root_node = ResearchNode::new(NodeId::root(), query, None, 0);
                root_node.fail(reason.clone());

                let mut nodes = HashMap::new();
                nodes.insert(root_node.id.clone(), root_node);
                SolveOutcome {
                    root_id: NodeId::root(),
                    nodes,
                    failure: Some(reason),
                }
            }
        };

        match &outcome.failure {
            None => {
                inner
                    .progress
                    .emit(ProgressStage::AggregationDone, 0.75, "Research tree resolved");
                info!(
                    nodes = outcome.nodes.len(),
                    entries = inner.knowledge.len().await,
                    "Research run completed"
                );
            }
            Some(reason) => {
                inner
                    .progress
                    .emit(ProgressStage::Failed, 0.75, format!("Research failed: {}", reason));
                warn!(reason = %reason, "Research run failed");
            }
        }

        Ok(outcome)
    }
}

impl SolverInner {
    /// Solve one node and its subtree; returns the node plus every
    /// descendant node record produced underneath it.
    ///
    /// `ancestors` is the question chain from the root down to (not
    /// including) this node, passed to the decomposer as context.
    fn solve_node(
        inner: Arc<SolverInner>,
        mut node: ResearchNode,
        ancestors: Vec<String>,
    ) -> BoxFuture<'static, (ResearchNode, Vec<ResearchNode>)> {
        async move {
            let remaining = inner.run.remaining_budget(node.depth);
            let is_root = node.parent_id.is_none();
            if is_root {
                inner
                    .progress
                    .emit(ProgressStage::Evaluating, 0.05, "Assessing question complexity");
            }

            let assessment = inner
                .evaluator
                .evaluate(&node.question, node.depth, remaining)
                .await;
            debug!(
                node = %node.id,
                depth = node.depth,
                composite = assessment.is_composite(),
                rationale = assessment.rationale.as_deref().unwrap_or(""),
                "Complexity assessed"
            );

            if assessment.is_composite() {
                node.state = NodeState::Decomposing;
                if is_root {
                    inner.progress.emit(
                        ProgressStage::DecompositionStarted,
                        0.08,
                        "Decomposing into sub-questions",
                    );
                }

                match inner.decomposer.decompose(&node.question, &ancestors).await {
                    Ok(sub_questions) => {
                        if inner.try_reserve_nodes(sub_questions.len()) {
                            return Self::solve_composite(inner, node, sub_questions, ancestors)
                                .await;
                        }
                        warn!(
                            node = %node.id,
                            max_total_nodes = inner.run.max_total_nodes,
                            "Node budget exhausted, solving directly instead of fanning out"
                        );
                    }
                    Err(e) => {
                        warn!(
                            node = %node.id,
                            error = %e,
                            "Decomposition failed, falling back to direct solve"
                        );
                    }
                }
            }

            let node = Self::solve_leaf(&inner, node).await;
            (node, Vec::new())
        }
        .boxed()
    }

    /// Fan out into children, wait for all of them, then aggregate
    async fn solve_composite(
        inner: Arc<SolverInner>,
        mut node: ResearchNode,
        sub_questions: Vec<String>,
        ancestors: Vec<String>,
    ) -> (ResearchNode, Vec<ResearchNode>) {
        let is_root = node.parent_id.is_none();
        let total = sub_questions.len();
        if is_root {
            inner.progress.emit(
                ProgressStage::DecompositionFinished,
                0.15,
                format!("Decomposed into {} sub-questions", total),
            );
        }

        node.state = NodeState::SolvingChildren;
        let mut child_ancestors = ancestors;
        child_ancestors.push(node.question.clone());

        // Children run concurrently but unspawned, so cancelling the run
        // (timeout at the root) drops every in-flight subtree with it.
        // Child order is fixed here, at decomposition time; concurrent
        // completion never reorders it.
        let completed = Arc::new(AtomicUsize::new(0));
        let mut child_futures = Vec::with_capacity(total);
        for (ordinal, question) in sub_questions.iter().enumerate() {
            let child_id = node.id.child(ordinal);
            node.children.push(child_id.clone());

            let child = ResearchNode::new(
                child_id,
                question.clone(),
                Some(node.id.clone()),
                node.depth + 1,
            );
            let inner = Arc::clone(&inner);
            let ancestors = child_ancestors.clone();
            let completed = Arc::clone(&completed);
            child_futures.push(async move {
                let progress = inner.progress.clone();
                let result = Self::solve_node(inner, child, ancestors).await;
                let resolved = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if is_root {
                    progress.emit(
                        ProgressStage::ChildrenProgress,
                        0.15 + 0.5 * resolved as f32 / total as f32,
                        format!("{} of {} sub-questions resolved", resolved, total),
                    );
                }
                result
            });
        }

        let mut children: Vec<ResearchNode> = Vec::with_capacity(total);
        let mut descendants: Vec<ResearchNode> = Vec::new();
        for (child, mut child_descendants) in futures::future::join_all(child_futures).await {
            children.push(child);
            descendants.append(&mut child_descendants);
        }

        let failed = children
            .iter()
            .filter(|c| c.state == NodeState::Failed)
            .count();

        if failed == total {
            node.fail(format!("all {} sub-questions failed", total));
        } else if failed as f64 / total as f64 > inner.run.child_failure_tolerance {
            node.fail(format!(
                "{} of {} sub-questions failed, above the tolerated fraction",
                failed, total
            ));
        } else {
            node.state = NodeState::Aggregating;

            // Failed children enter aggregation as explicit gap notes so
            // the synthesized answer accounts for what is missing.
            let pairs: Vec<(String, String)> = children
                .iter()
                .map(|child| {
                    let answer = match child.state {
                        NodeState::Done => child.answer.clone().unwrap_or_default(),
                        _ => format!(
                            "[No answer available: {}]",
                            child.error.as_deref().unwrap_or("unresolved")
                        ),
                    };
                    (child.question.clone(), answer)
                })
                .collect();

            let (system, user) = prompts::aggregation(&node.question, &pairs);
            let request = CompletionRequest::prompted(system, user, ModelRole::Deep);
            match inner.reasoning_call(request, "aggregation").await {
                Ok(completion) => {
                    debug!(node = %node.id, "Aggregated {} child answers", total);
                    node.complete(completion.content, Vec::new());
                    inner
                        .knowledge
                        .add(
                            node.id.clone(),
                            node.question.clone(),
                            node.answer.clone().unwrap_or_default(),
                            Vec::new(),
                            false,
                        )
                        .await;
                }
                Err(e) => {
                    warn!(node = %node.id, error = %e, "Aggregation call failed");
                    node.fail(format!("aggregation failed: {}", e));
                }
            }
        }

        descendants.extend(children);
        (node, descendants)
    }

    /// Atomic path: best-effort retrieval, then a reasoning call
    async fn solve_leaf(inner: &Arc<SolverInner>, mut node: ResearchNode) -> ResearchNode {
        node.state = NodeState::Solving;
        let is_root = node.parent_id.is_none();

        let snippets = if inner.retrieval.enabled
            && node.depth <= inner.retrieval.max_retrieval_depth
            && !inner.toolset.is_empty()
        {
            inner.toolset.gather(&node.question).await
        } else {
            Vec::new()
        };
        if snippets.is_empty() {
            debug!(node = %node.id, "No retrieval context, solving reasoning-only");
        }

        let (system, user) = prompts::leaf_solve(&node.question, &snippets);
        let request = CompletionRequest::prompted(system, user, ModelRole::Fast);
        match inner.reasoning_call(request, "leaf_solve").await {
            Ok(completion) => {
                node.complete(completion.content, snippets);
                inner
                    .knowledge
                    .add(
                        node.id.clone(),
                        node.question.clone(),
                        node.answer.clone().unwrap_or_default(),
                        node.evidence.clone(),
                        true,
                    )
                    .await;
                if is_root {
                    inner
                        .progress
                        .emit(ProgressStage::LeafSolved, 0.7, "Question answered directly");
                }
            }
            Err(e) => {
                warn!(node = %node.id, error = %e, "Leaf solve failed");
                node.fail(format!("reasoning call failed: {}", e));
            }
        }

        node
    }

    /// One streamed reasoning call with a single retry; the demux loop
    /// folds answer and reasoning-trace chunks as they arrive.
    async fn reasoning_call(
        &self,
        request: CompletionRequest,
        operation: &'static str,
    ) -> DeepquestResult<Completion> {
        let client = Arc::clone(&self.client);
        let completion = retry_async(
            move || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move {
                    let stream = client.complete_stream(request).await?;
                    collect_stream(stream, |chunk| {
                        if chunk.reasoning_delta.is_some() {
                            trace!(operation, "Reasoning trace chunk received");
                        }
                    })
                    .await
                }
                .boxed()
            },
            RetryConfig::single_retry(),
            operation,
        )
        .await
        .map_err(DeepquestError::from)?;

        if completion.content.trim().is_empty() {
            return Err(DeepquestError::reasoning(
                format!("{} returned an empty answer", operation),
                "solver",
            ));
        }
        Ok(completion)
    }

    /// Reserve arena slots for `count` new nodes against the global
    /// ceiling; refusal degrades the caller to the atomic path.
    fn try_reserve_nodes(&self, count: usize) -> bool {
        let mut current = self.nodes_created.load(Ordering::SeqCst);
        loop {
            let next = current + count;
            if next > self.run.max_total_nodes {
                return false;
            }
            match self.nodes_created.compare_exchange(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}
