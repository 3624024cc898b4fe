//! End-to-end solver tests against a scripted completion client
//!
//! No network: the mock recognizes which research stage a request belongs
//! to from its system prompt and replies from the test's script.

use async_trait::async_trait;
use deepquest_core::{DeepquestConfig, KnowledgeStore, NodeId, NodeState, ProgressSink};
use deepquest_engine::ResearchSolver;
use deepquest_llm::{
    chunks_from_completion, ChunkStream, Completion, CompletionClient, CompletionRequest,
    LlmError, LlmResult, Role,
};
use deepquest_tools::Toolset;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// (stage, user prompt) -> reply text
type Responder = dyn Fn(&str, &str) -> LlmResult<String> + Send + Sync;

struct ScriptedClient {
    responder: Box<Responder>,
    requests: Mutex<Vec<(String, String)>>,
    delay: Option<Duration>,
}

impl ScriptedClient {
    fn new(responder: impl Fn(&str, &str) -> LlmResult<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn recorded(&self, stage: &str) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == stage)
            .map(|(_, user)| user.clone())
            .collect()
    }
}

fn stage_of(request: &CompletionRequest) -> &'static str {
    let system = request
        .messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .unwrap_or("");
    if system.contains("complexity assessor") {
        "classify"
    } else if system.contains("decomposition expert") {
        "decompose"
    } else if system.contains("research assistant") {
        "leaf"
    } else if system.contains("synthesis expert") {
        "aggregate"
    } else {
        "other"
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> LlmResult<Completion> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let stage = stage_of(&request);
        let user = request
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.requests
            .lock()
            .unwrap()
            .push((stage.to_string(), user.clone()));
        (self.responder)(stage, &user).map(|content| Completion {
            content,
            reasoning: None,
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> LlmResult<ChunkStream> {
        Ok(chunks_from_completion(self.complete(request).await?))
    }
}

fn test_config(max_depth: usize) -> DeepquestConfig {
    let mut config = DeepquestConfig::default();
    config.run.max_depth = max_depth;
    config.run.max_fanout = 5;
    config.run.timeout_secs = 3600;
    config.retrieval.enabled = false;
    config
}

fn solver(client: Arc<ScriptedClient>, config: &DeepquestConfig) -> ResearchSolver {
    ResearchSolver::new(
        client,
        Arc::new(Toolset::empty()),
        Arc::new(KnowledgeStore::new()),
        config,
        ProgressSink::disabled(),
    )
}

/// Scenario A: max_depth = 0 forces an atomic root without any
/// classification call.
#[tokio::test]
async fn depth_zero_forces_single_leaf_solve() {
    let client = Arc::new(ScriptedClient::new(|stage, _| match stage {
        "classify" => Err(LlmError::Provider("classifier must not be called".into())),
        "leaf" => Ok("Four, because addition is commutative and well-defined.".into()),
        other => Err(LlmError::Provider(format!("unexpected stage {}", other))),
    }));
    let config = test_config(0);
    let solver = solver(Arc::clone(&client), &config);

    let outcome = solver.solve("What is 2+2 and why?").await.unwrap();

    assert!(outcome.failure.is_none());
    let root = outcome.root().unwrap();
    assert_eq!(root.state, NodeState::Done);
    assert!(root.children.is_empty());
    assert_eq!(outcome.nodes.len(), 1);
    assert!(client.recorded("classify").is_empty());
    assert_eq!(solver.knowledge().len().await, 1);
}

/// Scenario B: two children solve, aggregation completes the root, and
/// the knowledge store records completion order.
#[tokio::test]
async fn composite_run_aggregates_children_in_order() {
    let root_question = "How do async runtimes differ?";
    let client = Arc::new(ScriptedClient::new(move |stage, user| match stage {
        "classify" => {
            if user.contains("How do async runtimes differ?") {
                Ok(r#"{"composite": true, "rationale": "two comparisons"}"#.into())
            } else {
                Ok(r#"{"composite": false}"#.into())
            }
        }
        "decompose" => Ok(r#"["Q1", "Q2"]"#.into()),
        "leaf" => {
            if user.contains("Q1") {
                Ok("answer one".into())
            } else {
                Ok("answer two".into())
            }
        }
        "aggregate" => Ok("combined answer".into()),
        other => Err(LlmError::Provider(format!("unexpected stage {}", other))),
    }));
    let config = test_config(2);
    let solver = solver(Arc::clone(&client), &config);

    let outcome = solver.solve(root_question).await.unwrap();

    assert!(outcome.failure.is_none());
    let root = outcome.root().unwrap();
    assert_eq!(root.state, NodeState::Done);
    assert_eq!(root.answer.as_deref(), Some("combined answer"));

    // Child order equals the decomposer's returned order
    assert_eq!(root.children, vec![NodeId::root().child(0), NodeId::root().child(1)]);
    let first = &outcome.nodes[&root.children[0]];
    let second = &outcome.nodes[&root.children[1]];
    assert_eq!(first.question, "Q1");
    assert_eq!(second.question, "Q2");
    assert_eq!(first.depth, 1);
    assert_eq!(second.depth, 1);

    // Three knowledge entries; the root completed after both children
    let entries = solver.knowledge().all().await;
    assert_eq!(entries.len(), 3);
    let order_of = |id: &NodeId| {
        entries
            .iter()
            .find(|e| &e.node_id == id)
            .map(|e| e.created_order)
            .unwrap()
    };
    let root_order = order_of(&NodeId::root());
    assert!(root_order > order_of(&root.children[0]));
    assert!(root_order > order_of(&root.children[1]));

    // created_order is strictly increasing with no duplicate node ids
    for window in entries.windows(2) {
        assert!(window[0].created_order < window[1].created_order);
        assert_ne!(window[0].node_id, window[1].node_id);
    }
}

/// Scenario C: one failed child is tolerated; the parent aggregates the
/// survivor plus an explicit gap note.
#[tokio::test(start_paused = true)]
async fn partial_child_failure_keeps_parent_done() {
    let client = Arc::new(ScriptedClient::new(|stage, user| match stage {
        "classify" => {
            if user.contains("root topic") {
                Ok(r#"{"composite": true}"#.into())
            } else {
                Ok(r#"{"composite": false}"#.into())
            }
        }
        "decompose" => Ok(r#"["Q1", "Q2"]"#.into()),
        "leaf" => {
            if user.contains("Q2") {
                Err(LlmError::Provider("model overloaded".into()))
            } else {
                Ok("answer one".into())
            }
        }
        "aggregate" => Ok("synthesis with a gap".into()),
        other => Err(LlmError::Provider(format!("unexpected stage {}", other))),
    }));
    let config = test_config(2);
    let solver = solver(Arc::clone(&client), &config);

    let outcome = solver.solve("root topic").await.unwrap();

    assert!(outcome.failure.is_none());
    let root = outcome.root().unwrap();
    assert_eq!(root.state, NodeState::Done);

    let failed_child = &outcome.nodes[&NodeId::root().child(1)];
    assert_eq!(failed_child.state, NodeState::Failed);
    assert!(failed_child.error.as_deref().unwrap().contains("reasoning call failed"));

    // The aggregation prompt documented the gap
    let aggregate_prompts = client.recorded("aggregate");
    assert_eq!(aggregate_prompts.len(), 1);
    assert!(aggregate_prompts[0].contains("[No answer available"));

    // Only the surviving leaf and the root reached the knowledge store
    let entries = solver.knowledge().all().await;
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.node_id != NodeId::root().child(1)));
}

/// Scenario D: every child failing fails the root; the run reports
/// failure with an empty knowledge store rather than a fake report.
#[tokio::test(start_paused = true)]
async fn all_children_failing_fails_the_root() {
    let client = Arc::new(ScriptedClient::new(|stage, user| match stage {
        "classify" => {
            if user.contains("root topic") {
                Ok(r#"{"composite": true}"#.into())
            } else {
                Ok(r#"{"composite": false}"#.into())
            }
        }
        "decompose" => Ok(r#"["Q1", "Q2"]"#.into()),
        "leaf" => Err(LlmError::Provider("model overloaded".into())),
        other => Err(LlmError::Provider(format!("unexpected stage {}", other))),
    }));
    let config = test_config(2);
    let solver = solver(Arc::clone(&client), &config);

    let outcome = solver.solve("root topic").await.unwrap();

    assert!(outcome.is_failed());
    assert!(outcome.failure.as_deref().unwrap().contains("all 2 sub-questions failed"));
    assert_eq!(outcome.root().unwrap().state, NodeState::Failed);
    assert!(client.recorded("aggregate").is_empty());
    assert_eq!(solver.knowledge().len().await, 0);
}

/// Scenario E: a sub-question identical to the parent is rejected as a
/// self-loop; after the strict retry the node falls back to atomic.
#[tokio::test]
async fn self_loop_decomposition_falls_back_to_atomic() {
    let question = "Why is the sky blue?";
    let client = Arc::new(ScriptedClient::new(move |stage, _| match stage {
        "classify" => Ok(r#"{"composite": true}"#.into()),
        "decompose" => Ok(r#"["Why is the sky blue?"]"#.into()),
        "leaf" => Ok("Rayleigh scattering.".into()),
        other => Err(LlmError::Provider(format!("unexpected stage {}", other))),
    }));
    let config = test_config(2);
    let solver = solver(Arc::clone(&client), &config);

    let outcome = solver.solve(question).await.unwrap();

    assert!(outcome.failure.is_none());
    let root = outcome.root().unwrap();
    assert_eq!(root.state, NodeState::Done);
    assert!(root.children.is_empty());
    assert_eq!(root.answer.as_deref(), Some("Rayleigh scattering."));

    // Normal attempt plus one strict retry
    assert_eq!(client.recorded("decompose").len(), 2);
    assert_eq!(solver.knowledge().len().await, 1);
}

/// Depth is bounded by max_depth: nodes at the boundary are forced atomic
/// without consulting the classifier.
#[tokio::test]
async fn recursion_depth_is_bounded() {
    let decompose_counter = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&decompose_counter);
    let client = Arc::new(ScriptedClient::new(move |stage, _| match stage {
        "classify" => Ok(r#"{"composite": true}"#.into()),
        "decompose" => {
            let mut n = counter.lock().unwrap();
            *n += 1;
            Ok(format!(r#"["branch {}a", "branch {}b"]"#, *n, *n))
        }
        "leaf" => Ok("leaf answer".into()),
        "aggregate" => Ok("aggregate answer".into()),
        other => Err(LlmError::Provider(format!("unexpected stage {}", other))),
    }));
    let config = test_config(2);
    let solver = solver(Arc::clone(&client), &config);

    let outcome = solver.solve("deep topic").await.unwrap();

    assert!(outcome.failure.is_none());
    assert_eq!(outcome.nodes.len(), 7);
    for node in outcome.nodes.values() {
        assert!(node.depth <= 2);
        if node.depth == 2 {
            assert!(node.children.is_empty());
        } else {
            assert_eq!(node.children.len(), 2);
        }
    }

    // Classifier ran for depth 0 and 1 only; depth-2 nodes were forced
    // atomic by the exhausted budget
    assert_eq!(client.recorded("classify").len(), 3);
}

/// Fanout is bounded by max_fanout even when the model over-produces.
#[tokio::test]
async fn fanout_is_truncated_to_configured_maximum() {
    let client = Arc::new(ScriptedClient::new(|stage, user| match stage {
        "classify" => {
            if user.contains("wide topic") {
                Ok(r#"{"composite": true}"#.into())
            } else {
                Ok(r#"{"composite": false}"#.into())
            }
        }
        "decompose" => Ok(r#"["a", "b", "c", "d", "e", "f", "g", "h"]"#.into()),
        "leaf" => Ok("answer".into()),
        "aggregate" => Ok("aggregate".into()),
        other => Err(LlmError::Provider(format!("unexpected stage {}", other))),
    }));
    let mut config = test_config(2);
    config.run.max_fanout = 3;
    let solver = solver(Arc::clone(&client), &config);

    let outcome = solver.solve("wide topic").await.unwrap();

    let root = outcome.root().unwrap();
    assert_eq!(root.children.len(), 3);
    let questions: Vec<_> = root
        .children
        .iter()
        .map(|id| outcome.nodes[id].question.as_str())
        .collect();
    assert_eq!(questions, vec!["a", "b", "c"]);
}

/// The global node ceiling stops fan-out; affected nodes degrade to the
/// atomic path instead of aborting the run.
#[tokio::test]
async fn node_budget_degrades_fanout_to_leaves() {
    let decompose_counter = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&decompose_counter);
    let client = Arc::new(ScriptedClient::new(move |stage, _| match stage {
        "classify" => Ok(r#"{"composite": true}"#.into()),
        "decompose" => {
            let mut n = counter.lock().unwrap();
            *n += 1;
            Ok(format!(r#"["split {}a", "split {}b"]"#, *n, *n))
        }
        "leaf" => Ok("leaf answer".into()),
        "aggregate" => Ok("aggregate answer".into()),
        other => Err(LlmError::Provider(format!("unexpected stage {}", other))),
    }));
    let mut config = test_config(4);
    config.run.max_total_nodes = 3;
    let solver = solver(Arc::clone(&client), &config);

    let outcome = solver.solve("bounded topic").await.unwrap();

    assert!(outcome.failure.is_none());
    assert_eq!(outcome.nodes.len(), 3);
    for child_id in &outcome.root().unwrap().children {
        assert!(outcome.nodes[child_id].children.is_empty());
    }
}

/// A run-level timeout abandons in-flight work and reports failure
/// instead of hanging.
#[tokio::test(start_paused = true)]
async fn run_timeout_fails_the_run() {
    let client = Arc::new(
        ScriptedClient::new(|_, _| Ok("too late".into())).with_delay(Duration::from_secs(120)),
    );
    let mut config = test_config(1);
    config.run.timeout_secs = 5;
    let solver = solver(Arc::clone(&client), &config);

    let outcome = solver.solve("slow topic").await.unwrap();

    assert!(outcome.is_failed());
    assert!(outcome.failure.as_deref().unwrap().contains("timed out"));
    assert_eq!(outcome.root().unwrap().state, NodeState::Failed);
    assert_eq!(solver.knowledge().len().await, 0);
}
