//! Coarse-grained progress events for external status trackers
//!
//! The orchestrator and the report organizer emit these at milestones. The
//! sink is fire-and-forget: emission never blocks and a dropped receiver is
//! silently ignored, so a slow or absent consumer cannot stall research.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Milestones a run passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStage {
    RunStarted,
    Evaluating,
    DecompositionStarted,
    DecompositionFinished,
    ChildrenProgress,
    LeafSolved,
    AggregationDone,
    OutlineBuilt,
    SectionExpanded,
    Completed,
    Failed,
}

/// A single progress update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    /// 0.0 ..= 1.0
    pub progress_percent: f32,
    pub message: String,
}

/// Fire-and-forget emitter of [`ProgressEvent`]s
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    /// A sink that drops every event
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A connected sink plus the receiving end for the status tracker
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, stage: ProgressStage, progress_percent: f32, message: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let event = ProgressEvent {
                stage,
                progress_percent: progress_percent.clamp(0.0, 1.0),
                message: message.into(),
            };
            // Receiver gone means nobody is watching; that is fine.
            let _ = tx.send(event);
        }
    }
}
