//! Report type definitions

use chrono::{DateTime, Utc};
use deepquest_core::NodeId;
use serde::{Deserialize, Serialize};

/// A section (or subsection) of the final report.
///
/// Mirrors the task tree's document order but is a presentation-oriented
/// re-grouping, not a 1:1 copy: shallow single-child chains collapse into
/// one section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineNode {
    /// Section title
    pub title: String,
    /// Position among siblings, 0-based
    pub ordering_index: usize,
    /// Rendered prose; empty until `expand` fills it
    pub content: String,
    /// Subsections in document order
    pub subsections: Vec<OutlineNode>,
    /// The research node this section draws its knowledge from; absent
    /// for sections reconstructed from bare knowledge entries
    pub node_id: Option<NodeId>,
}

impl OutlineNode {
    pub fn new(title: impl Into<String>, ordering_index: usize, node_id: Option<NodeId>) -> Self {
        Self {
            title: title.into(),
            ordering_index,
            content: String::new(),
            subsections: Vec::new(),
            node_id,
        }
    }

    /// Titles of this node and its subtree in document order
    pub fn titles(&self) -> Vec<&str> {
        let mut titles = vec![self.title.as_str()];
        for subsection in &self.subsections {
            titles.extend(subsection.titles());
        }
        titles
    }
}

/// A recorded degradation during report generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionWarning {
    /// Title of the affected section
    pub section: String,
    pub message: String,
}

/// The final research report. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    /// Top-level sections in outline order
    pub sections: Vec<OutlineNode>,
    pub generated_at: DateTime<Utc>,
    /// False when the run failed or any section degraded; a failed run is
    /// never presented as a fully successful report
    pub complete: bool,
    /// Failure reason for failed runs
    pub failure: Option<String>,
    /// Per-section degradations that occurred during expansion
    pub warnings: Vec<SectionWarning>,
}

impl Report {
    /// Total number of sections including nested subsections
    pub fn section_count(&self) -> usize {
        fn count(node: &OutlineNode) -> usize {
            1 + node.subsections.iter().map(count).sum::<usize>()
        }
        self.sections.iter().map(count).sum()
    }
}
