//! Deepquest Report - structured report synthesis
//!
//! Consumes a completed research run (task tree + knowledge store) and
//! produces the final multi-section report in two phases: a deterministic
//! outline derived from the tree's document order, then sequential
//! expansion of each outline node with the knowledge of its subtree.

pub mod export;
pub mod organizer;
pub mod types;

pub use export::{render_html, render_markdown};
pub use organizer::OutputOrganizer;
pub use types::{OutlineNode, Report, SectionWarning};
