//! Two-phase report organizer
//!
//! Phase one derives the outline deterministically from the task tree's
//! document order, so rebuilding the outline for the same tree always
//! yields the same section ordering. Phase two expands each outline node
//! with a reasoning call over its subtree's knowledge entries,
//! sequentially, so a subsection prompt can lean on its parent's
//! just-generated content. A failed expansion degrades that one section
//! to a placeholder instead of aborting the report.

use crate::types::{OutlineNode, Report, SectionWarning};
use chrono::Utc;
use deepquest_core::{
    retry_async, KnowledgeEntry, KnowledgeStore, ProgressSink, ProgressStage, ResearchNode,
    RetryConfig, SolveOutcome,
};
use deepquest_llm::{CompletionClient, CompletionRequest, ModelRole};
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

const TITLE_MAX_CHARS: usize = 90;
const CONTEXT_MAX_CHARS: usize = 500;

/// Builds the outline and expands it into the final report
pub struct OutputOrganizer {
    client: Arc<dyn CompletionClient>,
    progress: ProgressSink,
}

impl OutputOrganizer {
    pub fn new(client: Arc<dyn CompletionClient>, progress: ProgressSink) -> Self {
        Self { client, progress }
    }

    /// Run both phases, falling back to knowledge-only sections when the
    /// run failed or timed out. The failure reason, if any, is carried
    /// into the report; a failed run never yields a report claiming to be
    /// complete.
    pub async fn organize(
        &self,
        query: &str,
        outcome: &SolveOutcome,
        knowledge: &KnowledgeStore,
    ) -> Report {
        let root_done = outcome
            .root()
            .map(|root| root.answer.is_some())
            .unwrap_or(false);

        let outline = if root_done && !outcome.is_failed() {
            self.build_outline(outcome)
        } else {
            info!("Run did not complete cleanly, building best-effort outline from knowledge");
            outline_from_knowledge(&knowledge.all().await)
        };
        self.progress.emit(
            ProgressStage::OutlineBuilt,
            0.8,
            format!("Outline built with {} top-level sections", outline.len()),
        );

        let mut report = self.expand(query, outline, knowledge).await;
        report.failure = outcome.failure.clone();
        report.complete = report.failure.is_none() && report.warnings.is_empty();
        report
    }

    /// Phase 1: derive section titles and nesting from the task tree.
    ///
    /// Deterministic: the same tree always produces the same outline, and
    /// section order is fixed here, never by expansion.
    pub fn build_outline(&self, outcome: &SolveOutcome) -> Vec<OutlineNode> {
        let Some(root) = outcome.root() else {
            return Vec::new();
        };

        if root.children.is_empty() {
            return vec![section_from_node(outcome, root, 0)];
        }

        root.children
            .iter()
            .filter_map(|id| outcome.nodes.get(id))
            .enumerate()
            .map(|(index, child)| section_from_node(outcome, child, index))
            .collect()
    }

    /// Phase 2: expand every outline node into prose, in document order.
    pub async fn expand(
        &self,
        query: &str,
        mut outline: Vec<OutlineNode>,
        knowledge: &KnowledgeStore,
    ) -> Report {
        let report_title = section_title(query, 0);
        let total = outline.len().max(1);
        let mut warnings = Vec::new();

        for index in 0..outline.len() {
            let previous_content = index
                .checked_sub(1)
                .map(|i| truncate_chars(&outline[i].content, CONTEXT_MAX_CHARS));
            self.expand_section(
                &report_title,
                &mut outline[index],
                None,
                previous_content.as_deref(),
                knowledge,
                &mut warnings,
            )
            .await;

            self.progress.emit(
                ProgressStage::SectionExpanded,
                0.8 + 0.18 * (index + 1) as f32 / total as f32,
                format!("Expanded section {} of {}", index + 1, outline.len()),
            );
        }

        Report {
            title: report_title,
            sections: outline,
            generated_at: Utc::now(),
            complete: warnings.is_empty(),
            failure: None,
            warnings,
        }
    }

    /// Expand one section, then its subsections with this section's fresh
    /// content as continuity context.
    fn expand_section<'a>(
        &'a self,
        report_title: &'a str,
        section: &'a mut OutlineNode,
        parent_content: Option<&'a str>,
        previous_content: Option<&'a str>,
        knowledge: &'a KnowledgeStore,
        warnings: &'a mut Vec<SectionWarning>,
    ) -> futures::future::BoxFuture<'a, ()> {
        async move {
            let entries = match &section.node_id {
                Some(node_id) => knowledge.subtree(node_id).await,
                None => Vec::new(),
            };

            let (system, user) = expansion_prompts(
                report_title,
                &section.title,
                &entries,
                parent_content,
                previous_content,
            );
            let request = CompletionRequest::prompted(system, user, ModelRole::Deep);

            let client = Arc::clone(&self.client);
            let result = retry_async(
                move || {
                    let client = Arc::clone(&client);
                    let request = request.clone();
                    async move { client.complete(request).await }.boxed()
                },
                RetryConfig::single_retry(),
                "section_expansion",
            )
            .await;

            match result {
                Ok(completion) if !completion.content.trim().is_empty() => {
                    debug!(section = %section.title, "Section expanded");
                    section.content = completion.content;
                }
                Ok(_) => {
                    warn!(section = %section.title, "Section expansion returned empty content");
                    section.content = placeholder(&section.title);
                    warnings.push(SectionWarning {
                        section: section.title.clone(),
                        message: "expansion returned empty content".to_string(),
                    });
                }
                Err(e) => {
                    warn!(section = %section.title, error = %e, "Section expansion failed");
                    section.content = placeholder(&section.title);
                    warnings.push(SectionWarning {
                        section: section.title.clone(),
                        message: format!("expansion failed: {}", e),
                    });
                }
            }

            // Subsections see the parent's just-generated content
            let parent_context = truncate_chars(&section.content, CONTEXT_MAX_CHARS);
            let mut previous: Option<String> = None;
            for subsection in section.subsections.iter_mut() {
                self.expand_section(
                    report_title,
                    subsection,
                    Some(parent_context.as_str()),
                    previous.as_deref(),
                    knowledge,
                    warnings,
                )
                .await;
                previous = Some(truncate_chars(&subsection.content, CONTEXT_MAX_CHARS));
            }
        }
        .boxed()
    }
}

/// Build a section subtree for one research node, collapsing single-child
/// chains: a node with exactly one child shares its child's scope, so the
/// chain adds nesting without adding structure.
fn section_from_node(outcome: &SolveOutcome, node: &ResearchNode, index: usize) -> OutlineNode {
    let mut section = OutlineNode::new(
        section_title(&node.question, index),
        index,
        Some(node.id.clone()),
    );

    let mut children = &node.children;
    while children.len() == 1 {
        match outcome.nodes.get(&children[0]) {
            Some(only_child) => children = &only_child.children,
            None => break,
        }
    }

    for (child_index, child_id) in children.iter().enumerate() {
        if let Some(child) = outcome.nodes.get(child_id) {
            section
                .subsections
                .push(section_from_node(outcome, child, child_index));
        }
    }

    section
}

/// Flat best-effort outline from whatever knowledge entries exist,
/// ordered by the entries' position in the task tree.
fn outline_from_knowledge(entries: &[KnowledgeEntry]) -> Vec<OutlineNode> {
    let mut sorted: Vec<&KnowledgeEntry> = entries.iter().collect();
    sorted.sort_by_key(|entry| entry.node_id.ordinals());

    sorted
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            OutlineNode::new(
                section_title(&entry.question, index),
                index,
                Some(entry.node_id.clone()),
            )
        })
        .collect()
}

/// Derive a section title from a question
fn section_title(question: &str, index: usize) -> String {
    let cleaned = question.trim().trim_end_matches(['?', '.', '!']).trim();
    if cleaned.is_empty() {
        return format!("Section {}", index + 1);
    }
    truncate_chars(cleaned, TITLE_MAX_CHARS)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}

fn placeholder(title: &str) -> String {
    format!(
        "Content for the section \"{}\" could not be generated; see the report warnings.",
        title
    )
}

fn expansion_prompts(
    report_title: &str,
    section_title: &str,
    entries: &[KnowledgeEntry],
    parent_content: Option<&str>,
    previous_content: Option<&str>,
) -> (String, String) {
    let system = "You are a professional research report writer. Write the final \
prose for the given report section: detailed, factual, and coherent with the \
surrounding sections. Output only the section body, without the section heading, \
writing-guide commentary, or meta descriptions."
        .to_string();

    let mut user = format!(
        "Report title: {}\nCurrent section: {}\n",
        report_title, section_title
    );

    if entries.is_empty() {
        user.push_str("\nNo research findings are available for this section; write a brief honest note on what remains open.\n");
    } else {
        user.push_str("\nResearch findings for this section:\n");
        for entry in entries {
            user.push_str(&format!(
                "- {}: {}\n",
                entry.question,
                truncate_chars(&entry.answer, CONTEXT_MAX_CHARS)
            ));
        }
    }

    if let Some(parent) = parent_content {
        user.push_str(&format!(
            "\nThe enclosing section begins:\n{}\n",
            parent
        ));
    }
    if let Some(previous) = previous_content {
        user.push_str(&format!(
            "\nThe preceding section ended with:\n{}\nDo not repeat it.\n",
            previous
        ));
    }

    user.push_str("\nWrite the section content now.");
    (system, user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_are_cleaned_and_bounded() {
        assert_eq!(section_title("Why is the sky blue?", 0), "Why is the sky blue");
        assert_eq!(section_title("  ", 2), "Section 3");

        let long = "x".repeat(200);
        let title = section_title(&long, 0);
        assert!(title.chars().count() <= TITLE_MAX_CHARS + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "日本語のテキストです";
        let truncated = truncate_chars(text, 4);
        assert!(truncated.starts_with("日本語の"));
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
