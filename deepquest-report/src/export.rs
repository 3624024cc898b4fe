//! Rendering a report to Markdown and HTML

use crate::types::{OutlineNode, Report};

/// Render the report as a single Markdown document
pub fn render_markdown(report: &Report) -> String {
    let mut out = format!("# {}\n\n", report.title);

    if let Some(failure) = &report.failure {
        out.push_str(&format!(
            "> **Research run failed:** {}\n> The sections below are a best-effort synthesis of the partial findings.\n\n",
            failure
        ));
    } else if !report.complete {
        out.push_str("> **Note:** some sections could not be fully generated; see the warnings at the end.\n\n");
    }

    for section in &report.sections {
        render_section_markdown(section, 2, &mut out);
    }

    if !report.warnings.is_empty() {
        out.push_str("---\n\n## Generation warnings\n\n");
        for warning in &report.warnings {
            out.push_str(&format!("- **{}**: {}\n", warning.section, warning.message));
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "*Generated at {}*\n",
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    ));
    out
}

fn render_section_markdown(section: &OutlineNode, level: usize, out: &mut String) {
    // Markdown only goes down to h6
    let hashes = "#".repeat(level.min(6));
    out.push_str(&format!("{} {}\n\n", hashes, section.title));

    if !section.content.is_empty() {
        out.push_str(section.content.trim());
        out.push_str("\n\n");
    }

    for subsection in &section.subsections {
        render_section_markdown(subsection, level + 1, out);
    }
}

/// Render the report as a standalone HTML document
pub fn render_html(report: &Report) -> String {
    let mut body = String::new();
    body.push_str(&format!("<h1>{}</h1>\n", escape_html(&report.title)));

    if let Some(failure) = &report.failure {
        body.push_str(&format!(
            "<p class=\"failure\"><strong>Research run failed:</strong> {}</p>\n",
            escape_html(failure)
        ));
    }

    for section in &report.sections {
        render_section_html(section, 2, &mut body);
    }

    if !report.warnings.is_empty() {
        body.push_str("<hr/>\n<h2>Generation warnings</h2>\n<ul>\n");
        for warning in &report.warnings {
            body.push_str(&format!(
                "<li><strong>{}</strong>: {}</li>\n",
                escape_html(&warning.section),
                escape_html(&warning.message)
            ));
        }
        body.push_str("</ul>\n");
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{}</title>
    <style>
        body {{
            font-family: Georgia, serif;
            line-height: 1.6;
            max-width: 800px;
            margin: 0 auto;
            padding: 20px;
            color: #333;
        }}
        h1 {{
            text-align: center;
            border-bottom: 2px solid #eee;
            padding-bottom: 10px;
        }}
        h2 {{
            border-bottom: 1px solid #eee;
            padding-bottom: 5px;
            margin-top: 30px;
        }}
        .failure {{
            background: #fff3f3;
            border-left: 4px solid #c0392b;
            padding: 10px 15px;
        }}
    </style>
</head>
<body>
{}</body>
</html>
"#,
        escape_html(&report.title),
        body
    )
}

fn render_section_html(section: &OutlineNode, level: usize, out: &mut String) {
    let level = level.min(6);
    out.push_str(&format!(
        "<h{}>{}</h{}>\n",
        level,
        escape_html(&section.title),
        level
    ));

    if !section.content.is_empty() {
        for paragraph in section.content.split("\n\n").filter(|p| !p.trim().is_empty()) {
            out.push_str(&format!("<p>{}</p>\n", escape_html(paragraph.trim())));
        }
    }

    for subsection in &section.subsections {
        render_section_html(subsection, level + 1, out);
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SectionWarning;
    use chrono::Utc;

    fn sample_report() -> Report {
        let mut top = OutlineNode::new("First question", 0, None);
        top.content = "Answer one.".to_string();
        let mut sub = OutlineNode::new("Nested question", 0, None);
        sub.content = "Nested answer.".to_string();
        top.subsections.push(sub);

        Report {
            title: "Example study".to_string(),
            sections: vec![top],
            generated_at: Utc::now(),
            complete: true,
            failure: None,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn markdown_nests_headings_by_level() {
        let markdown = render_markdown(&sample_report());
        assert!(markdown.contains("# Example study"));
        assert!(markdown.contains("## First question"));
        assert!(markdown.contains("### Nested question"));
        assert!(markdown.contains("Answer one."));
    }

    #[test]
    fn markdown_surfaces_failure_banner() {
        let mut report = sample_report();
        report.complete = false;
        report.failure = Some("all 2 sub-questions failed".to_string());

        let markdown = render_markdown(&report);
        assert!(markdown.contains("**Research run failed:** all 2 sub-questions failed"));
    }

    #[test]
    fn markdown_lists_warnings() {
        let mut report = sample_report();
        report.complete = false;
        report.warnings.push(SectionWarning {
            section: "First question".to_string(),
            message: "expansion failed: timeout".to_string(),
        });

        let markdown = render_markdown(&report);
        assert!(markdown.contains("## Generation warnings"));
        assert!(markdown.contains("expansion failed: timeout"));
    }

    #[test]
    fn html_escapes_content() {
        let mut report = sample_report();
        report.sections[0].content = "a < b && b > c".to_string();

        let html = render_html(&report);
        assert!(html.contains("a &lt; b &amp;&amp; b &gt; c"));
        assert!(html.contains("<h2>First question</h2>"));
        assert!(html.contains("<h3>Nested question</h3>"));
    }
}
