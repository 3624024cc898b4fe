//! Extracting structured JSON from model output
//!
//! Models wrap JSON in code fences or prose more often than not; these
//! helpers strip fences first, then fall back to the outermost bracket
//! span before giving up.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("static regex"))
}

/// Best-effort extraction of a JSON document from free-form model text
pub fn extract_json(text: &str) -> Option<String> {
    if let Some(captures) = fence_regex().captures(text) {
        let fenced = captures[1].trim();
        if !fenced.is_empty() {
            return Some(fenced.to_string());
        }
    }

    // Outermost object or array span, whichever opens first
    let object_span = span(text, '{', '}');
    let array_span = span(text, '[', ']');
    match (object_span, array_span) {
        (Some(o), Some(a)) => Some(if o.0 < a.0 { slice(text, o) } else { slice(text, a) }),
        (Some(o), None) => Some(slice(text, o)),
        (None, Some(a)) => Some(slice(text, a)),
        (None, None) => None,
    }
}

fn span(text: &str, open: char, close: char) -> Option<(usize, usize)> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then_some((start, end))
}

fn slice(text: &str, (start, end): (usize, usize)) -> String {
    text[start..=end].to_string()
}

/// Parse model text as `T`, tolerating fences and surrounding prose
pub fn parse_json_lenient<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    match serde_json::from_str(text.trim()) {
        Ok(value) => Ok(value),
        Err(direct_err) => match extract_json(text) {
            Some(candidate) => serde_json::from_str(&candidate),
            None => Err(direct_err),
        },
    }
}
