//! Prompt builders for the research stages
//!
//! Each builder returns a (system, user) pair. Prompts ask for bare JSON
//! where the caller parses structure; the lenient JSON extractor still
//! handles fenced or prose-wrapped replies.

use deepquest_core::Snippet;

/// Classification: atomic vs composite
pub fn classification(question: &str, depth: usize, remaining_budget: usize) -> (String, String) {
    let system = "You are a research task complexity assessor. \
Decide whether the given question can be answered directly, or whether it must \
first be decomposed into sub-questions to be answered well. A question needs \
decomposition when it spans several distinct aspects or domains, requires \
multiple investigation steps, or bundles interrelated sub-problems.\n\
Respond with a JSON object: {\"composite\": true or false, \"rationale\": \"one sentence\"}.\n\
Output only the JSON object."
        .to_string();

    let user = format!(
        "Question: {}\nCurrent depth: {}\nRemaining decomposition budget: {}\n\nAssess this question.",
        question, depth, remaining_budget
    );

    (system, user)
}

/// Decomposition into ordered sub-questions; `strict` reformulates after a
/// parse failure
pub fn decomposition(
    question: &str,
    ancestors: &[String],
    max_fanout: usize,
    strict: bool,
) -> (String, String) {
    let system = if strict {
        format!(
            "You are a research decomposition expert. Your previous reply could not \
be parsed. Output ONLY a JSON array of 2 to {} sub-question strings, for example \
[\"first sub-question\", \"second sub-question\"]. No prose, no code fences, no \
objects. Never repeat the original question as a sub-question.",
            max_fanout
        )
    } else {
        format!(
            "You are a research decomposition expert. Split the research question into \
smaller, self-contained sub-questions. Each sub-question must:\n\
1. be specific enough to research independently\n\
2. together with its siblings cover the original question\n\
3. overlap minimally with the others\n\
4. be ordered logically, since the order becomes the report's section order\n\
Respond with a JSON array of 2 to {} sub-question strings. Output only the JSON array.",
            max_fanout
        )
    };

    let mut user = format!("Question to decompose: {}\n", question);
    if !ancestors.is_empty() {
        user.push_str("This question arose while researching:\n");
        for ancestor in ancestors {
            user.push_str(&format!("- {}\n", ancestor));
        }
    }
    user.push_str(&format!(
        "\nSplit this into at most {} sub-questions.",
        max_fanout
    ));

    (system, user)
}

/// Leaf solve: answer directly, grounded on retrieved snippets when any
pub fn leaf_solve(question: &str, snippets: &[Snippet]) -> (String, String) {
    let system = "You are a meticulous research assistant. Answer the question \
thoroughly and concretely: analyze its key aspects, use the provided sources \
where they are relevant, weigh differing views where they exist, and end with a \
clear conclusion. Do not invent citations."
        .to_string();

    let mut user = format!("Question: {}\n\n", question);
    if snippets.is_empty() {
        user.push_str("No sources are available; answer from your own knowledge.\n");
    } else {
        user.push_str("Sources:\n");
        for (i, snippet) in snippets.iter().enumerate() {
            user.push_str(&format!("[{}] ({}) {}\n", i + 1, snippet.source, snippet.text));
        }
    }
    user.push_str("\nProvide a detailed answer.");

    (system, user)
}

/// Aggregation of ordered (sub-question, answer-or-gap-note) pairs into
/// the parent's answer
pub fn aggregation(question: &str, pairs: &[(String, String)]) -> (String, String) {
    let system = "You are a research synthesis expert. Merge the sub-question \
findings into one coherent answer to the parent question. Keep the answer \
logically ordered, surface the key findings, and avoid repeating yourself. \
Where a finding is marked unavailable, acknowledge the gap honestly instead of \
inventing content."
        .to_string();

    let mut user = format!("Parent question: {}\n\nSub-question findings:\n", question);
    for (i, (sub_question, answer)) in pairs.iter().enumerate() {
        user.push_str(&format!("{}. Q: {}\n   A: {}\n", i + 1, sub_question, answer));
    }
    user.push_str("\nSynthesize a comprehensive answer to the parent question.");

    (system, user)
}
