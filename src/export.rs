//! History → Markdown serialization.
//!
//! Deterministic: exporting the same history twice yields byte-identical
//! output.

use std::fmt::Write;

use crate::session::HistoryEntry;

/// Fixed download filename for an exported session history.
pub const HISTORY_FILENAME: &str = "MyNYSC-prom-session-history.md";

/// Render the full history, one section per answered question, entries
/// separated by a horizontal rule.
pub fn history_markdown(history: &[HistoryEntry]) -> String {
    history
        .iter()
        .enumerate()
        .map(|(index, entry)| entry_markdown(index, entry))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn entry_markdown(index: usize, entry: &HistoryEntry) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "# Question {number}\n\n\
         > {question}\n\n\
         ## Your Answer\n\n\
         {answer}\n\n\
         ## Feedback\n\n\
         - **Score:** {confidence}%\n\
         - **Assessment:** {assessment}\n\n\
         ### Comparison Analysis\n\n\
         {comparison}\n\n\
         ### Suggested Answer #1\n\n\
         {suggestion1}\n\n\
         ### Suggested Answer #2\n\n\
         {suggestion2}",
        number = index + 1,
        question = entry.question,
        answer = blockquote(&entry.answer),
        confidence = entry.feedback.confidence,
        assessment = entry.feedback.assessment,
        comparison = entry.feedback.comparison,
        suggestion1 = entry.feedback.suggestion1,
        suggestion2 = entry.feedback.suggestion2,
    );

    if !entry.feedback.sources.is_empty() {
        out.push_str("\n\n### Sources\n");
        for source in &entry.feedback.sources {
            let _ = write!(out, "\n- [{}]({})", source.title, source.uri);
        }
    }
    out
}

fn blockquote(text: &str) -> String {
    text.lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
