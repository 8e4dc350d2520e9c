use std::collections::HashSet;

use crate::core::types::{ContextMetadata, ConversationMessage, RetrievalResult};

const MAX_CONTEXT_LENGTH: usize = 4000;
const MAX_HISTORY_LENGTH: usize = 10;
const SUMMARY_MIN_HISTORY: usize = 6;
const SUMMARY_MIN_USER_MESSAGES: usize = 3;
const RECENT_HISTORY_SHOWN: usize = 3;
const RECENT_MESSAGE_TRUNCATE: usize = 200;
const MAX_PRIORITIZED_CHUNKS: usize = 5;

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase().split_whitespace().map(|s| s.to_string()).collect()
}

/// Keeps only user messages (within the last `MAX_HISTORY_LENGTH`) whose
/// keyword set overlaps the current question, matching
/// `context_manager.py::_filter_relevant_history`.
fn filter_relevant_history<'a>(
    question: &str,
    history: &'a [ConversationMessage],
) -> Vec<&'a ConversationMessage> {
    if history.is_empty() {
        return Vec::new();
    }
    let current_keywords = tokenize(question);
    let window_start = history.len().saturating_sub(MAX_HISTORY_LENGTH);
    history[window_start..]
        .iter()
        .filter(|m| m.role == "user")
        .filter(|m| {
            let overlap = current_keywords
                .intersection(&tokenize(&m.content))
                .count();
            overlap > 0
        })
        .collect()
}

/// Builds a short summary from the first-five-words of the last five user
/// messages, only once the conversation is long enough, matching
/// `context_manager.py::_create_conversation_summary`.
fn create_conversation_summary(history: &[ConversationMessage]) -> Option<String> {
    if history.len() < SUMMARY_MIN_HISTORY {
        return None;
    }
    let user_messages: Vec<&ConversationMessage> =
        history.iter().filter(|m| m.role == "user").collect();
    if user_messages.len() < SUMMARY_MIN_USER_MESSAGES {
        return None;
    }

    let topics: Vec<String> = user_messages
        .iter()
        .rev()
        .take(5)
        .rev()
        .filter_map(|m| {
            let words: Vec<&str> = m.content.split_whitespace().take(5).collect();
            (!words.is_empty()).then(|| words.join(" "))
        })
        .collect();

    if topics.is_empty() {
        None
    } else {
        Some(format!("Previous topics discussed: {}", topics.join("; ")))
    }
}

/// Scores chunks by keyword overlap with the question and keeps the
/// top `min(5, len)`, matching `context_manager.py::_prioritize_chunks`.
fn prioritize_chunks(question: &str, chunks: &[RetrievalResult]) -> Vec<&RetrievalResult> {
    if chunks.is_empty() {
        return Vec::new();
    }
    let question_keywords = tokenize(question);
    let mut scored: Vec<(&RetrievalResult, usize)> = chunks
        .iter()
        .map(|c| {
            let overlap = question_keywords.intersection(&tokenize(&c.content)).count();
            (c, overlap)
        })
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    let max_chunks = MAX_PRIORITIZED_CHUNKS.min(scored.len());
    scored.into_iter().take(max_chunks).map(|(c, _)| c).collect()
}

pub struct AssembledContext {
    pub context: String,
    pub metadata: ContextMetadata,
}

/// Builds the three-zone prompt context (optional summary, optional recent
/// history, document chunks) with a hard 4000-char cap, matching
/// `context_manager.py::create_context_window` exactly.
pub fn assemble(
    question: &str,
    history: &[ConversationMessage],
    retrieved_chunks: &[RetrievalResult],
) -> AssembledContext {
    let relevant_history = filter_relevant_history(question, history);
    let summary = create_conversation_summary(history);
    let prioritized = prioritize_chunks(question, retrieved_chunks);

    let mut metadata = ContextMetadata {
        total_chunks: retrieved_chunks.len(),
        used_chunks: prioritized.len(),
        history_messages: relevant_history.len(),
        has_summary: summary.is_some(),
        context_length: 0,
        truncated: false,
    };

    let mut parts: Vec<String> = Vec::new();

    if let Some(ref s) = summary {
        parts.push(format!("Conversation Summary: {s}\n"));
    }

    if !relevant_history.is_empty() {
        parts.push("Recent Conversation Context:".to_string());
        for msg in relevant_history.iter().rev().take(RECENT_HISTORY_SHOWN).rev() {
            let role = if msg.role == "user" { "User" } else { "Assistant" };
            let content: String = msg.content.chars().take(RECENT_MESSAGE_TRUNCATE).collect();
            parts.push(format!("{role}: {content}"));
        }
        parts.push(String::new());
    }

    parts.push("Document Context:".to_string());
    for chunk in &prioritized {
        parts.push(format!("[{}]\n{}\n", chunk.source.attribution, chunk.content));
    }

    let mut context_string = parts.join("\n");
    metadata.context_length = context_string.len();

    if context_string.len() > MAX_CONTEXT_LENGTH {
        context_string = context_string.chars().take(MAX_CONTEXT_LENGTH).collect::<String>() + "...";
        metadata.truncated = true;
    }

    AssembledContext {
        context: context_string,
        metadata,
    }
}

/// Fallback used when assembly itself errors out (should not normally
/// happen in safe Rust, but mirrors the original's try/except fallback
/// path for robustness against malformed inputs).
pub fn simple_context(chunks: &[RetrievalResult]) -> String {
    if chunks.is_empty() {
        return String::new();
    }
    let mut parts = vec!["Document Context:".to_string()];
    for chunk in chunks.iter().take(3) {
        parts.push(format!("[{}]\n{}\n", chunk.source.attribution, chunk.content));
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SourceAttribution;

    fn msg(role: &str, content: &str) -> ConversationMessage {
        ConversationMessage {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: chrono::Utc::now(),
            sources: vec![],
        }
    }

    fn chunk(content: &str) -> RetrievalResult {
        RetrievalResult {
            content: content.to_string(),
            source: SourceAttribution {
                filename: "doc.txt".to_string(),
                attribution: "doc.txt".to_string(),
                page_refs: vec![],
            },
            domain: "general".to_string(),
            similarity: 0.9,
            hybrid_score: 0.9,
        }
    }

    #[test]
    fn no_summary_under_six_messages() {
        let history = vec![msg("user", "hi"), msg("assistant", "hello")];
        assert_eq!(create_conversation_summary(&history), None);
    }

    #[test]
    fn summary_created_at_six_messages_with_three_user_turns() {
        let history = vec![
            msg("user", "one two three four five"),
            msg("assistant", "ok"),
            msg("user", "six seven eight"),
            msg("assistant", "ok"),
            msg("user", "nine ten"),
            msg("assistant", "ok"),
        ];
        assert!(create_conversation_summary(&history).is_some());
    }

    #[test]
    fn truncates_past_max_context_length() {
        let huge_chunk = chunk(&"x".repeat(5000));
        let assembled = assemble("question", &[], &[huge_chunk]);
        assert!(assembled.metadata.truncated);
        assert!(assembled.context.len() <= MAX_CONTEXT_LENGTH + 3);
    }
}
