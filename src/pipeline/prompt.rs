//! Message assembly for answer generation.

use crate::core::config::validation::CONTEXT_PLACEHOLDER;
use crate::graph::state::Turn;
use crate::llm::ChatMessage;

pub const SUMMARY_PREFIX: &str = "Summary of the recent conversation:\n";

/// Substitute the rendered context into the system prompt template.
pub fn render_system_prompt(template: &str, context: &str) -> String {
    template.replace(CONTEXT_PLACEHOLDER, context)
}

/// The last `window` turns of history; `0` keeps everything.
pub fn history_window(history: &[Turn], window: usize) -> &[Turn] {
    if window == 0 || history.len() <= window {
        history
    } else {
        &history[history.len() - window..]
    }
}

/// System prompt, windowed history, the optional conversation summary, then
/// the latest user message.
pub fn build_messages(
    template: &str,
    context: &str,
    history: &[Turn],
    window: usize,
    summary: Option<&str>,
    latest: &str,
) -> Vec<ChatMessage> {
    let history = history_window(history, window);
    let mut messages = Vec::with_capacity(history.len() + 3);
    messages.push(ChatMessage::system(render_system_prompt(template, context)));
    messages.extend(history.iter().map(Turn::to_chat_message));
    if let Some(summary) = summary {
        messages.push(ChatMessage::system(format!("{}{}", SUMMARY_PREFIX, summary)));
    }
    messages.push(ChatMessage::user(latest));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::state::UsageMetrics;

    fn conversation(exchanges: usize) -> Vec<Turn> {
        (0..exchanges)
            .flat_map(|i| {
                [
                    Turn::user(format!("q{}", i)),
                    Turn::assistant(format!("a{}", i), Vec::new(), UsageMetrics::default()),
                ]
            })
            .collect()
    }

    #[test]
    fn renders_context_into_template() {
        let rendered = render_system_prompt("Answer from:\n\n{context}\n", "passage one\n\npassage two");
        assert_eq!(rendered, "Answer from:\n\npassage one\n\npassage two\n");
        assert_eq!(render_system_prompt("Context: {context}", ""), "Context: ");
    }

    #[test]
    fn window_keeps_most_recent_turns() {
        let history = conversation(8);
        let windowed = history_window(&history, 10);
        assert_eq!(windowed.len(), 10);
        assert_eq!(windowed[0].content, "q3");
        assert_eq!(history_window(&history, 0).len(), 16);
        assert_eq!(history_window(&history[..4], 10).len(), 4);
    }

    #[test]
    fn messages_are_system_history_then_latest() {
        let history = conversation(2);
        let messages = build_messages("ctx: {context}", "docs", &history, 10, None, "next?");
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user", "assistant", "user"]);
        assert_eq!(messages[0].content, "ctx: docs");
        assert_eq!(messages[5].content, "next?");
    }

    #[test]
    fn summary_sits_between_history_and_latest() {
        let history = conversation(1);
        let messages = build_messages("{context}", "", &history, 10, Some("talked about Maeser"), "more?");
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "system", "user"]);
        assert_eq!(messages[3].content, "Summary of the recent conversation:\ntalked about Maeser");
    }
}
