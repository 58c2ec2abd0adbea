//! Condensed view of the most recent exchange, handed to the generator.

use crate::core::errors::RagError;
use crate::graph::state::Turn;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider, TokenUsage};

/// Messages summarized, counting the in-progress question.
pub const SUMMARY_MESSAGES: usize = 3;
pub const MAX_SUMMARY_TOKENS: i32 = 200;

const SUMMARY_INSTRUCTION: &str =
    "Summarize useful and relevant information from this chat history, discarding off-topic parts.";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub text: Option<String>,
    pub usage: TokenUsage,
}

/// Summarize the last [`SUMMARY_MESSAGES`] messages of the conversation.
///
/// Short conversations are not summarized. A rate limit fails the turn; any
/// other failure leaves the turn without a summary.
pub async fn summarize(
    llm: &dyn LlmProvider,
    history: &[Turn],
    latest: &str,
) -> Result<Summary, RagError> {
    if history.len() + 1 < SUMMARY_MESSAGES {
        return Ok(Summary::default());
    }

    let start = history.len() + 1 - SUMMARY_MESSAGES;
    let mut recent: Vec<String> = history[start..]
        .iter()
        .map(|turn| format!("{}: {}", turn.role.as_str(), turn.content))
        .collect();
    recent.push(format!("user: {}", latest));

    let request = ChatRequest::new(vec![
        ChatMessage::system(SUMMARY_INSTRUCTION),
        ChatMessage::user(format!(
            "Messages:\n{}\n\nOutput a concise useful summary.",
            recent.join("\n")
        )),
    ])
    .deterministic()
    .with_max_tokens(MAX_SUMMARY_TOKENS);

    match llm.chat(request).await {
        Ok(completion) => {
            let text = completion.content.trim();
            Ok(Summary {
                text: (!text.is_empty()).then(|| text.to_string()),
                usage: completion.usage,
            })
        }
        Err(err @ RagError::RateLimited(_)) => Err(err),
        Err(err) => {
            tracing::warn!("History summary failed, generating without it: {}", err);
            Ok(Summary::default())
        }
    }
}
