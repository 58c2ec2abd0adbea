//! Topic classification: ask the model which registered topics a message needs.
//!
//! Whatever the model replies, only registered topic names leave this module,
//! at most [`MAX_TOPICS`] of them, never the `none` sentinel.

use crate::core::config::ClassifierStrategy;
use crate::core::errors::RagError;
use crate::graph::state::Turn;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider, TokenUsage};
use crate::rag::{normalize_topic, TopicRegistry};

pub const MAX_TOPICS: usize = 3;

const NONE_SENTINEL: &str = "none";
/// Prior turns shown to the classifier.
const CONTEXT_TURNS: usize = 4;
const MAX_CLASSIFIER_TOKENS: i32 = 50;

/// Outcome of one classification call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub topics: Vec<String>,
    pub usage: TokenUsage,
}

pub async fn classify(
    llm: &dyn LlmProvider,
    registry: &TopicRegistry,
    strategy: ClassifierStrategy,
    history: &[Turn],
    message: &str,
    current_topics: &[String],
) -> Result<Classification, RagError> {
    if registry.is_empty() {
        return Ok(Classification::default());
    }

    let messages = match strategy {
        ClassifierStrategy::Multi => multi_topic_prompt(registry, history, message),
        ClassifierStrategy::Sticky => sticky_topic_prompt(registry, history, message, current_topics),
        ClassifierStrategy::Single => {
            return Ok(Classification {
                topics: registry.names().take(MAX_TOPICS).map(str::to_string).collect(),
                usage: TokenUsage::default(),
            })
        }
    };
    let request = ChatRequest::new(messages)
        .deterministic()
        .with_max_tokens(MAX_CLASSIFIER_TOKENS);

    let completion = match llm.chat(request).await {
        Ok(completion) => completion,
        Err(err @ RagError::RateLimited(_)) => return Err(err),
        Err(err) => {
            tracing::warn!("Topic classification failed, answering without retrieval: {}", err);
            return Ok(Classification::default());
        }
    };

    let mut topics = parse_topics(&completion.content, registry);
    if strategy == ClassifierStrategy::Sticky {
        topics.truncate(1);
        if topics.is_empty() {
            if let Some(hint) = current_topics.iter().find(|t| registry.contains(t)) {
                tracing::debug!("Classifier gave no topic, keeping current topic '{}'", hint);
                topics.push(hint.clone());
            }
        }
    }

    tracing::info!(
        "Classified topics: [{}] (reply: {:?})",
        topics.join(", "),
        completion.content.trim()
    );

    Ok(Classification {
        topics,
        usage: completion.usage,
    })
}

/// Parse a comma-separated reply into registered topic names.
///
/// Labels are normalized and lightly cleaned (surrounding quotes, trailing
/// punctuation). Unknown labels, `none` and repeats are dropped; the first
/// [`MAX_TOPICS`] survivors are kept in reply order.
pub fn parse_topics(reply: &str, registry: &TopicRegistry) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();

    for raw in reply.split([',', '\n']) {
        let label = clean_label(raw);
        if label.is_empty() || label == NONE_SENTINEL {
            continue;
        }
        let Some(name) = registry.resolve(&label) else {
            tracing::debug!("Dropping unregistered topic label '{}'", label);
            continue;
        };
        if !topics.iter().any(|t| t == name) {
            topics.push(name.to_string());
        }
        if topics.len() == MAX_TOPICS {
            break;
        }
    }

    topics
}

fn clean_label(raw: &str) -> String {
    let mut label = raw
        .trim()
        .trim_start_matches(|c: char| c == '-' || c == '*' || c.is_whitespace());
    // Quotes and punctuation can nest in either order, e.g. `campus."`.
    loop {
        let stripped = label
            .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ';' | ':'))
            .trim_matches(|c: char| matches!(c, '\'' | '"' | '`' | '“' | '”' | '‘' | '’'))
            .trim();
        if stripped == label {
            break;
        }
        label = stripped;
    }
    normalize_topic(label)
}

fn recent_history(history: &[Turn]) -> String {
    let start = history.len().saturating_sub(CONTEXT_TURNS);
    history[start..]
        .iter()
        .map(|turn| format!("{}: {}", turn.role.as_str(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn multi_topic_prompt(registry: &TopicRegistry, history: &[Turn], message: &str) -> Vec<ChatMessage> {
    let system = format!(
        "You identify which knowledge sources are needed to answer a user's question. \
         Choose 1 to 3 topics from this list: {}. \
         Reply with only the topic names, separated by commas. \
         If none of the topics applies, reply with 'none'.",
        registry.format_for_prompt()
    );

    let mut user = String::new();
    let recent = recent_history(history);
    if !recent.is_empty() {
        user.push_str("Conversation so far:\n");
        user.push_str(&recent);
        user.push_str("\n\n");
    }
    user.push_str("Question: ");
    user.push_str(message);

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

fn sticky_topic_prompt(
    registry: &TopicRegistry,
    history: &[Turn],
    message: &str,
    current_topics: &[String],
) -> Vec<ChatMessage> {
    let system = format!(
        "You label a user's message with exactly one topic from this list: {}. \
         Keep the current topic unless the message clearly moves to another one. \
         Reply with only the topic name, or 'none' if no topic applies.",
        registry.format_for_prompt()
    );

    let current = current_topics
        .first()
        .map(String::as_str)
        .unwrap_or(NONE_SENTINEL);

    let mut user = String::new();
    let recent = recent_history(history);
    if !recent.is_empty() {
        user.push_str("Conversation so far:\n");
        user.push_str(&recent);
        user.push_str("\n\n");
    }
    user.push_str(&format!(
        "User message: {}\nCurrent topic: {}\nTopic:",
        message, current
    ));

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}
