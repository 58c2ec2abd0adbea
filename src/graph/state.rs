// Graph State
// Conversation records and the working state of one in-flight turn

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, TokenUsage};
use crate::rag::RetrievedDocument;

const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// User rating attached to an assistant turn after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Like,
    Dislike,
}

impl Feedback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feedback::Like => "like",
            Feedback::Dislike => "dislike",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "like" | "up" | "+1" => Some(Feedback::Like),
            "dislike" | "down" | "-1" => Some(Feedback::Dislike),
            _ => None,
        }
    }
}

/// Reference to a passage that fed an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub snippet: String,
}

impl SourceRef {
    pub fn from_document(doc: &RetrievedDocument) -> Self {
        Self {
            topic: doc.topic.clone(),
            source: doc.source().map(str::to_string),
            snippet: doc.content.chars().take(SNIPPET_CHARS).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

impl UsageMetrics {
    /// Fold one call's token counts and cost into the running total.
    pub fn record(&mut self, usage: &TokenUsage, cost_usd: f64) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total_tokens;
        self.cost_usd += cost_usd;
    }
}

/// One message in a conversation. Append-only apart from `feedback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: Vec::new(),
            usage: None,
            feedback: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<SourceRef>, usage: UsageMetrics) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources,
            usage: Some(usage),
            feedback: None,
            created_at: Utc::now(),
        }
    }

    pub fn to_chat_message(&self) -> ChatMessage {
        match self.role {
            Role::User => ChatMessage::user(self.content.clone()),
            Role::Assistant => ChatMessage::assistant(self.content.clone()),
        }
    }
}

/// Durable, session-keyed memory of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: String,
    #[serde(default)]
    pub turns: Vec<Turn>,
    /// Topics resolved on the last turn that had any; the sticky hint.
    #[serde(default)]
    pub current_topics: Vec<String>,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            turns: Vec::new(),
            current_topics: Vec::new(),
        }
    }
}

/// Working state for one turn. Built fresh per turn and never persisted.
#[derive(Debug, Clone)]
pub struct TurnState {
    pub session_id: String,
    pub input: String,
    /// Prior turns, excluding the in-progress user message.
    pub history: Vec<Turn>,
    /// Topics from the previous turn, offered to the classifier as a hint.
    pub current_topics: Vec<String>,
    /// Classified topics for this turn, in classifier order.
    pub topics: Vec<String>,
    /// Next entry of `topics` for the dispatcher.
    pub retrieval_index: usize,
    pub retrieved_context: Vec<RetrievedDocument>,
    /// Summary of the latest messages, when the branch asks for one.
    pub history_summary: Option<String>,
    pub output: Option<String>,
    pub usage: UsageMetrics,
    pub started_at: Instant,
}

impl TurnState {
    pub fn new(input: impl Into<String>, conversation: &ConversationState) -> Self {
        Self {
            session_id: conversation.session_id.clone(),
            input: input.into(),
            history: conversation.turns.clone(),
            current_topics: conversation.current_topics.clone(),
            topics: Vec::new(),
            retrieval_index: 0,
            retrieved_context: Vec::new(),
            history_summary: None,
            output: None,
            usage: UsageMetrics::default(),
            started_at: Instant::now(),
        }
    }

    /// The topic the dispatcher should query next, if any remain.
    pub fn next_topic(&self) -> Option<&str> {
        self.topics.get(self.retrieval_index).map(String::as_str)
    }

    pub fn sources(&self) -> Vec<SourceRef> {
        self.retrieved_context
            .iter()
            .map(SourceRef::from_document)
            .collect()
    }
}
