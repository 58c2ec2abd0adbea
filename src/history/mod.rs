//! Session-keyed conversation memory.
//!
//! The pipeline checkpoints a [`ConversationState`] once per successful turn.
//! Turns are append-only: a save never rewrites or drops a stored turn, and
//! only the `feedback` field of an assistant turn may change afterwards.

mod memory;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::errors::RagError;
use crate::graph::state::{ConversationState, Feedback, Role, Turn};

pub use memory::MemoryCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub turn_count: usize,
    pub updated_at: DateTime<Utc>,
    /// First user message, truncated.
    pub preview: Option<String>,
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, RagError>;

    /// Persist the state atomically for its session.
    async fn save(&self, state: &ConversationState) -> Result<(), RagError>;

    /// Attach feedback to the assistant turn at `turn_index`.
    async fn set_feedback(
        &self,
        session_id: &str,
        turn_index: usize,
        feedback: Feedback,
    ) -> Result<(), RagError>;

    /// Most recently updated first.
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, RagError>;
}

const PREVIEW_CHARS: usize = 80;

fn preview(turns: &[Turn]) -> Option<String> {
    turns
        .iter()
        .find(|turn| turn.role == Role::User)
        .map(|turn| turn.content.chars().take(PREVIEW_CHARS).collect())
}

/// Reject a save that would drop turns already stored for the session.
fn check_append_only(session_id: &str, stored: usize, incoming: usize) -> Result<(), RagError> {
    if incoming < stored {
        return Err(RagError::Checkpoint(format!(
            "session {} has {} stored turns but the update carries {}",
            session_id, stored, incoming
        )));
    }
    Ok(())
}

fn check_feedback_target(
    session_id: &str,
    turn_index: usize,
    role: Option<Role>,
) -> Result<(), RagError> {
    match role {
        Some(Role::Assistant) => Ok(()),
        Some(Role::User) => Err(RagError::BadRequest(format!(
            "turn {} of session {} is a user message",
            turn_index, session_id
        ))),
        None => Err(RagError::NotFound(format!(
            "turn {} of session {}",
            turn_index, session_id
        ))),
    }
}
