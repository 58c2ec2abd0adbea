use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{check_append_only, check_feedback_target, preview, CheckpointStore, SessionSummary};
use crate::core::errors::RagError;
use crate::graph::state::{ConversationState, Feedback};

/// In-process checkpoint store. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    sessions: RwLock<HashMap<String, (ConversationState, DateTime<Utc>)>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, RagError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).map(|(state, _)| state.clone()))
    }

    async fn save(&self, state: &ConversationState) -> Result<(), RagError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get(&state.session_id)
            .map(|(existing, _)| existing.turns.len())
            .unwrap_or(0);
        check_append_only(&state.session_id, stored, state.turns.len())?;
        sessions.insert(state.session_id.clone(), (state.clone(), Utc::now()));
        Ok(())
    }

    async fn set_feedback(
        &self,
        session_id: &str,
        turn_index: usize,
        feedback: Feedback,
    ) -> Result<(), RagError> {
        let mut sessions = self.sessions.write().await;
        let turn = sessions
            .get_mut(session_id)
            .and_then(|(state, _)| state.turns.get_mut(turn_index));
        check_feedback_target(session_id, turn_index, turn.as_ref().map(|t| t.role))?;
        if let Some(turn) = turn {
            turn.feedback = Some(feedback);
        }
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, RagError> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .map(|(state, updated_at)| SessionSummary {
                session_id: state.session_id.clone(),
                turn_count: state.turns.len(),
                updated_at: *updated_at,
                preview: preview(&state.turns),
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::state::{Turn, UsageMetrics};

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let store = MemoryCheckpointStore::new();
        assert!(store.load("s1").await.unwrap().is_none());

        let mut state = ConversationState::new("s1");
        state.turns.push(Turn::user("hello"));
        state.turns.push(Turn::assistant("hi", Vec::new(), UsageMetrics::default()));
        store.save(&state).await.unwrap();

        assert_eq!(store.load("s1").await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn save_refuses_to_drop_turns() {
        let store = MemoryCheckpointStore::new();
        let mut state = ConversationState::new("s1");
        state.turns.push(Turn::user("hello"));
        store.save(&state).await.unwrap();

        let err = store.save(&ConversationState::new("s1")).await.unwrap_err();
        assert!(matches!(err, RagError::Checkpoint(_)));
    }

    #[tokio::test]
    async fn feedback_targets_assistant_turns_only() {
        let store = MemoryCheckpointStore::new();
        let mut state = ConversationState::new("s1");
        state.turns.push(Turn::user("hello"));
        state.turns.push(Turn::assistant("hi", Vec::new(), UsageMetrics::default()));
        store.save(&state).await.unwrap();

        store.set_feedback("s1", 1, Feedback::Like).await.unwrap();
        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.turns[1].feedback, Some(Feedback::Like));

        assert!(matches!(
            store.set_feedback("s1", 0, Feedback::Like).await,
            Err(RagError::BadRequest(_))
        ));
        assert!(matches!(
            store.set_feedback("s1", 7, Feedback::Like).await,
            Err(RagError::NotFound(_))
        ));
        assert!(matches!(
            store.set_feedback("missing", 1, Feedback::Like).await,
            Err(RagError::NotFound(_))
        ));
    }
}
