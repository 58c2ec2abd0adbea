//! Named branches and the sessions that talk to them.
//!
//! A branch is one configured [`RagPipeline`]. The manager mints session ids,
//! routes questions to the right branch and makes sure a session never has
//! two turns in flight at once.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::errors::RagError;
use crate::graph::state::{Feedback, Turn};
use crate::history::SessionSummary;
use crate::pipeline::{AskResponse, RagPipeline};

struct Branch {
    label: String,
    pipeline: Arc<RagPipeline>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    pub name: String,
    pub label: String,
}

#[derive(Default)]
pub struct SessionManager {
    branches: BTreeMap<String, Branch>,
    turn_locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a branch under `name`.
    pub fn register_branch(
        &mut self,
        name: impl Into<String>,
        label: impl Into<String>,
        pipeline: Arc<RagPipeline>,
    ) {
        let name = name.into();
        if self.branches.contains_key(&name) {
            tracing::warn!("Replacing existing branch '{}'", name);
        }
        self.branches.insert(
            name,
            Branch {
                label: label.into(),
                pipeline,
            },
        );
    }

    pub fn branches(&self) -> Vec<BranchInfo> {
        self.branches
            .iter()
            .map(|(name, branch)| BranchInfo {
                name: name.clone(),
                label: branch.label.clone(),
            })
            .collect()
    }

    pub fn pipeline(&self, branch: &str) -> Result<&Arc<RagPipeline>, RagError> {
        self.branches
            .get(branch)
            .map(|b| &b.pipeline)
            .ok_or_else(|| RagError::UnknownBranch(branch.to_string()))
    }

    /// Mint a session id: `{uuid}-anon`, or `{uuid}-{user}` for a known user.
    pub fn new_session_id(&self, branch: &str, user: Option<&str>) -> Result<String, RagError> {
        self.pipeline(branch)?;
        let suffix = user
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or("anon");
        Ok(format!("{}-{}", Uuid::new_v4(), suffix))
    }

    /// Run one turn. Turns for the same session are queued behind each other.
    pub async fn ask(
        &self,
        branch: &str,
        session_id: &str,
        message: &str,
    ) -> Result<AskResponse, RagError> {
        let pipeline = self.pipeline(branch)?;
        let lock = self.turn_lock(branch, session_id).await;
        let result = {
            let _guard = lock.lock().await;
            tracing::info!("Branch {} session {}: new turn", branch, session_id);
            pipeline.ask(message, session_id).await
        };
        self.release_turn_lock(branch, session_id, lock).await;

        match &result {
            Ok(response) => tracing::info!(
                "Branch {} session {}: answered with topics [{}] ({} tokens, ${:.5}, {} ms)",
                branch,
                session_id,
                response.topics.join(", "),
                response.usage.total_tokens,
                response.usage.cost_usd,
                response.usage.latency_ms
            ),
            Err(err) if err.is_retryable() => {
                tracing::warn!("Branch {} session {}: {}", branch, session_id, err)
            }
            Err(err) => tracing::error!("Branch {} session {}: {}", branch, session_id, err),
        }
        result
    }

    /// Rate the assistant message at `message_index` of the session's history.
    pub async fn add_feedback(
        &self,
        branch: &str,
        session_id: &str,
        message_index: usize,
        feedback: Feedback,
    ) -> Result<(), RagError> {
        let pipeline = self.pipeline(branch)?;
        let lock = self.turn_lock(branch, session_id).await;
        let result = {
            let _guard = lock.lock().await;
            pipeline
                .checkpoints()
                .set_feedback(session_id, message_index, feedback)
                .await
        };
        self.release_turn_lock(branch, session_id, lock).await;

        result?;
        tracing::info!(
            "Branch {} session {}: message {} rated {}",
            branch,
            session_id,
            message_index,
            feedback.as_str()
        );
        Ok(())
    }

    pub async fn conversation_history(
        &self,
        branch: &str,
        session_id: &str,
    ) -> Result<Vec<Turn>, RagError> {
        self.pipeline(branch)?.history(session_id).await
    }

    pub async fn sessions(&self, branch: &str) -> Result<Vec<SessionSummary>, RagError> {
        self.pipeline(branch)?.checkpoints().list_sessions().await
    }

    async fn turn_lock(&self, branch: &str, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        locks
            .entry((branch.to_string(), session_id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the session's lock entry once no other turn holds or awaits it.
    async fn release_turn_lock(&self, branch: &str, session_id: &str, lock: Arc<Mutex<()>>) {
        let key = (branch.to_string(), session_id.to_string());
        let mut locks = self.turn_locks.lock().await;
        let idle = locks
            .get(&key)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            locks.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryCheckpointStore;
    use crate::rag::TopicRegistry;
    use crate::testing::{branch_settings, pipeline, FixedRetriever, MockLlm, Reply};

    fn manager(generator: Vec<Reply>) -> SessionManager {
        let llm = MockLlm::new(vec![Reply::text("karl g maeser")], generator);
        let registry = TopicRegistry::builder()
            .topic("karl g maeser", FixedRetriever::new(&["Maeser passage"]))
            .build()
            .unwrap();
        let pipeline = pipeline(
            registry,
            llm,
            branch_settings(),
            Arc::new(MemoryCheckpointStore::new()),
        );

        let mut manager = SessionManager::new();
        manager.register_branch("pipeline", "Pipeline", Arc::new(pipeline));
        manager
    }

    #[test]
    fn session_ids_carry_user_suffix() {
        let manager = manager(vec![Reply::text("ok")]);

        let anon = manager.new_session_id("pipeline", None).unwrap();
        assert!(anon.ends_with("-anon"));
        assert!(Uuid::parse_str(&anon[..36]).is_ok());

        let user = manager.new_session_id("pipeline", Some("byu.jdoe")).unwrap();
        assert!(user.ends_with("-byu.jdoe"));
        assert_ne!(anon, manager.new_session_id("pipeline", None).unwrap());

        assert!(matches!(
            manager.new_session_id("missing", None),
            Err(RagError::UnknownBranch(_))
        ));
    }

    #[test]
    fn branches_are_listed_with_labels() {
        let manager = manager(vec![Reply::text("ok")]);
        assert_eq!(
            manager.branches(),
            vec![BranchInfo {
                name: "pipeline".to_string(),
                label: "Pipeline".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn ask_routes_to_branch_and_records_history() {
        let manager = manager(vec![Reply::text("He taught.")]);
        let session = manager.new_session_id("pipeline", None).unwrap();

        let response = manager.ask("pipeline", &session, "Who was Maeser?").await.unwrap();
        assert_eq!(response.answer, "He taught.");

        let history = manager.conversation_history("pipeline", &session).await.unwrap();
        assert_eq!(history.len(), 2);

        assert!(matches!(
            manager.ask("other", &session, "hi").await,
            Err(RagError::UnknownBranch(_))
        ));

        let sessions = manager.sessions("pipeline").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, session);
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_session_are_serialized() {
        let manager = manager(vec![Reply::Slow("answer".to_string())]);

        let (first, second) = tokio::join!(
            manager.ask("pipeline", "s1", "first"),
            manager.ask("pipeline", "s1", "second"),
        );
        first.unwrap();
        second.unwrap();

        let history = manager.conversation_history("pipeline", "s1").await.unwrap();
        assert_eq!(history.len(), 4);
        let questions: Vec<&str> = history
            .iter()
            .step_by(2)
            .map(|turn| turn.content.as_str())
            .collect();
        assert_eq!(questions, vec!["first", "second"]);
        assert!(manager.turn_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn turn_locks_are_released_after_each_turn() {
        let manager = manager(vec![Reply::text("ok")]);
        for _ in 0..5 {
            let session = manager.new_session_id("pipeline", None).unwrap();
            manager.ask("pipeline", &session, "question").await.unwrap();
            manager
                .add_feedback("pipeline", &session, 1, Feedback::Like)
                .await
                .unwrap();
        }
        assert!(manager.ask("pipeline", "s1", "   ").await.is_err());
        assert!(manager.turn_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn feedback_is_attached_to_assistant_messages() {
        let manager = manager(vec![Reply::text("ok")]);
        manager.ask("pipeline", "s1", "question").await.unwrap();

        manager
            .add_feedback("pipeline", "s1", 1, Feedback::Like)
            .await
            .unwrap();
        let history = manager.conversation_history("pipeline", "s1").await.unwrap();
        assert_eq!(history[1].feedback, Some(Feedback::Like));

        assert!(matches!(
            manager.add_feedback("pipeline", "s1", 0, Feedback::Dislike).await,
            Err(RagError::BadRequest(_))
        ));
        assert!(matches!(
            manager.add_feedback("pipeline", "s1", 5, Feedback::Dislike).await,
            Err(RagError::NotFound(_))
        ));
    }
}
