use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::{check_append_only, check_feedback_target, CheckpointStore, SessionSummary, PREVIEW_CHARS};
use crate::core::errors::RagError;
use crate::graph::state::{ConversationState, Feedback, Role, Turn};

const SCHEMA_VERSION: i64 = 1;

/// Durable checkpoint store backed by one SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteCheckpointStore {
    db_path: PathBuf,
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    pub async fn open(db_path: impl Into<PathBuf>) -> Result<Self, RagError> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(RagError::checkpoint)?;
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(connect_options)
            .await
            .map_err(RagError::checkpoint)?;

        let store = Self { db_path, pool };
        store.init_db().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn init_db(&self) -> Result<(), RagError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::checkpoint)?;

        match version {
            SCHEMA_VERSION => Ok(()),
            0 => self.create_schema().await,
            other => Err(RagError::Checkpoint(format!(
                "{} has schema version {}, expected {}",
                self.db_path.display(),
                other,
                SCHEMA_VERSION
            ))),
        }
    }

    async fn create_schema(&self) -> Result<(), RagError> {
        let mut tx = self.pool.begin().await.map_err(RagError::checkpoint)?;

        sqlx::query(
            "\
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                current_topics TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&mut *tx)
        .await
        .map_err(RagError::checkpoint)?;

        sqlx::query(
            "\
            CREATE TABLE IF NOT EXISTS turns (
                session_id TEXT NOT NULL,
                turn_index INTEGER NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                sources TEXT NOT NULL DEFAULT '[]',
                usage TEXT,
                feedback TEXT CHECK(feedback IS NULL OR feedback IN ('like', 'dislike')),
                created_at TEXT NOT NULL,
                PRIMARY KEY (session_id, turn_index),
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(&mut *tx)
        .await
        .map_err(RagError::checkpoint)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at DESC)")
            .execute(&mut *tx)
            .await
            .map_err(RagError::checkpoint)?;

        sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
            .execute(&mut *tx)
            .await
            .map_err(RagError::checkpoint)?;

        tx.commit().await.map_err(RagError::checkpoint)?;
        Ok(())
    }

    fn turn_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, RagError> {
        let role: String = row.try_get("role").map_err(RagError::checkpoint)?;
        let role = Role::from_str(&role)
            .ok_or_else(|| RagError::Checkpoint(format!("unknown role '{}'", role)))?;

        let sources: String = row.try_get("sources").map_err(RagError::checkpoint)?;
        let usage: Option<String> = row.try_get("usage").map_err(RagError::checkpoint)?;
        let feedback: Option<String> = row.try_get("feedback").map_err(RagError::checkpoint)?;
        let created_at: String = row.try_get("created_at").map_err(RagError::checkpoint)?;

        Ok(Turn {
            role,
            content: row.try_get("content").map_err(RagError::checkpoint)?,
            sources: serde_json::from_str(&sources).map_err(RagError::checkpoint)?,
            usage: usage
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .map_err(RagError::checkpoint)?,
            feedback: feedback.as_deref().and_then(Feedback::from_str),
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RagError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RagError::Checkpoint(format!("bad timestamp '{}': {}", raw, e)))
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, RagError> {
        let session = sqlx::query("SELECT current_topics FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::checkpoint)?;

        let Some(session) = session else {
            return Ok(None);
        };
        let topics: String = session.try_get("current_topics").map_err(RagError::checkpoint)?;

        let rows = sqlx::query(
            "SELECT role, content, sources, usage, feedback, created_at \
             FROM turns WHERE session_id = ? ORDER BY turn_index ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::checkpoint)?;

        let turns = rows
            .iter()
            .map(Self::turn_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ConversationState {
            session_id: session_id.to_string(),
            turns,
            current_topics: serde_json::from_str(&topics).map_err(RagError::checkpoint)?,
        }))
    }

    async fn save(&self, state: &ConversationState) -> Result<(), RagError> {
        let now = Utc::now().to_rfc3339();
        let topics = serde_json::to_string(&state.current_topics).map_err(RagError::checkpoint)?;

        let mut tx = self.pool.begin().await.map_err(RagError::checkpoint)?;

        sqlx::query(
            "INSERT INTO sessions (id, current_topics, created_at, updated_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET current_topics = excluded.current_topics, \
             updated_at = excluded.updated_at",
        )
        .bind(&state.session_id)
        .bind(&topics)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(RagError::checkpoint)?;

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM turns WHERE session_id = ?")
            .bind(&state.session_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(RagError::checkpoint)?;
        let stored = stored as usize;
        check_append_only(&state.session_id, stored, state.turns.len())?;

        for (index, turn) in state.turns.iter().enumerate().skip(stored) {
            let sources = serde_json::to_string(&turn.sources).map_err(RagError::checkpoint)?;
            let usage = turn
                .usage
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(RagError::checkpoint)?;

            sqlx::query(
                "INSERT INTO turns (session_id, turn_index, role, content, sources, usage, feedback, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&state.session_id)
            .bind(index as i64)
            .bind(turn.role.as_str())
            .bind(&turn.content)
            .bind(sources)
            .bind(usage)
            .bind(turn.feedback.map(|f| f.as_str()))
            .bind(turn.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(RagError::checkpoint)?;
        }

        tx.commit().await.map_err(RagError::checkpoint)?;
        Ok(())
    }

    async fn set_feedback(
        &self,
        session_id: &str,
        turn_index: usize,
        feedback: Feedback,
    ) -> Result<(), RagError> {
        let role: Option<String> =
            sqlx::query_scalar("SELECT role FROM turns WHERE session_id = ? AND turn_index = ?")
                .bind(session_id)
                .bind(turn_index as i64)
                .fetch_optional(&self.pool)
                .await
                .map_err(RagError::checkpoint)?;
        check_feedback_target(session_id, turn_index, role.as_deref().and_then(Role::from_str))?;

        sqlx::query("UPDATE turns SET feedback = ? WHERE session_id = ? AND turn_index = ?")
            .bind(feedback.as_str())
            .bind(session_id)
            .bind(turn_index as i64)
            .execute(&self.pool)
            .await
            .map_err(RagError::checkpoint)?;
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, RagError> {
        let rows = sqlx::query(
            "SELECT s.id, s.updated_at, \
             (SELECT COUNT(*) FROM turns t WHERE t.session_id = s.id) AS turn_count, \
             (SELECT t.content FROM turns t WHERE t.session_id = s.id AND t.role = 'user' \
              ORDER BY t.turn_index ASC LIMIT 1) AS first_message \
             FROM sessions s ORDER BY s.updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::checkpoint)?;

        rows.iter()
            .map(|row| {
                let updated_at: String = row.try_get("updated_at").map_err(RagError::checkpoint)?;
                let turn_count: i64 = row.try_get("turn_count").map_err(RagError::checkpoint)?;
                let first_message: Option<String> =
                    row.try_get("first_message").map_err(RagError::checkpoint)?;
                Ok(SessionSummary {
                    session_id: row.try_get("id").map_err(RagError::checkpoint)?,
                    turn_count: turn_count as usize,
                    updated_at: parse_timestamp(&updated_at)?,
                    preview: first_message.map(|m| m.chars().take(PREVIEW_CHARS).collect()),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::state::{SourceRef, UsageMetrics};

    async fn open_store(dir: &Path) -> SqliteCheckpointStore {
        SqliteCheckpointStore::open(dir.join("pipeline_memory.db"))
            .await
            .unwrap()
    }

    fn exchange(state: &mut ConversationState, question: &str, answer: &str) {
        state.turns.push(Turn::user(question));
        state.turns.push(Turn::assistant(
            answer,
            vec![SourceRef {
                topic: "karl g maeser".to_string(),
                source: Some("maeser.txt".to_string()),
                snippet: "Karl G. Maeser was born in 1828".to_string(),
            }],
            UsageMetrics {
                prompt_tokens: 120,
                completion_tokens: 30,
                total_tokens: 150,
                cost_usd: 0.0002,
                latency_ms: 850,
            },
        ));
    }

    #[tokio::test]
    async fn checkpoint_round_trip_preserves_prior_turns() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;
        assert!(store.load("s1").await.unwrap().is_none());

        let mut state = ConversationState::new("s1");
        state.current_topics = vec!["karl g maeser".to_string()];
        exchange(&mut state, "Who was Maeser?", "A teacher.");
        store.save(&state).await.unwrap();

        let mut reloaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(reloaded, state);

        exchange(&mut reloaded, "Where was he born?", "Meissen.");
        store.save(&reloaded).await.unwrap();

        let after = store.load("s1").await.unwrap().unwrap();
        assert_eq!(after.turns.len(), 4);
        assert_eq!(&after.turns[..2], &state.turns[..]);
        assert_eq!(after.turns[3].content, "Meissen.");
    }

    #[tokio::test]
    async fn reopening_keeps_data() {
        let tmp = tempfile::tempdir().unwrap();
        let mut state = ConversationState::new("s1");
        exchange(&mut state, "q", "a");
        {
            let store = open_store(tmp.path()).await;
            store.save(&state).await.unwrap();
        }

        let store = open_store(tmp.path()).await;
        assert_eq!(store.load("s1").await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn save_refuses_to_drop_turns() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;
        let mut state = ConversationState::new("s1");
        exchange(&mut state, "q", "a");
        store.save(&state).await.unwrap();

        state.turns.truncate(1);
        assert!(matches!(store.save(&state).await, Err(RagError::Checkpoint(_))));
        assert_eq!(store.load("s1").await.unwrap().unwrap().turns.len(), 2);
    }

    #[tokio::test]
    async fn feedback_and_session_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = open_store(tmp.path()).await;

        let mut first = ConversationState::new("s1");
        exchange(&mut first, "First question", "a");
        store.save(&first).await.unwrap();

        let mut second = ConversationState::new("s2");
        exchange(&mut second, "Second question", "b");
        exchange(&mut second, "Follow-up", "c");
        store.save(&second).await.unwrap();

        store.set_feedback("s2", 3, Feedback::Dislike).await.unwrap();
        assert!(matches!(
            store.set_feedback("s2", 2, Feedback::Like).await,
            Err(RagError::BadRequest(_))
        ));
        assert!(matches!(
            store.set_feedback("s9", 1, Feedback::Like).await,
            Err(RagError::NotFound(_))
        ));

        let loaded = store.load("s2").await.unwrap().unwrap();
        assert_eq!(loaded.turns[3].feedback, Some(Feedback::Dislike));
        assert_eq!(loaded.turns[1].feedback, None);

        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 2);
        let s2 = sessions.iter().find(|s| s.session_id == "s2").unwrap();
        assert_eq!(s2.turn_count, 4);
        assert_eq!(s2.preview.as_deref(), Some("Second question"));
    }
}
