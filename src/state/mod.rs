use std::path::Path;
use std::sync::Arc;

use crate::core::config::{AppPaths, ConfigService, MaeserConfig};
use crate::core::errors::RagError;
use crate::history::{CheckpointStore, SqliteCheckpointStore};
use crate::llm::{LlmProvider, OpenAiProvider};
use crate::pipeline::RagPipeline;
use crate::rag::{normalize_topic, SqliteVectorStore, TextChunker};
use crate::session::SessionManager;

pub mod error;

use error::InitializationError;

/// Application state shared by every front-end.
///
/// Contains:
/// - Configuration and paths
/// - The LLM provider used for classification, generation and embeddings
/// - The conversation checkpoint store
/// - The session manager with one pipeline per configured branch
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Arc<MaeserConfig>,
    pub llm: Arc<dyn LlmProvider>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// 1. Load and validate configuration
    /// 2. Open the checkpoint database
    /// 3. Build the LLM provider
    /// 4. Build and register one pipeline per branch
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let settings = config
            .load_settings()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let llm: Arc<dyn LlmProvider> = Arc::new(
            OpenAiProvider::new(&settings.llm).map_err(|e| InitializationError::Llm(e.into()))?,
        );
        if settings.llm.api_key.is_none() {
            tracing::warn!("No API key configured; set llm.api_key or OPENAI_API_KEY");
        }

        Self::with_provider(paths, config, settings, llm).await
    }

    /// Build the state around an already constructed provider.
    pub async fn with_provider(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: MaeserConfig,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Arc<Self>, InitializationError> {
        let checkpoint_path = settings
            .checkpoint
            .path
            .as_deref()
            .map(|p| paths.resolve(p))
            .unwrap_or_else(|| paths.checkpoint_db_path.clone());
        let checkpoints: Arc<dyn CheckpointStore> = Arc::new(
            SqliteCheckpointStore::open(&checkpoint_path)
                .await
                .map_err(|e| InitializationError::Checkpoint(e.into()))?,
        );

        let mut sessions = SessionManager::new();
        for (name, branch) in &settings.branches {
            let pipeline = RagPipeline::open(branch.clone(), &paths, llm.clone(), checkpoints.clone())
                .await
                .map_err(|e| InitializationError::Branch {
                    name: name.clone(),
                    source: e.into(),
                })?;
            let label = branch.label.clone().unwrap_or_else(|| name.clone());
            tracing::info!(
                "Registered branch '{}' with topics [{}]",
                name,
                pipeline.registry().names().collect::<Vec<_>>().join(", ")
            );
            sessions.register_branch(name.clone(), label, Arc::new(pipeline));
        }
        if settings.branches.is_empty() {
            tracing::warn!("No branches configured");
        }

        Ok(Arc::new(AppState {
            paths,
            config,
            settings: Arc::new(settings),
            llm,
            checkpoints,
            sessions: Arc::new(sessions),
        }))
    }

    /// Chunk `text` and add it to the knowledge store of `topic` in `branch`.
    ///
    /// The store file is created when missing. Returns the number of chunks stored.
    pub async fn ingest(
        &self,
        branch: &str,
        topic: &str,
        text: &str,
        source: &str,
    ) -> Result<usize, RagError> {
        let branch_settings = self
            .settings
            .branches
            .get(branch)
            .ok_or_else(|| RagError::UnknownBranch(branch.to_string()))?;
        let topic = normalize_topic(topic);
        let store_path = branch_settings.topics.get(&topic).ok_or_else(|| {
            RagError::NotFound(format!("topic '{}' is not configured for branch '{}'", topic, branch))
        })?;

        let chunks = TextChunker::from_settings(&self.settings.chunking).split(text, source);
        if chunks.is_empty() {
            tracing::warn!("Nothing to ingest from {}", source);
            return Ok(0);
        }

        let path = self.paths.resolve(store_path);
        let store = open_store(&path, self.llm.clone(), branch_settings.retrieval_k).await?;
        let inserted = store.ingest(&chunks).await?;
        tracing::info!(
            "Ingested {} chunks from {} into '{}' ({} total)",
            inserted,
            source,
            topic,
            store.count().await?
        );
        Ok(inserted)
    }
}

async fn open_store(
    path: &Path,
    llm: Arc<dyn LlmProvider>,
    k: usize,
) -> Result<SqliteVectorStore, RagError> {
    SqliteVectorStore::open(path, llm, k, true).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::service::settings_from_value;
    use crate::rag::Retriever;
    use crate::testing::{MockLlm, Reply};
    use serde_json::json;

    fn config(tmp: &Path) -> (Arc<AppPaths>, ConfigService, MaeserConfig) {
        let paths = Arc::new(AppPaths::with_data_dir(tmp.to_path_buf(), tmp.join("data")));
        let config = ConfigService::new(paths.clone());
        let settings = settings_from_value(
            json!({
                "branches": {
                    "pipeline": {
                        "label": "Maeser Pipeline",
                        "topics": {
                            "byu history": "stores/byu.db",
                            "karl g maeser": "stores/maeser.db"
                        }
                    }
                }
            }),
            None,
        )
        .unwrap();
        (paths, config, settings)
    }

    #[tokio::test]
    async fn missing_stores_leave_topics_registered() {
        let tmp = tempfile::tempdir().unwrap();
        let (paths, config, settings) = config(tmp.path());
        let llm = MockLlm::new(vec![Reply::text("none")], vec![Reply::text("ok")]);

        let state = AppState::with_provider(paths, config, settings, llm).await.unwrap();

        let branches = state.sessions.branches();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].label, "Maeser Pipeline");

        let pipeline = state.sessions.pipeline("pipeline").unwrap();
        assert_eq!(pipeline.registry().len(), 2);
        assert!(pipeline.registry().retriever("byu history").unwrap().is_none());
        assert!(state.paths.checkpoint_db_path.exists());
    }

    #[tokio::test]
    async fn ingest_creates_store_and_chunks_text() {
        let tmp = tempfile::tempdir().unwrap();
        let (paths, config, settings) = config(tmp.path());
        let llm = MockLlm::new(vec![Reply::text("none")], vec![Reply::text("ok")]);
        let state = AppState::with_provider(paths, config, settings, llm.clone())
            .await
            .unwrap();

        let text = "Karl G. Maeser was born in 1828. ".repeat(60);
        let inserted = state
            .ingest("pipeline", "Karl G Maeser", &text, "maeser.txt")
            .await
            .unwrap();
        assert!(inserted >= 2);

        let store = SqliteVectorStore::open(
            &state.paths.resolve("stores/maeser.db"),
            llm,
            2,
            false,
        )
        .await
        .unwrap();
        assert_eq!(store.count().await.unwrap(), inserted);
        assert_eq!(store.retrieve("Maeser").await.unwrap().len(), 2);

        assert!(matches!(
            state.ingest("pipeline", "physics", &text, "x.txt").await,
            Err(RagError::NotFound(_))
        ));
        assert!(matches!(
            state.ingest("other", "byu history", &text, "x.txt").await,
            Err(RagError::UnknownBranch(_))
        ));
    }
}
