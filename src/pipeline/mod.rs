//! The multi-topic retrieval pipeline for one branch.
//!
//! Each call to [`RagPipeline::ask`] runs one turn through the graph built by
//! [`build_pipeline_graph`]: classify the message into registered topics,
//! optionally summarize the latest messages, query each topic's store in
//! classifier order, generate an answer at temperature 0 and checkpoint the
//! conversation. A failed turn leaves the stored conversation untouched.

pub mod classifier;
pub mod prompt;
pub mod summary;


use std::sync::Arc;

use serde::Serialize;

use crate::core::config::validation::validate_prompt_template;
use crate::core::config::{AppPaths, BranchSettings, ClassifierStrategy};
use crate::core::errors::RagError;
use crate::graph::{
    build_pipeline_graph, ConversationState, GraphRuntime, NodeContext, SourceRef, Turn, TurnState,
    UsageMetrics,
};
use crate::history::CheckpointStore;
use crate::llm::LlmProvider;
use crate::pipeline::classifier::MAX_TOPICS;
use crate::rag::{SqliteVectorStore, TopicRegistry};

/// Result of one successful turn.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    /// Topics the classifier chose, in dispatch order.
    pub topics: Vec<String>,
    pub sources: Vec<SourceRef>,
    pub usage: UsageMetrics,
    /// Number of turns stored for the session after this one.
    pub turn_count: usize,
}

pub struct RagPipeline {
    registry: Arc<TopicRegistry>,
    llm: Arc<dyn LlmProvider>,
    settings: BranchSettings,
    checkpoints: Arc<dyn CheckpointStore>,
    graph: GraphRuntime,
}

impl RagPipeline {
    pub fn new(
        registry: Arc<TopicRegistry>,
        llm: Arc<dyn LlmProvider>,
        settings: BranchSettings,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<Self, RagError> {
        validate_prompt_template("system_prompt", &settings.system_prompt)?;
        if settings.fallback_answer.trim().is_empty() {
            return Err(RagError::Config("fallback_answer cannot be empty".to_string()));
        }
        if settings.classifier == ClassifierStrategy::Single && registry.len() > MAX_TOPICS {
            return Err(RagError::Config(format!(
                "the 'single' classifier queries every topic and allows at most {} (got {})",
                MAX_TOPICS,
                registry.len()
            )));
        }
        let graph = build_pipeline_graph(settings.summarize_history)?;

        Ok(Self {
            registry,
            llm,
            settings,
            checkpoints,
            graph,
        })
    }

    /// Build a pipeline whose topics are SQLite knowledge stores.
    ///
    /// A store that cannot be opened leaves its topic registered without a
    /// retriever, so classification still recognises it.
    pub async fn open(
        settings: BranchSettings,
        paths: &AppPaths,
        llm: Arc<dyn LlmProvider>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<Self, RagError> {
        let mut builder = TopicRegistry::builder();
        for (topic, store_path) in &settings.topics {
            let path = paths.resolve(store_path);
            match SqliteVectorStore::open(&path, llm.clone(), settings.retrieval_k, false).await {
                Ok(store) => {
                    tracing::info!("Loaded knowledge store for '{}' from {}", topic, path.display());
                    builder = builder.topic(topic.as_str(), Arc::new(store));
                }
                Err(err) => {
                    tracing::warn!("Topic '{}' has no usable store: {}", topic, err);
                    builder = builder.unavailable_topic(topic.as_str());
                }
            }
        }

        Self::new(Arc::new(builder.build()?), llm, settings, checkpoints)
    }

    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &BranchSettings {
        &self.settings
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    /// Answer one message for a session and checkpoint the exchange.
    ///
    /// Callers must not run two turns for the same session concurrently;
    /// [`crate::session::SessionManager`] enforces this.
    pub async fn ask(&self, message: &str, session_id: &str) -> Result<AskResponse, RagError> {
        if message.trim().is_empty() {
            return Err(RagError::BadRequest("message cannot be empty".to_string()));
        }
        if session_id.trim().is_empty() {
            return Err(RagError::BadRequest("session id cannot be empty".to_string()));
        }

        let mut conversation = self
            .checkpoints
            .load(session_id)
            .await?
            .unwrap_or_else(|| ConversationState::new(session_id));

        let mut state = TurnState::new(message, &conversation);
        let mut ctx = NodeContext {
            registry: &self.registry,
            llm: self.llm.as_ref(),
            settings: &self.settings,
            checkpoints: self.checkpoints.as_ref(),
            conversation: &mut conversation,
        };

        let trace = self.graph.run(&mut state, &mut ctx).await?;
        tracing::debug!("Session {} turn path: {}", session_id, trace.join(" -> "));

        let answer = state
            .output
            .clone()
            .ok_or_else(|| RagError::InvariantViolation("turn finished without an answer".to_string()))?;

        Ok(AskResponse {
            answer,
            sources: state.sources(),
            topics: state.topics,
            usage: state.usage,
            turn_count: conversation.turns.len(),
        })
    }

    /// Stored turns for a session; empty when the session is unknown.
    pub async fn history(&self, session_id: &str) -> Result<Vec<Turn>, RagError> {
        Ok(self
            .checkpoints
            .load(session_id)
            .await?
            .map(|state| state.turns)
            .unwrap_or_default())
    }
}
