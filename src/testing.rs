//! Scripted collaborators shared by the pipeline and session tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use crate::core::config::BranchSettings;
use crate::core::errors::RagError;
use crate::graph::state::{ConversationState, Feedback};
use crate::history::{CheckpointStore, MemoryCheckpointStore, SessionSummary};
use crate::llm::{ChatRequest, Completion, LlmProvider, Pricing, TokenUsage};
use crate::pipeline::summary::MAX_SUMMARY_TOKENS;
use crate::pipeline::RagPipeline;
use crate::rag::{RetrievedDocument, Retriever, TopicRegistry};

pub const PROMPT: &str = "Answer from this material:\n{context}";

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Answer with the rendered system prompt so tests can inspect the context.
    EchoSystem,
    /// Yield to the runtime for a while before answering.
    Slow(String),
    RateLimited,
    Unavailable,
}

impl Reply {
    pub fn text(s: &str) -> Self {
        Reply::Text(s.to_string())
    }
}

/// Chat backend with separate scripts for classification, summaries and
/// generation.
///
/// Requests are told apart by their token cap: summaries use
/// [`MAX_SUMMARY_TOKENS`], classification any other cap, generation none.
pub struct MockLlm {
    classifier: Mutex<VecDeque<Reply>>,
    summaries: Mutex<VecDeque<Reply>>,
    generator: Mutex<VecDeque<Reply>>,
    pub classify_calls: AtomicUsize,
    pub summary_calls: AtomicUsize,
    pub generate_requests: Mutex<Vec<ChatRequest>>,
}

impl MockLlm {
    pub fn new(classifier: Vec<Reply>, generator: Vec<Reply>) -> Arc<Self> {
        Self::with_summaries(classifier, generator, Vec::new())
    }

    pub fn with_summaries(
        classifier: Vec<Reply>,
        generator: Vec<Reply>,
        summaries: Vec<Reply>,
    ) -> Arc<Self> {
        Arc::new(Self {
            classifier: Mutex::new(classifier.into()),
            summaries: Mutex::new(summaries.into()),
            generator: Mutex::new(generator.into()),
            classify_calls: AtomicUsize::new(0),
            summary_calls: AtomicUsize::new(0),
            generate_requests: Mutex::new(Vec::new()),
        })
    }

    pub fn last_system_prompt(&self) -> String {
        self.generate_requests
            .lock()
            .unwrap()
            .last()
            .map(|req| req.messages[0].content.clone())
            .unwrap_or_default()
    }

    fn next(queue: &Mutex<VecDeque<Reply>>, default: Reply) -> Reply {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(default)
        } else {
            queue.front().cloned().unwrap_or(default)
        }
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn pricing(&self) -> Pricing {
        Pricing {
            prompt_per_1k: 1.0,
            completion_per_1k: 2.0,
        }
    }

    async fn chat(&self, request: ChatRequest) -> Result<Completion, RagError> {
        let reply = match request.max_tokens {
            Some(MAX_SUMMARY_TOKENS) => {
                self.summary_calls.fetch_add(1, Ordering::SeqCst);
                Self::next(&self.summaries, Reply::text("summary"))
            }
            Some(_) => {
                self.classify_calls.fetch_add(1, Ordering::SeqCst);
                Self::next(&self.classifier, Reply::text("none"))
            }
            None => {
                self.generate_requests.lock().unwrap().push(request.clone());
                Self::next(&self.generator, Reply::EchoSystem)
            }
        };

        let content = match reply {
            Reply::Text(text) => text,
            Reply::EchoSystem => request.messages[0].content.clone(),
            Reply::Slow(text) => {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                text
            }
            Reply::RateLimited => return Err(RagError::RateLimited("429 Too Many Requests".into())),
            Reply::Unavailable => return Err(RagError::ServiceUnavailable),
        };

        Ok(Completion {
            content,
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 10,
                total_tokens: 110,
            },
        })
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

/// Returns fixed passages and counts how often it was queried.
pub struct FixedRetriever {
    passages: Vec<String>,
    pub calls: AtomicUsize,
}

impl FixedRetriever {
    pub fn new(passages: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            passages: passages.iter().map(|p| p.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for FixedRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedDocument>, RagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .passages
            .iter()
            .enumerate()
            .map(|(i, text)| RetrievedDocument::new(text.clone(), json!({ "source": format!("doc{}.txt", i) })))
            .collect())
    }
}

pub struct FailingRetriever;

#[async_trait]
impl Retriever for FailingRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedDocument>, RagError> {
        Err(RagError::Retrieval("index file is corrupt".to_string()))
    }
}

/// Accepts loads but fails every save.
#[derive(Default)]
pub struct FailingCheckpointStore {
    inner: MemoryCheckpointStore,
}

#[async_trait]
impl CheckpointStore for FailingCheckpointStore {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, RagError> {
        self.inner.load(session_id).await
    }

    async fn save(&self, _state: &ConversationState) -> Result<(), RagError> {
        Err(RagError::Checkpoint("database is locked".to_string()))
    }

    async fn set_feedback(
        &self,
        session_id: &str,
        turn_index: usize,
        feedback: Feedback,
    ) -> Result<(), RagError> {
        self.inner.set_feedback(session_id, turn_index, feedback).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, RagError> {
        self.inner.list_sessions().await
    }
}

pub fn branch_settings() -> BranchSettings {
    BranchSettings {
        system_prompt: PROMPT.to_string(),
        ..BranchSettings::default()
    }
}

pub fn pipeline(
    registry: TopicRegistry,
    llm: Arc<MockLlm>,
    settings: BranchSettings,
    checkpoints: Arc<dyn CheckpointStore>,
) -> RagPipeline {
    RagPipeline::new(Arc::new(registry), llm, settings, checkpoints).unwrap()
}
