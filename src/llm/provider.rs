use async_trait::async_trait;

use super::types::{ChatRequest, Completion, Pricing};
use crate::core::errors::RagError;

/// Black-box text generation and embedding backend.
///
/// Implementations must report backend throttling as [`RagError::RateLimited`]
/// so callers can tell it apart from other failures.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "openai")
    fn name(&self) -> &str;

    /// the chat model this provider was constructed with
    fn model(&self) -> &str;

    /// prices used to estimate call cost
    fn pricing(&self) -> Pricing {
        Pricing::default()
    }

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest) -> Result<Completion, RagError>;

    /// generate embeddings
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}
