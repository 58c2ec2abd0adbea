// Classify Topics Node
// Entry point: decides which topic stores this turn consults

use async_trait::async_trait;

use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput, Transition};
use crate::graph::state::TurnState;
use crate::pipeline::classifier;

pub struct ClassifyTopicsNode;

impl ClassifyTopicsNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClassifyTopicsNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for ClassifyTopicsNode {
    fn id(&self) -> &'static str {
        "classify_topics"
    }

    fn name(&self) -> &'static str {
        "Topic Classifier"
    }

    async fn execute(
        &self,
        state: &mut TurnState,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let classification = classifier::classify(
            ctx.llm,
            ctx.registry,
            ctx.settings.classifier,
            &state.history,
            &state.input,
            &state.current_topics,
        )
        .await
        .map_err(|e| GraphError::from_rag(self.id(), e))?;

        let cost = ctx.llm.pricing().cost(&classification.usage);
        state.usage.record(&classification.usage, cost);
        state.topics = classification.topics;
        state.retrieval_index = 0;
        state.retrieved_context.clear();

        if state.topics.is_empty() {
            tracing::info!("No topics classified, generating without retrieved context");
            Ok(NodeOutput::Branch(Transition::Generate))
        } else {
            Ok(NodeOutput::Branch(Transition::Retrieve))
        }
    }
}
