// Summarize Node
// Optional step between classification and retrieval

use async_trait::async_trait;

use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput, Transition};
use crate::graph::state::TurnState;
use crate::pipeline::summary;

pub struct SummarizeNode;

impl SummarizeNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SummarizeNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for SummarizeNode {
    fn id(&self) -> &'static str {
        "summarize_history"
    }

    fn name(&self) -> &'static str {
        "History Summarizer"
    }

    async fn execute(
        &self,
        state: &mut TurnState,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let summary = summary::summarize(ctx.llm, &state.history, &state.input)
            .await
            .map_err(|e| GraphError::from_rag(self.id(), e))?;

        let cost = ctx.llm.pricing().cost(&summary.usage);
        state.usage.record(&summary.usage, cost);
        state.history_summary = summary.text;

        if state.topics.is_empty() {
            Ok(NodeOutput::Branch(Transition::Generate))
        } else {
            Ok(NodeOutput::Branch(Transition::Retrieve))
        }
    }
}
