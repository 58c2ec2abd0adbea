// Generate Node
// Composes the answer from the system prompt, history and retrieved context

use async_trait::async_trait;

use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput};
use crate::graph::state::TurnState;
use crate::llm::ChatRequest;
use crate::pipeline::prompt;
use crate::rag;

pub struct GenerateNode;

impl GenerateNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GenerateNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for GenerateNode {
    fn id(&self) -> &'static str {
        "generate"
    }

    fn name(&self) -> &'static str {
        "Answer Generator"
    }

    async fn execute(
        &self,
        state: &mut TurnState,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let context = rag::render_context(&state.retrieved_context);
        let messages = prompt::build_messages(
            &ctx.settings.system_prompt,
            &context,
            &state.history,
            ctx.settings.history_window,
            state.history_summary.as_deref(),
            &state.input,
        );

        let completion = ctx
            .llm
            .chat(ChatRequest::new(messages).deterministic())
            .await
            .map_err(|e| GraphError::from_rag(self.id(), e))?;

        let cost = ctx.llm.pricing().cost(&completion.usage);
        state.usage.record(&completion.usage, cost);

        let answer = completion.content.trim();
        if answer.is_empty() {
            tracing::warn!("Generator returned an empty completion, using fallback answer");
            state.output = Some(ctx.settings.fallback_answer.clone());
        } else {
            state.output = Some(answer.to_string());
        }

        Ok(NodeOutput::Continue)
    }
}
