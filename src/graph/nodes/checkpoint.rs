// Checkpoint Node
// Appends the finished exchange and persists the conversation

use async_trait::async_trait;

use crate::core::errors::RagError;
use crate::graph::node::{GraphError, Node, NodeContext, NodeOutput};
use crate::graph::state::{Turn, TurnState};

pub struct CheckpointNode;

impl CheckpointNode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CheckpointNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for CheckpointNode {
    fn id(&self) -> &'static str {
        "checkpoint"
    }

    fn name(&self) -> &'static str {
        "Conversation Checkpoint"
    }

    async fn execute(
        &self,
        state: &mut TurnState,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError> {
        let Some(answer) = state.output.clone() else {
            return Err(GraphError::from_rag(
                self.id(),
                RagError::InvariantViolation("checkpoint reached without an answer".to_string()),
            ));
        };

        state.usage.latency_ms = state.started_at.elapsed().as_millis() as u64;

        let mut next = ctx.conversation.clone();
        next.turns.push(Turn::user(state.input.clone()));
        next.turns.push(Turn::assistant(answer, state.sources(), state.usage));
        if !state.topics.is_empty() {
            next.current_topics = state.topics.clone();
        }

        // The in-memory conversation only advances once the store has it.
        ctx.checkpoints
            .save(&next)
            .await
            .map_err(|e| match e {
                RagError::Checkpoint(_) => GraphError::from_rag(self.id(), e),
                other => GraphError::from_rag(self.id(), RagError::checkpoint(other)),
            })?;
        *ctx.conversation = next;

        tracing::debug!(
            "Checkpointed session {} ({} turns)",
            ctx.conversation.session_id,
            ctx.conversation.turns.len()
        );
        Ok(NodeOutput::Final)
    }
}
