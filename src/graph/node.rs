// Node trait and types
// Base abstraction for graph nodes

use async_trait::async_trait;

use crate::core::config::BranchSettings;
use crate::core::errors::RagError;
use crate::history::CheckpointStore;
use crate::llm::LlmProvider;
use crate::rag::TopicRegistry;

use super::state::{ConversationState, TurnState};

/// Branch resources passed to nodes during execution
pub struct NodeContext<'a> {
    /// Topic name -> retriever
    pub registry: &'a TopicRegistry,
    /// Classification and generation backend
    pub llm: &'a dyn LlmProvider,
    /// Prompt, window and classifier configuration
    pub settings: &'a BranchSettings,
    /// Durable conversation memory
    pub checkpoints: &'a dyn CheckpointStore,
    /// The session being answered, as loaded at the start of the turn
    pub conversation: &'a mut ConversationState,
}

/// Named routing decision emitted by a node.
///
/// Edges are keyed by this enum, so a node can only ask for a transition the
/// graph knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Query the next classified topic
    Retrieve,
    /// All topics dispatched; compose the answer
    Generate,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Retrieve => "retrieve",
            Transition::Generate => "generate",
        }
    }
}

/// Output from a node execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutput {
    /// Follow the node's default edge
    Continue,
    /// Follow the edge labelled with this transition
    Branch(Transition),
    /// Graph execution complete
    Final,
}

/// Graph execution error
///
/// Includes an `execution_trace` recording the sequence of node IDs visited
/// before the error occurred. When a node failed with a [`RagError`], the
/// original error is kept so callers can still tell its kind.
#[derive(Debug)]
pub struct GraphError {
    pub node_id: String,
    pub message: String,
    /// Ordered list of node IDs executed before this error, most-recent last.
    pub execution_trace: Vec<String>,
    pub source: Option<RagError>,
}

impl GraphError {
    pub fn new(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            message: message.into(),
            execution_trace: Vec::new(),
            source: None,
        }
    }

    /// Wrap a collaborator failure raised inside a node.
    pub fn from_rag(node_id: impl Into<String>, err: RagError) -> Self {
        Self {
            node_id: node_id.into(),
            message: err.to_string(),
            execution_trace: Vec::new(),
            source: Some(err),
        }
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.execution_trace = trace;
        self
    }
}

impl From<GraphError> for RagError {
    fn from(err: GraphError) -> Self {
        if !err.execution_trace.is_empty() {
            tracing::debug!(
                "Graph error in {} (trace: {})",
                err.node_id,
                err.execution_trace.join(" -> ")
            );
        }
        match err.source {
            Some(inner) => inner,
            // Routing failures are wiring faults, not collaborator failures.
            None => RagError::InvariantViolation(err.to_string()),
        }
    }
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.execution_trace.is_empty() {
            write!(f, "GraphError in {}: {}", self.node_id, self.message)
        } else {
            write!(
                f,
                "GraphError in {} (trace: {}): {}",
                self.node_id,
                self.execution_trace.join(" -> "),
                self.message
            )
        }
    }
}

impl std::error::Error for GraphError {}

/// Node trait - all graph nodes implement this
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique identifier for this node
    fn id(&self) -> &'static str;

    /// Human-readable name for display
    fn name(&self) -> &'static str {
        self.id()
    }

    /// Execute the node logic
    async fn execute(
        &self,
        state: &mut TurnState,
        ctx: &mut NodeContext<'_>,
    ) -> Result<NodeOutput, GraphError>;
}
