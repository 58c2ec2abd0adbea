// Graph Module
// StateGraph runtime and the per-turn pipeline graph

pub mod builder;
pub mod node;
pub mod runtime;
pub mod state;

pub mod nodes;

pub use builder::build_pipeline_graph;
pub use node::{GraphError, Node, NodeContext, NodeOutput, Transition};
pub use runtime::{EdgeCondition, GraphBuilder, GraphRuntime};
pub use state::{ConversationState, Feedback, Role, SourceRef, Turn, TurnState, UsageMetrics};
