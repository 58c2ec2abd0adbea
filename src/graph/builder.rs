// Graph Builder
// Constructs the pipeline graph using petgraph

use super::node::{GraphError, Transition};
use super::nodes::{
    CheckpointNode, ClassifyTopicsNode, GenerateNode, RetrieveTopicNode, SummarizeNode,
};
use super::runtime::{GraphBuilder, GraphRuntime};
use crate::pipeline::classifier::MAX_TOPICS;

/// Build the per-turn pipeline graph
///
/// classify_topics -> [summarize_history] -> retrieve_topic* -> generate -> checkpoint
pub fn build_pipeline_graph(summarize: bool) -> Result<GraphRuntime, GraphError> {
    let mut builder = GraphBuilder::new()
        .entry("classify_topics")
        .node(Box::new(ClassifyTopicsNode::new()))
        .node(Box::new(RetrieveTopicNode::new()))
        .node(Box::new(GenerateNode::new()))
        .node(Box::new(CheckpointNode::new()))
        .terminal("checkpoint");

    // Both nodes route on the same transitions; zero topics skip retrieval
    let router = if summarize {
        builder = builder
            .node(Box::new(SummarizeNode::new()))
            .conditional_edge("classify_topics", "summarize_history", Transition::Retrieve)
            .conditional_edge("classify_topics", "summarize_history", Transition::Generate);
        "summarize_history"
    } else {
        "classify_topics"
    };

    // classify + optional summary + one retrieve per topic + generate + checkpoint
    let max_steps = MAX_TOPICS + 3 + usize::from(summarize);

    builder
        .max_steps(max_steps)
        .conditional_edge(router, "retrieve_topic", Transition::Retrieve)
        .conditional_edge(router, "generate", Transition::Generate)
        .conditional_edge("retrieve_topic", "retrieve_topic", Transition::Retrieve)
        .conditional_edge("retrieve_topic", "generate", Transition::Generate)
        .edge("generate", "checkpoint")
        .build()
}
