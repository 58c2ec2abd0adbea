// Graph Nodes
// One node per pipeline step

mod checkpoint;
mod classify;
mod generate;
mod retrieve;
mod summarize;

pub use checkpoint::CheckpointNode;
pub use classify::ClassifyTopicsNode;
pub use generate::GenerateNode;
pub use retrieve::RetrieveTopicNode;
pub use summarize::SummarizeNode;
