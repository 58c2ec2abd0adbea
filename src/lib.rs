//! Multi-topic retrieval-augmented chat backend.
//!
//! Each configured branch is a [`pipeline::RagPipeline`]: a small state graph
//! that classifies a message into registered topics, retrieves passages from
//! each topic's knowledge store, generates an answer and checkpoints the
//! conversation under its session id.

pub mod core;
pub mod graph;
pub mod history;
pub mod llm;
pub mod pipeline;
pub mod rag;
pub mod session;
pub mod state;
pub mod vector_math;

#[cfg(test)]
mod testing;
