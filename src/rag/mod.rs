//! Per-topic knowledge stores and the pieces a turn uses to query them.
//!
//! - `TopicRegistry`: normalized topic name -> retriever handle
//! - `SqliteVectorStore`: SQLite-backed `Retriever` with brute-force cosine search
//! - `TextChunker`: splits source text for ingestion

mod chunker;
mod context;
mod registry;
mod sqlite;
mod store;

pub use chunker::{TextChunk, TextChunker};
pub use context::{accumulate, render_context};
pub use registry::{normalize_topic, TopicRegistry, TopicRegistryBuilder};
pub use sqlite::SqliteVectorStore;
pub use store::{RetrievedDocument, Retriever};
