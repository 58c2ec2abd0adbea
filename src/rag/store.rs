//! Retriever trait: the interface every per-topic knowledge store implements.
//!
//! The primary implementation is `SqliteVectorStore` in the `sqlite` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::RagError;

/// A passage returned by a retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// The text content of the passage.
    pub content: String,
    /// Opaque source metadata (file name, offsets, ...).
    #[serde(default)]
    pub metadata: Value,
    /// Topic whose store produced the passage; filled in by the dispatcher.
    #[serde(default)]
    pub topic: String,
}

impl RetrievedDocument {
    pub fn new(content: impl Into<String>, metadata: Value) -> Self {
        Self {
            content: content.into(),
            metadata,
            topic: String::new(),
        }
    }

    /// The `source` metadata entry, if any.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

/// Nearest-neighbour text retriever for one topic's knowledge store.
///
/// An empty store yields an empty list rather than an error.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>, RagError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_reads_metadata() {
        let doc = RetrievedDocument::new("text", json!({ "source": "maeser.txt" }));
        assert_eq!(doc.source(), Some("maeser.txt"));
        assert!(doc.topic.is_empty());

        let doc = RetrievedDocument::new("text", Value::Null);
        assert_eq!(doc.source(), None);
    }
}
