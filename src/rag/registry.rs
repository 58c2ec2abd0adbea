//! Topic registry: normalized topic name -> retriever handle.
//!
//! Built once per branch and shared read-only across sessions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::store::Retriever;
use crate::core::errors::RagError;

/// Lower-case a topic label and collapse surrounding/internal whitespace.
pub fn normalize_topic(topic: &str) -> String {
    topic
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

struct TopicEntry {
    name: String,
    /// `None` when the topic's store could not be loaded.
    retriever: Option<Arc<dyn Retriever>>,
}

pub struct TopicRegistry {
    entries: Vec<TopicEntry>,
    index: HashMap<String, usize>,
}

impl TopicRegistry {
    pub fn builder() -> TopicRegistryBuilder {
        TopicRegistryBuilder::default()
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Topic names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.index.contains_key(topic)
    }

    /// Normalize a free-form label and return the registered name it matches.
    pub fn resolve(&self, label: &str) -> Option<&str> {
        self.index
            .get(&normalize_topic(label))
            .map(|idx| self.entries[*idx].name.as_str())
    }

    /// Retriever for a registered topic.
    ///
    /// `Ok(None)` means the topic is registered but has no usable store.
    /// An unregistered topic is an invariant violation: the classifier only
    /// emits registered names.
    pub fn retriever(&self, topic: &str) -> Result<Option<Arc<dyn Retriever>>, RagError> {
        let idx = self.index.get(topic).ok_or_else(|| {
            RagError::InvariantViolation(format!(
                "topic '{}' is not in the registry ({})",
                topic,
                self.names().collect::<Vec<_>>().join(", ")
            ))
        })?;
        Ok(self.entries[*idx].retriever.clone())
    }

    /// Quote the topic names for a prompt: `'a'`, `'a', or 'b'`, `'a', 'b', or 'c'`.
    pub fn format_for_prompt(&self) -> String {
        let names: Vec<&str> = self.names().collect();
        match names.as_slice() {
            [] => String::new(),
            [only] => format!("'{}'", only),
            [init @ .., last] => {
                let head = init
                    .iter()
                    .map(|name| format!("'{}'", name))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}, or '{}'", head, last)
            }
        }
    }
}

impl fmt::Debug for TopicRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| {
                (entry.name.as_str(), entry.retriever.is_some())
            }))
            .finish()
    }
}

#[derive(Default)]
pub struct TopicRegistryBuilder {
    pending: Vec<(String, Option<Arc<dyn Retriever>>)>,
}

impl TopicRegistryBuilder {
    pub fn topic(mut self, name: impl Into<String>, retriever: Arc<dyn Retriever>) -> Self {
        self.pending.push((name.into(), Some(retriever)));
        self
    }

    /// Register a topic whose store is unavailable; dispatch to it yields no documents.
    pub fn unavailable_topic(mut self, name: impl Into<String>) -> Self {
        self.pending.push((name.into(), None));
        self
    }

    pub fn build(self) -> Result<TopicRegistry, RagError> {
        let mut registry = TopicRegistry::empty();

        for (raw_name, retriever) in self.pending {
            let name = normalize_topic(&raw_name);
            if name.is_empty() {
                return Err(RagError::Config("topic name cannot be empty".to_string()));
            }
            if name == "none" {
                return Err(RagError::Config("topic name 'none' is reserved".to_string()));
            }
            if registry.index.contains_key(&name) {
                return Err(RagError::Config(format!(
                    "duplicate topic '{}' (after normalization)",
                    name
                )));
            }
            registry.index.insert(name.clone(), registry.entries.len());
            registry.entries.push(TopicEntry { name, retriever });
        }

        Ok(registry)
    }
}
