//! Typed view over the merged YAML configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::defaults::{
    DEFAULT_BASE_URL, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_FALLBACK_ANSWER, DEFAULT_HISTORY_WINDOW, DEFAULT_MODEL, DEFAULT_RETRIEVAL_K,
    DEFAULT_SYSTEM_PROMPT,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaeserConfig {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub checkpoint: CheckpointSettings,
    #[serde(default)]
    pub chunking: ChunkingSettings,
    #[serde(default)]
    pub branches: BTreeMap<String, BranchSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub prompt_cost_per_1k: f64,
    #[serde(default)]
    pub completion_cost_per_1k: f64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            prompt_cost_per_1k: 0.0,
            completion_cost_per_1k: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointSettings {
    /// SQLite file for conversation checkpoints; relative paths resolve
    /// against the data directory.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingSettings {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// How the topic classifier treats the previous turn's topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierStrategy {
    /// Up to three topics per message, independent of earlier turns.
    #[default]
    Multi,
    /// Exactly one topic, repeating the current topic when the message gives no signal.
    Sticky,
    /// No classifier call; every registered topic is queried on every turn.
    Single,
}

impl ClassifierStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierStrategy::Multi => "multi",
            ClassifierStrategy::Sticky => "sticky",
            ClassifierStrategy::Single => "single",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchSettings {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub classifier: ClassifierStrategy,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Summarize the last few messages before generation and pass the summary along.
    #[serde(default)]
    pub summarize_history: bool,
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: usize,
    #[serde(default = "default_fallback_answer")]
    pub fallback_answer: String,
    /// Topic name -> knowledge store path.
    #[serde(default)]
    pub topics: BTreeMap<String, String>,
}

impl Default for BranchSettings {
    fn default() -> Self {
        Self {
            label: None,
            system_prompt: default_system_prompt(),
            classifier: ClassifierStrategy::default(),
            history_window: default_history_window(),
            summarize_history: false,
            retrieval_k: default_retrieval_k(),
            fallback_answer: default_fallback_answer(),
            topics: BTreeMap::new(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_history_window() -> usize {
    DEFAULT_HISTORY_WINDOW
}

fn default_retrieval_k() -> usize {
    DEFAULT_RETRIEVAL_K
}

fn default_fallback_answer() -> String {
    DEFAULT_FALLBACK_ANSWER.to_string()
}
