use serde_json::{json, Value};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful teacher helping a student with course material.\n\
You will answer a question based on the context provided:\n\
Don't answer questions about other things.\n\n\
{context}\n";

pub const DEFAULT_FALLBACK_ANSWER: &str =
    "I'm sorry, I wasn't able to come up with an answer to that. Could you rephrase your question?";

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Sliding window applied to prior messages before generation.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;
/// Passages requested from each topic's store.
pub const DEFAULT_RETRIEVAL_K: usize = 4;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Configuration written by `maeser-backend init`.
pub fn generate_default_config() -> Value {
    json!({
        "llm": {
            "provider": "openai",
            "base_url": DEFAULT_BASE_URL,
            "model": DEFAULT_MODEL,
            "embedding_model": DEFAULT_EMBEDDING_MODEL,
            "timeout_secs": 60,
            "prompt_cost_per_1k": 0.00015,
            "completion_cost_per_1k": 0.0006,
            "api_key": null
        },
        "checkpoint": {
            "path": "pipeline_memory.db"
        },
        "chunking": {
            "chunk_size": DEFAULT_CHUNK_SIZE,
            "chunk_overlap": DEFAULT_CHUNK_OVERLAP
        },
        "branches": {
            "pipeline": {
                "label": "Pipeline",
                "classifier": "multi",
                "history_window": DEFAULT_HISTORY_WINDOW,
                "summarize_history": false,
                "retrieval_k": DEFAULT_RETRIEVAL_K,
                "system_prompt": "You are speaking from the perspective of Karl G. Maeser.\n\
Answer questions about your life and BYU's history only.\n\
Do not answer questions about other things.\n\n{context}\n",
                "topics": {
                    "byu history": "stores/byu.db",
                    "karl g maeser": "stores/maeser.db"
                }
            }
        }
    })
}
