use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Failed to initialize checkpoint store: {0}")]
    Checkpoint(#[source] anyhow::Error),

    #[error("Failed to initialize LLM provider: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("Failed to build branch '{name}': {source}")]
    Branch {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}
