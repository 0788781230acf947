//! Error types shared across the store and presence layers.

/// Failure talking to (or encoding for) the presence store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure resolving the layered configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Figment(#[from] figment::Error),

    #[error(transparent)]
    Args(#[from] clap::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
