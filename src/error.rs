use std::error::Error;
use std::io;

use thiserror::Error;

/// Errors raised while wiring up a stream, before any event flows.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The same configuration key was declared more than once for a stream.
    #[error("duplicate `{key}` declaration for stream definition {stream}")]
    DuplicateAnnotation { stream: String, key: String },

    /// Ring capacity must be a non-zero power of two.
    #[error("event buffer size must be a non-zero power of two, got {0}")]
    InvalidCapacity(usize),

    /// The engine configuration document could not be parsed.
    #[error("invalid engine configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Error returned by a sink's batch handler.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink failed: {0}")]
    Failed(String),

    #[error("sink error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl SinkError {
    pub fn failed(msg: impl Into<String>) -> Self {
        SinkError::Failed(msg.into())
    }
}

/// Top-level error for dispatcher operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Synchronous delivery failed inside the sink.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The execution resource refused to run the consumer loop.
    #[error("failed to spawn consumer loop for stream {stream}: {source}")]
    Spawn {
        stream: String,
        #[source]
        source: io::Error,
    },

    #[error("dispatcher lock poisoned during {0}")]
    LockPoisoned(&'static str),
}
