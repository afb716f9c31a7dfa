use thiserror::Error;

/// Errors produced while resolving a node or compiling its catalog.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The node manifest could not be parsed.
    #[error("node manifest error: {0}")]
    Manifest(#[from] serde_yaml::Error),

    /// The node cache rejected a write.
    #[error("node cache error: {0}")]
    Cache(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
