/// Core error types for the Fable engine.

/// A specialized Result type for Fable operations.
pub type FableResult<T> = Result<T, FableError>;

/// Top-level error type encompassing all Fable subsystems.
#[derive(Debug, thiserror::Error)]
pub enum FableError {
    /// A resource referenced by the script is missing from the bundle.
    /// Fatal to presentation start.
    #[error("resource not found: {name}")]
    ResourceNotFound { name: String },

    /// A node id was not present in the active set.
    #[error("node not active: {0}")]
    LookupMiss(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl FableError {
    /// Create a resource-not-found error.
    pub fn resource_not_found(name: impl Into<String>) -> Self {
        FableError::ResourceNotFound { name: name.into() }
    }

    /// Create a lookup-miss error for a node id.
    pub fn lookup_miss(id: impl std::fmt::Display) -> Self {
        FableError::LookupMiss(id.to_string())
    }

    /// Whether this error must abort presentation start.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FableError::ResourceNotFound { .. }
                | FableError::Validation(_)
                | FableError::Io(_)
                | FableError::Serialization(_)
                | FableError::Config(_)
        )
    }
}
