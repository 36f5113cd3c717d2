use arca_types::ResourceId;

/// Errors from index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The resource has no mapping in the committed index or the session's
    /// pending delta.
    #[error("no mapping for resource: {0}")]
    NotMapped(ResourceId),

    /// Serialization or deserialization failure of the persisted index.
    #[error("index serialization error: {0}")]
    Serialization(String),

    /// I/O error from the persisted index file.
    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
