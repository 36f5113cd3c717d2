use arca_types::OcflObjectId;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object, path, or version was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The object is locked by an in-progress prepare/commit cycle.
    #[error("object locked: {0}")]
    Locked(OcflObjectId),

    /// The operation conflicts with the object's current state.
    #[error("conflict on {id}: {reason}")]
    Conflict { id: OcflObjectId, reason: String },

    /// The adapter does not support the requested operation.
    #[error("unsupported store operation: {0}")]
    Unsupported(String),

    /// A declared content digest did not match the stored bytes.
    #[error("digest mismatch for {subpath}: expected {expected}, computed {computed}")]
    DigestMismatch {
        subpath: String,
        expected: String,
        computed: String,
    },

    /// The object's on-disk state is malformed.
    #[error("corrupt object {id}: {reason}")]
    Corrupt { id: OcflObjectId, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
