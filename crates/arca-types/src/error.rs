use thiserror::Error;

/// Errors produced by type construction and parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid resource id {id:?}: {reason}")]
    InvalidResourceId { id: String, reason: String },

    #[error("invalid version id: {0:?}")]
    InvalidVersionId(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),
}
