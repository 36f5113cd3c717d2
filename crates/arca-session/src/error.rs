use std::fmt;

use arca_index::IndexError;
use arca_store::StoreError;
use arca_types::{OcflObjectId, ResourceId};

use crate::session::SessionState;

/// Why one committed object could not be rolled back.
#[derive(Debug)]
pub enum RollbackReason {
    /// The change is already visible in the object's mutable head.
    MutableHead,
    /// The store adapter cannot revert versions.
    Unsupported,
    /// In-flight persists did not drain within the configured timeout.
    DrainTimeout,
    /// The revert itself failed.
    Io(String),
}

impl fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MutableHead => write!(f, "already committed to the mutable head"),
            Self::Unsupported => write!(f, "version revert not supported by the store"),
            Self::DrainTimeout => write!(f, "waiting for in-flight operations timed out"),
            Self::Io(e) => write!(f, "revert failed: {e}"),
        }
    }
}

/// One entry in an aggregated rollback failure.
#[derive(Debug)]
pub struct RollbackFailure {
    /// The object that could not be reverted; absent for session-level
    /// failures such as a drain timeout.
    pub ocfl_id: Option<OcflObjectId>,
    pub reason: RollbackReason,
}

impl fmt::Display for RollbackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ocfl_id {
            Some(id) => write!(f, "cannot roll back object <{id}>: {}", self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

/// Errors at the storage session boundary.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The resource has no mapping.
    #[error("resource not found: {0}")]
    NotFound(ResourceId),

    /// The resource existed but has been deleted; historical versions
    /// remain readable.
    #[error("resource is deleted: {0}")]
    Gone(ResourceId),

    /// Operation attempted after commit or rollback began.
    #[error("the session cannot be used in the {0} state")]
    SessionClosed(SessionState),

    /// Write operation on a session without a transaction id.
    #[error("session is read-only")]
    ReadOnly,

    /// No persister claimed the operation.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// The operation is not legal against its target.
    #[error("invalid operation: {0}")]
    InvalidState(String),

    /// Create-version requested with nothing to promote.
    #[error("no staged changes to version for {0}")]
    NoStagedChanges(ResourceId),

    /// An object failed to prepare during two-phase commit.
    #[error("failed to prepare object <{ocfl_id}> for commit")]
    PrepareFailed {
        ocfl_id: OcflObjectId,
        #[source]
        source: StoreError,
    },

    /// An object failed to commit after prepare.
    #[error("failed to commit object <{ocfl_id}>")]
    CommitFailed {
        ocfl_id: OcflObjectId,
        #[source]
        source: StoreError,
    },

    /// The index commit failed after the objects had committed.
    #[error("failed to commit index changes after object commit")]
    IndexCommitFailed(#[source] IndexError),

    /// One or more objects could not be rolled back.
    #[error("rollback incomplete: {}", format_failures(.failures))]
    RollbackFailed { failures: Vec<RollbackFailure> },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_failures(failures: &[RollbackFailure]) -> String {
    failures
        .iter()
        .map(RollbackFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
