//! Transactional storage sessions for the arca persistence core.
//!
//! This crate is the heart of the repository: it turns logical resource
//! operations (create, update, delete, purge, version) into staged changes
//! against OCFL objects and promotes them two-phase at commit.
//!
//! # Architecture
//!
//! - [`ResourceOperation`] -- a tagged operation value built by its factory
//! - a persister per operation kind stages changes into per-object
//!   sub-sessions ([`ObjectSession`]) under the session's staging directory
//! - [`StorageSession`] -- the transactional facade: concurrent `persist`,
//!   deterministic two-phase `commit`, rollback with committed-set undo
//! - [`SessionManager`] -- process-wide registry keyed by transaction id
//!
//! # Commit semantics
//!
//! `commit` drains in-flight persists, prepares every touched object in
//! ascending object-id order, commits them in the same order, then commits
//! the index. A prepare failure leaves the store untouched; a commit
//! failure leaves the session in a state where `rollback` will try to
//! revert the objects that already committed and will report every object
//! it cannot revert (mutable-head commits are visible immediately and are
//! never undone).

pub mod config;
pub mod error;
pub mod inflight;
pub mod manager;
pub mod object_session;
pub mod ops;
pub mod paths;
mod persister;
pub mod session;

pub use config::RepositoryConfig;
pub use error::{RollbackFailure, RollbackReason, SessionError, SessionResult};
pub use manager::SessionManager;
pub use object_session::{ObjectSession, OssState};
pub use ops::ResourceOperation;
pub use session::{SessionState, StorageSession};
