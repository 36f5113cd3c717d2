//! OCFL object storage for the arca persistence core.
//!
//! This crate implements the object-store adapter: a content-addressed,
//! versioned object layout compatible with OCFL. Each object is
//! self-contained -- an inventory enumerating its versions, a manifest
//! mapping content digests to stored files, and one immutable directory per
//! version. A mutable-head area shadows the next version's contents until an
//! explicit promotion.
//!
//! # Commit Modes
//!
//! - [`CommitMode::NewVersion`] -- every commit produces a new immutable
//!   version directory.
//! - [`CommitMode::MutableHead`] -- commits land in an overwritable head
//!   area; a later promotion turns the accumulated head into a version.
//!
//! # Storage Backends
//!
//! All backends implement the [`OcflObjectStore`] trait:
//!
//! - [`FsOcflStore`] -- one directory per object under a root path
//! - [`MemoryOcflStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Version directories are immutable once the inventory names them.
//! 2. `prepare` never alters the durable head: it fully materializes the
//!    pending version in a temporary area first.
//! 3. `commit` promotes with renames; the durable inventory swap is last.
//! 4. Operations on one object are serialized; objects are independent.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod changeset;
pub mod error;
pub mod fs;
pub mod inventory;
pub mod memory;
pub mod traits;

pub use changeset::{Changeset, StagedFile};
pub use error::{StoreError, StoreResult};
pub use fs::FsOcflStore;
pub use inventory::{Inventory, VersionEntry};
pub use memory::MemoryOcflStore;
pub use traits::{CommitMode, OcflObjectStore, OcflVersionInfo};
