//! The object store adapter boundary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use arca_types::{OcflObjectId, VersionId};

use crate::changeset::Changeset;
use crate::error::StoreResult;

/// How a prepared changeset becomes durable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitMode {
    /// Commit into the overwritable mutable-head area. The head persists
    /// until an explicit promotion turns it into a version.
    #[default]
    MutableHead,
    /// Commit as a new immutable version directory.
    NewVersion,
}

/// One entry in an object's version listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OcflVersionInfo {
    pub version_id: VersionId,
    pub created: DateTime<Utc>,
}

/// Object-level I/O against an OCFL-shaped store.
///
/// All implementations must satisfy these invariants:
/// - A version named by the inventory is immutable and always readable.
/// - `prepare` materializes the pending set without touching the durable
///   head; a crash between `prepare` and `commit` leaves the object as it
///   was.
/// - `commit` promotes atomically: readers observe either the old head or
///   the new one, never a partial state.
/// - Operations on one object are serialized; distinct objects never block
///   each other.
pub trait OcflObjectStore: Send + Sync {
    /// Returns `true` if the object exists (has at least one committed
    /// version or a mutable head).
    fn contains(&self, id: &OcflObjectId) -> StoreResult<bool>;

    /// Returns `true` if the object has an unpromoted mutable head.
    fn has_staged_changes(&self, id: &OcflObjectId) -> StoreResult<bool>;

    /// Read one logical path. `version = None` reads the head: the mutable
    /// head when present, else the latest version.
    fn read(
        &self,
        id: &OcflObjectId,
        subpath: &str,
        version: Option<&VersionId>,
    ) -> StoreResult<Vec<u8>>;

    /// The logical path -> digest map at the given version (or the head).
    fn paths_at(
        &self,
        id: &OcflObjectId,
        version: Option<&VersionId>,
    ) -> StoreResult<BTreeMap<String, String>>;

    /// List committed versions in ascending order.
    fn list_versions(&self, id: &OcflObjectId) -> StoreResult<Vec<OcflVersionInfo>>;

    /// Validate and materialize a changeset into the object's pending area.
    ///
    /// Verifies declared digests against staged content. Fails with
    /// `Locked` if a prepared changeset already exists for the object.
    fn prepare(&self, id: &OcflObjectId, changeset: &Changeset) -> StoreResult<()>;

    /// Atomically promote the prepared changeset under the given mode.
    ///
    /// Fails with `Conflict` if nothing is prepared.
    fn commit(&self, id: &OcflObjectId, mode: CommitMode) -> StoreResult<()>;

    /// Discard a prepared-but-uncommitted changeset. Idempotent.
    fn abort(&self, id: &OcflObjectId) -> StoreResult<()>;

    /// Revert the object to the version before its current head, undoing
    /// the most recent `NewVersion` commit. Reverting `v1` removes the
    /// object. Adapters without version surgery return `Unsupported`.
    fn revert_to_previous_version(&self, id: &OcflObjectId) -> StoreResult<()>;

    /// Remove the object from the store entirely.
    fn purge(&self, id: &OcflObjectId) -> StoreResult<()>;
}
