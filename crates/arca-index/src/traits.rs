//! The index boundary consumed by storage sessions.

use arca_types::{ResourceId, SessionId};

use crate::error::IndexResult;
use crate::mapping::OcflMapping;

/// Bidirectional map from logical resources to OCFL objects, with
/// per-session transactional deltas.
///
/// Implementations must be safe for concurrent transactional writers:
/// deltas of distinct sessions never observe each other, and `get` composes
/// the committed map with (only) the calling session's delta -- a pending
/// removal hides the committed entry.
pub trait ResourceIndex: Send + Sync {
    /// Resolve a resource to its mapping, honoring the session's delta when
    /// a session is given.
    fn get(&self, session: Option<&SessionId>, rid: &ResourceId) -> IndexResult<OcflMapping>;

    /// Stage an addition in the session's delta.
    fn add(&self, session: &SessionId, rid: &ResourceId, mapping: OcflMapping) -> IndexResult<()>;

    /// Stage a removal in the session's delta.
    fn remove(&self, session: &SessionId, rid: &ResourceId) -> IndexResult<()>;

    /// Stage removal of every mapping whose storage root is `root`
    /// (the root itself included). Used when an object is purged.
    fn remove_by_root(&self, session: &SessionId, root: &ResourceId) -> IndexResult<()>;

    /// Fold the session's delta into the committed map and, for durable
    /// implementations, persist it.
    fn commit(&self, session: &SessionId) -> IndexResult<()>;

    /// Discard the session's delta.
    fn rollback(&self, session: &SessionId) -> IndexResult<()>;
}
