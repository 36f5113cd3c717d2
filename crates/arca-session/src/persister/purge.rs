//! Persister for purge operations.

use crate::error::{SessionError, SessionResult};
use crate::ops::ResourceOperation;
use crate::session::StorageSession;

use super::Persister;

/// Stages `PurgeResource` operations.
///
/// Purges are whole-object only: the target must be a storage root. The
/// object is removed from the store at commit and every mapping under the
/// root is removed from the index.
pub(crate) struct PurgeResourcePersister;

impl Persister for PurgeResourcePersister {
    fn handles(&self, op: &ResourceOperation) -> bool {
        matches!(op, ResourceOperation::PurgeResource { .. })
    }

    fn stage(&self, session: &StorageSession, op: &ResourceOperation) -> SessionResult<()> {
        let ResourceOperation::PurgeResource { rid } = op else {
            return Err(SessionError::UnsupportedOperation(op.kind()));
        };

        let mapping = session.lookup_mapping(rid)?;
        if *rid != mapping.root_resource {
            return Err(SessionError::InvalidState(format!(
                "cannot purge {rid}: it is a member of archival group {}",
                mapping.root_resource
            )));
        }

        let oss = session.object_session(&mapping.ocfl_object_id)?;
        oss.lock().expect("lock poisoned").request_purge();

        session.index_remove_by_root(rid)
    }
}
