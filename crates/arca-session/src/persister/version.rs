//! Persister for explicit version creation.

use crate::error::{SessionError, SessionResult};
use crate::ops::ResourceOperation;
use crate::session::StorageSession;

use super::Persister;

/// Stages `CreateVersion` operations: promotes the object's mutable head
/// (plus anything staged in this session) to a new immutable version at
/// commit.
pub(crate) struct CreateVersionPersister;

impl Persister for CreateVersionPersister {
    fn handles(&self, op: &ResourceOperation) -> bool {
        matches!(op, ResourceOperation::CreateVersion { .. })
    }

    fn stage(&self, session: &StorageSession, op: &ResourceOperation) -> SessionResult<()> {
        let ResourceOperation::CreateVersion { rid } = op else {
            return Err(SessionError::UnsupportedOperation(op.kind()));
        };

        let mapping = session.lookup_mapping(rid)?;
        let oss = session.object_session(&mapping.ocfl_object_id)?;
        let mut oss = oss.lock().expect("lock poisoned");

        let head_staged = session
            .store()
            .has_staged_changes(&mapping.ocfl_object_id)?;
        if !oss.has_pending() && !head_staged {
            return Err(SessionError::NoStagedChanges(rid.clone()));
        }

        oss.promote_on_commit();
        Ok(())
    }
}
