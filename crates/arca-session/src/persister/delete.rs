//! Persister for delete operations.
//!
//! Deleting a storage-root resource replaces its body with a tombstone
//! sidecar and stamps a version of the result, so the deletion itself is
//! part of the object's durable history. Deleting an archival-group member
//! removes the member's subtree from the head while the group (and its
//! other members) stay alive.

use chrono::Utc;

use crate::error::{SessionError, SessionResult};
use crate::ops::ResourceOperation;
use crate::paths::{body_subpath, relative_subpath, sidecar_subpath};
use crate::session::StorageSession;

use super::{decode_headers, encode_headers, Persister};

/// Stages `DeleteResource` operations.
pub(crate) struct DeleteResourcePersister;

impl Persister for DeleteResourcePersister {
    fn handles(&self, op: &ResourceOperation) -> bool {
        matches!(op, ResourceOperation::DeleteResource { .. })
    }

    fn stage(&self, session: &StorageSession, op: &ResourceOperation) -> SessionResult<()> {
        let ResourceOperation::DeleteResource { rid } = op else {
            return Err(SessionError::UnsupportedOperation(op.kind()));
        };

        let mapping = session.lookup_mapping(rid)?;
        let rel = relative_subpath(rid, &mapping)?;
        let oss = session.object_session(&mapping.ocfl_object_id)?;
        let mut oss = oss.lock().expect("lock poisoned");

        if *rid == mapping.root_resource {
            // Root resource: tombstone the sidecar, drop the body, and
            // stamp a version so the deletion is durable history.
            let mut headers = decode_headers(&oss.read(&sidecar_subpath(&rel), None)?)?;
            if headers.deleted {
                return Err(SessionError::Gone(rid.clone()));
            }
            headers.mark_deleted(Utc::now());

            oss.stage_delete(&body_subpath(&rel, headers.interaction_model))?;
            oss.stage_write(&sidecar_subpath(&rel), &encode_headers(&headers)?, None)?;
            oss.promote_on_commit();
        } else {
            // Archival-group member: remove its subtree, leave the group.
            if !oss.head_paths()?.contains(&sidecar_subpath(&rel)) {
                return Err(SessionError::NotFound(rid.clone()));
            }
            oss.stage_delete_tree(&rel)?;
        }
        Ok(())
    }
}
