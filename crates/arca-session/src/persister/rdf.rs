//! Persisters for RDF source operations.

use arca_types::ResourceHeaders;

use crate::error::{SessionError, SessionResult};
use crate::ops::ResourceOperation;
use crate::paths::{container_body_subpath, relative_subpath, sidecar_subpath};
use crate::session::StorageSession;

use super::{effective_timestamp, encode_headers, mapping_for_new_resource, Persister};

/// Stages `CreateRdfSource` operations.
pub(crate) struct CreateRdfSourcePersister;

impl Persister for CreateRdfSourcePersister {
    fn handles(&self, op: &ResourceOperation) -> bool {
        matches!(op, ResourceOperation::CreateRdfSource { .. })
    }

    fn stage(&self, session: &StorageSession, op: &ResourceOperation) -> SessionResult<()> {
        let ResourceOperation::CreateRdfSource {
            rid,
            parent,
            interaction_model,
            archival_group,
            server_managed_props,
            triples,
            created,
        } = op
        else {
            return Err(SessionError::UnsupportedOperation(op.kind()));
        };

        let mapping = mapping_for_new_resource(session, rid, parent)?;
        if *archival_group && mapping.root_resource != *rid {
            return Err(SessionError::InvalidState(format!(
                "cannot create archival group {rid} inside archival group {}",
                mapping.root_resource
            )));
        }
        let rel = relative_subpath(rid, &mapping)?;

        let created_at = effective_timestamp(*server_managed_props, *created);
        let headers = ResourceHeaders::container(
            rid.clone(),
            parent.clone(),
            *interaction_model,
            *archival_group,
            created_at,
        );

        let oss = session.object_session(&mapping.ocfl_object_id)?;
        let mut oss = oss.lock().expect("lock poisoned");
        oss.stage_write(&container_body_subpath(&rel), triples, None)?;
        oss.stage_write(&sidecar_subpath(&rel), &encode_headers(&headers)?, None)?;
        drop(oss);

        session.index_add(rid, mapping)
    }
}

/// Stages `UpdateRdfSource` operations.
pub(crate) struct UpdateRdfSourcePersister;

impl Persister for UpdateRdfSourcePersister {
    fn handles(&self, op: &ResourceOperation) -> bool {
        matches!(op, ResourceOperation::UpdateRdfSource { .. })
    }

    fn stage(&self, session: &StorageSession, op: &ResourceOperation) -> SessionResult<()> {
        let ResourceOperation::UpdateRdfSource {
            rid,
            server_managed_props,
            triples,
            modified,
        } = op
        else {
            return Err(SessionError::UnsupportedOperation(op.kind()));
        };

        let mapping = session.lookup_mapping(rid)?;
        let rel = relative_subpath(rid, &mapping)?;

        let mut headers = session.read_headers_of(&mapping, rid, None)?;
        if headers.deleted {
            return Err(SessionError::Gone(rid.clone()));
        }
        if !headers.interaction_model.is_rdf() {
            return Err(SessionError::InvalidState(format!(
                "{rid} is not an RDF source"
            )));
        }
        headers.touch(effective_timestamp(*server_managed_props, *modified));

        let oss = session.object_session(&mapping.ocfl_object_id)?;
        let mut oss = oss.lock().expect("lock poisoned");
        oss.stage_write(&container_body_subpath(&rel), triples, None)?;
        oss.stage_write(&sidecar_subpath(&rel), &encode_headers(&headers)?, None)?;
        Ok(())
    }
}
