//! Persisters: one handler per operation kind.
//!
//! Each persister declares which [`ResourceOperation`] variant it stages.
//! The storage session owns an immutable dispatch table built at
//! construction; routing walks the table and the first claimant stages the
//! operation. No claimant means the operation is unsupported.

mod binary;
mod delete;
mod purge;
mod rdf;
mod version;

use chrono::{DateTime, Utc};

use arca_index::OcflMapping;
use arca_store::StoreError;
use arca_types::{ResourceHeaders, ResourceId, ServerManagedPropsMode};

use crate::error::{SessionError, SessionResult};
use crate::ops::ResourceOperation;
use crate::session::StorageSession;

pub(crate) use binary::{CreateNonRdfSourcePersister, UpdateNonRdfSourcePersister};
pub(crate) use delete::DeleteResourcePersister;
pub(crate) use purge::PurgeResourcePersister;
pub(crate) use rdf::{CreateRdfSourcePersister, UpdateRdfSourcePersister};
pub(crate) use version::CreateVersionPersister;

/// Stages one kind of resource operation into the session.
pub(crate) trait Persister: Send + Sync {
    /// Returns `true` if this persister claims `op`.
    fn handles(&self, op: &ResourceOperation) -> bool;

    /// Stage the operation's changes into the session's object sub-sessions.
    fn stage(&self, session: &StorageSession, op: &ResourceOperation) -> SessionResult<()>;
}

/// The standard dispatch table.
pub(crate) fn default_persisters() -> Vec<Box<dyn Persister>> {
    vec![
        Box::new(CreateRdfSourcePersister),
        Box::new(UpdateRdfSourcePersister),
        Box::new(CreateNonRdfSourcePersister),
        Box::new(UpdateNonRdfSourcePersister),
        Box::new(DeleteResourcePersister),
        Box::new(PurgeResourcePersister),
        Box::new(CreateVersionPersister),
    ]
}

/// Resolve where a brand-new resource is stored.
///
/// A top-level resource becomes its own object. A resource under an
/// archival-group root joins the group's object; under any other parent it
/// becomes its own object.
pub(super) fn mapping_for_new_resource(
    session: &StorageSession,
    rid: &ResourceId,
    parent: &ResourceId,
) -> SessionResult<OcflMapping> {
    if session.lookup_mapping(rid).is_ok() {
        return Err(SessionError::InvalidState(format!(
            "resource already exists: {rid}"
        )));
    }
    if parent.is_root() {
        return Ok(OcflMapping::atomic(rid));
    }

    let parent_mapping = session
        .lookup_mapping(parent)
        .map_err(|_| SessionError::NotFound(parent.clone()))?;
    let root_headers =
        session.read_headers_of(&parent_mapping, &parent_mapping.root_resource, None)?;
    if root_headers.archival_group {
        Ok(OcflMapping::in_group(
            parent_mapping.ocfl_object_id,
            parent_mapping.root_resource,
        ))
    } else {
        Ok(OcflMapping::atomic(rid))
    }
}

/// The effective timestamp under a server-managed-properties mode.
pub(super) fn effective_timestamp(
    mode: ServerManagedPropsMode,
    supplied: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    match (mode, supplied) {
        (ServerManagedPropsMode::Relaxed, Some(t)) => t,
        _ => Utc::now(),
    }
}

/// Serialize headers for the sidecar file.
pub(super) fn encode_headers(headers: &ResourceHeaders) -> SessionResult<Vec<u8>> {
    serde_json::to_vec_pretty(headers)
        .map_err(|e| SessionError::Store(StoreError::Serialization(e.to_string())))
}

/// Deserialize a sidecar file.
pub(super) fn decode_headers(bytes: &[u8]) -> SessionResult<ResourceHeaders> {
    serde_json::from_slice(bytes)
        .map_err(|e| SessionError::Store(StoreError::Serialization(e.to_string())))
}
