//! Persisters for non-RDF (binary) source operations.

use arca_store::StoreError;
use arca_types::{ContentDigest, InteractionModel, ResourceHeaders};

use crate::error::{SessionError, SessionResult};
use crate::ops::ResourceOperation;
use crate::paths::{binary_body_subpath, relative_subpath, sidecar_subpath};
use crate::session::StorageSession;

use super::{encode_headers, mapping_for_new_resource, Persister};

/// Check the payload against every digest the caller supplied.
fn validate_digests(
    subpath: &str,
    content: &[u8],
    expected: &[ContentDigest],
) -> SessionResult<()> {
    for digest in expected {
        if !digest.matches(content) {
            return Err(SessionError::Store(StoreError::DigestMismatch {
                subpath: subpath.to_string(),
                expected: digest.value.clone(),
                computed: ContentDigest::compute(digest.algorithm, content).value,
            }));
        }
    }
    Ok(())
}

/// The digest set recorded in a binary's headers: caller-supplied digests
/// plus the store's own algorithm.
fn header_digests(
    session: &StorageSession,
    content: &[u8],
    expected: &[ContentDigest],
) -> Vec<ContentDigest> {
    let store_alg = session.config().digest_algorithm;
    let mut digests = expected.to_vec();
    if !digests.iter().any(|d| d.algorithm == store_alg) {
        digests.push(ContentDigest::compute(store_alg, content));
    }
    digests
}

/// Stages `CreateNonRdfSource` operations.
pub(crate) struct CreateNonRdfSourcePersister;

impl Persister for CreateNonRdfSourcePersister {
    fn handles(&self, op: &ResourceOperation) -> bool {
        matches!(op, ResourceOperation::CreateNonRdfSource { .. })
    }

    fn stage(&self, session: &StorageSession, op: &ResourceOperation) -> SessionResult<()> {
        let ResourceOperation::CreateNonRdfSource {
            rid,
            parent,
            content,
            mime_type,
            filename,
            expected_digests,
        } = op
        else {
            return Err(SessionError::UnsupportedOperation(op.kind()));
        };

        let mapping = mapping_for_new_resource(session, rid, parent)?;
        let rel = relative_subpath(rid, &mapping)?;
        let body = binary_body_subpath(&rel);

        validate_digests(&body, content, expected_digests)?;
        let digests = header_digests(session, content, expected_digests);

        let headers = ResourceHeaders::binary(
            rid.clone(),
            parent.clone(),
            chrono::Utc::now(),
            content.len() as u64,
            mime_type.clone(),
            filename.clone(),
            digests,
        );

        let oss = session.object_session(&mapping.ocfl_object_id)?;
        let mut oss = oss.lock().expect("lock poisoned");
        oss.stage_write(&body, content, expected_digests.first().cloned())?;
        oss.stage_write(&sidecar_subpath(&rel), &encode_headers(&headers)?, None)?;
        drop(oss);

        session.index_add(rid, mapping)
    }
}

/// Stages `UpdateNonRdfSource` operations.
pub(crate) struct UpdateNonRdfSourcePersister;

impl Persister for UpdateNonRdfSourcePersister {
    fn handles(&self, op: &ResourceOperation) -> bool {
        matches!(op, ResourceOperation::UpdateNonRdfSource { .. })
    }

    fn stage(&self, session: &StorageSession, op: &ResourceOperation) -> SessionResult<()> {
        let ResourceOperation::UpdateNonRdfSource {
            rid,
            content,
            mime_type,
            filename,
            expected_digests,
        } = op
        else {
            return Err(SessionError::UnsupportedOperation(op.kind()));
        };

        let mapping = session.lookup_mapping(rid)?;
        let rel = relative_subpath(rid, &mapping)?;
        let body = binary_body_subpath(&rel);

        let mut headers = session.read_headers_of(&mapping, rid, None)?;
        if headers.deleted {
            return Err(SessionError::Gone(rid.clone()));
        }
        if headers.interaction_model != InteractionModel::NonRdfSource {
            return Err(SessionError::InvalidState(format!(
                "{rid} is not a non-RDF source"
            )));
        }

        validate_digests(&body, content, expected_digests)?;
        headers.digests = header_digests(session, content, expected_digests);
        headers.content_size = Some(content.len() as u64);
        if mime_type.is_some() {
            headers.mime_type = mime_type.clone();
        }
        if filename.is_some() {
            headers.filename = filename.clone();
        }
        headers.touch(chrono::Utc::now());

        let oss = session.object_session(&mapping.ocfl_object_id)?;
        let mut oss = oss.lock().expect("lock poisoned");
        oss.stage_write(&body, content, expected_digests.first().cloned())?;
        oss.stage_write(&sidecar_subpath(&rel), &encode_headers(&headers)?, None)?;
        Ok(())
    }
}
