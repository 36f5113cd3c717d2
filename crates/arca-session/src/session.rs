//! The transactional storage session.
//!
//! A [`StorageSession`] mediates between logical resource operations and
//! the object store: persisters stage changes into per-object sub-sessions
//! under the session's staging directory, and `commit` promotes every
//! touched object two-phase (prepare all, then commit all) in a stable
//! ascending object-id order. `rollback` discards staged work and attempts
//! to undo objects that had already committed, surfacing every object it
//! could not revert.
//!
//! Sessions are safe for concurrent `persist` calls: each persist registers
//! on an in-flight counter, and commit/rollback wait for the counter to
//! drain before touching any sub-session.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use arca_index::{OcflMapping, ResourceIndex};
use arca_store::{CommitMode, OcflObjectStore, OcflVersionInfo, StoreError};
use arca_types::{OcflObjectId, ResourceHeaders, ResourceId, SessionId, VersionId};

use crate::config::RepositoryConfig;
use crate::error::{RollbackFailure, RollbackReason, SessionError, SessionResult};
use crate::inflight::InflightCounter;
use crate::object_session::ObjectSession;
use crate::ops::ResourceOperation;
use crate::paths::{body_subpath, relative_subpath, sidecar_subpath};
use crate::persister::{decode_headers, default_persisters, Persister};

/// Lifecycle of a storage session.
///
/// Transitions are monotonic; `Committed`, `RolledBack`, and
/// `RollbackFailed` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Open,
    CommitStarted,
    PrepareFailed,
    Committed,
    CommitFailed,
    RollingBack,
    RolledBack,
    RollbackFailed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::CommitStarted => "commit-started",
            Self::PrepareFailed => "prepare-failed",
            Self::Committed => "committed",
            Self::CommitFailed => "commit-failed",
            Self::RollingBack => "rolling-back",
            Self::RolledBack => "rolled-back",
            Self::RollbackFailed => "rollback-failed",
        };
        f.write_str(name)
    }
}

/// One transactional storage session.
pub struct StorageSession {
    /// Transaction id; `None` makes the session read-only.
    id: Option<SessionId>,
    config: RepositoryConfig,
    store: Arc<dyn OcflObjectStore>,
    index: Arc<dyn ResourceIndex>,
    staging_dir: PathBuf,
    persisters: Vec<Box<dyn Persister>>,
    object_sessions: Mutex<BTreeMap<OcflObjectId, Arc<Mutex<ObjectSession>>>>,
    /// Snapshot taken by an explicit `prepare()`, consumed by `commit()`.
    prepared: Mutex<Option<Vec<(OcflObjectId, Arc<Mutex<ObjectSession>>)>>>,
    /// Objects whose sub-session already committed, with the mode used.
    /// Populated during the commit phase; consumed by rollback.
    committed: Mutex<BTreeMap<OcflObjectId, CommitMode>>,
    inflight: InflightCounter,
    state: Mutex<SessionState>,
    last_activity: Mutex<Instant>,
}

impl StorageSession {
    /// Create a session. `id = None` yields a read-only session that
    /// rejects writes and treats commit/rollback as no-ops.
    pub fn new(
        id: Option<SessionId>,
        store: Arc<dyn OcflObjectStore>,
        index: Arc<dyn ResourceIndex>,
        config: RepositoryConfig,
    ) -> Self {
        let staging_dir = match &id {
            Some(id) => config.session_staging_root.join(fs_safe(id.as_str())),
            // Never materialized: read-only sessions stage nothing.
            None => config.session_staging_root.join("read-only"),
        };
        Self {
            id,
            config,
            store,
            index,
            staging_dir,
            persisters: default_persisters(),
            object_sessions: Mutex::new(BTreeMap::new()),
            prepared: Mutex::new(None),
            committed: Mutex::new(BTreeMap::new()),
            inflight: InflightCounter::new(),
            state: Mutex::new(SessionState::Open),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// The session's transaction id, if any.
    pub fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    /// Returns `true` if the session has no transaction id.
    pub fn is_read_only(&self) -> bool {
        self.id.is_none()
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("lock poisoned")
    }

    /// How long the session has been idle. Used by the session manager's
    /// orphan reaping.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().expect("lock poisoned").elapsed()
    }

    // ---------------------------------------------------------------
    // Write path
    // ---------------------------------------------------------------

    /// Stage one resource operation.
    ///
    /// Safe to call from multiple threads; each call registers on the
    /// in-flight counter so commit and rollback can wait for it.
    pub fn persist(&self, op: ResourceOperation) -> SessionResult<()> {
        if self.is_read_only() {
            return Err(SessionError::ReadOnly);
        }
        // Register before the state check so a commit that begins after the
        // check still drains this persist.
        let _inflight = self.inflight.register();
        self.ensure_open()?;
        self.touch();

        let persister = self
            .persisters
            .iter()
            .find(|p| p.handles(&op))
            .ok_or_else(|| SessionError::UnsupportedOperation(op.kind()))?;

        debug!(
            session = %self.display_id(),
            op = op.kind(),
            rid = %op.rid(),
            "staging operation"
        );
        persister.stage(self, &op)
    }

    // ---------------------------------------------------------------
    // Read surface
    // ---------------------------------------------------------------

    /// Read a resource's headers, optionally at a memento timestamp.
    pub fn get_headers(
        &self,
        rid: &ResourceId,
        version: Option<DateTime<Utc>>,
    ) -> SessionResult<ResourceHeaders> {
        self.ensure_open()?;
        let mapping = self.lookup_mapping(rid)?;
        let resolved = self.resolve_version(&mapping, rid, version)?;
        let headers = self.read_headers_of(&mapping, rid, resolved.as_ref())?;
        if version.is_none() && headers.deleted {
            return Err(SessionError::Gone(rid.clone()));
        }
        Ok(headers)
    }

    /// Read a container's RDF body, optionally at a memento timestamp.
    pub fn get_triples(
        &self,
        rid: &ResourceId,
        version: Option<DateTime<Utc>>,
    ) -> SessionResult<Vec<u8>> {
        self.ensure_open()?;
        let mapping = self.lookup_mapping(rid)?;
        let resolved = self.resolve_version(&mapping, rid, version)?;
        let headers = self.read_headers_of(&mapping, rid, resolved.as_ref())?;
        if !headers.interaction_model.is_rdf() {
            return Err(SessionError::InvalidState(format!(
                "{rid} is not an RDF source"
            )));
        }
        if version.is_none() && headers.deleted {
            return Err(SessionError::Gone(rid.clone()));
        }
        self.read_body(&mapping, rid, headers.interaction_model, resolved.as_ref())
    }

    /// Read a binary's payload, optionally at a memento timestamp.
    pub fn get_binary(
        &self,
        rid: &ResourceId,
        version: Option<DateTime<Utc>>,
    ) -> SessionResult<Vec<u8>> {
        self.ensure_open()?;
        let mapping = self.lookup_mapping(rid)?;
        let resolved = self.resolve_version(&mapping, rid, version)?;
        let headers = self.read_headers_of(&mapping, rid, resolved.as_ref())?;
        if headers.interaction_model.is_rdf() {
            return Err(SessionError::InvalidState(format!(
                "{rid} is not a non-RDF source"
            )));
        }
        if version.is_none() && headers.deleted {
            return Err(SessionError::Gone(rid.clone()));
        }
        self.read_body(&mapping, rid, headers.interaction_model, resolved.as_ref())
    }

    /// List the committed versions relevant to a resource, ascending.
    ///
    /// For an archival-group member, only versions in which the member's
    /// own files changed are listed.
    pub fn list_versions(&self, rid: &ResourceId) -> SessionResult<Vec<OcflVersionInfo>> {
        self.ensure_open()?;
        let mapping = self.lookup_mapping(rid)?;
        let versions = self
            .store
            .list_versions(&mapping.ocfl_object_id)
            .map_err(|e| self.map_not_found(e, rid))?;

        if *rid == mapping.root_resource {
            return Ok(versions);
        }

        // Member of an archival group: keep versions where the member's
        // subtree differs from the previous version's.
        let rel = relative_subpath(rid, &mapping)?;
        let prefix = format!("{rel}/");
        let mut previous: Option<BTreeMap<String, String>> = None;
        let mut relevant = Vec::new();
        for info in versions {
            let state = self
                .store
                .paths_at(&mapping.ocfl_object_id, Some(&info.version_id))?;
            let member_state: BTreeMap<String, String> = state
                .into_iter()
                .filter(|(path, _)| path.starts_with(&prefix))
                .collect();
            if !member_state.is_empty() && previous.as_ref() != Some(&member_state) {
                relevant.push(info);
            }
            previous = Some(member_state);
        }
        Ok(relevant)
    }

    // ---------------------------------------------------------------
    // Two-phase commit
    // ---------------------------------------------------------------

    /// Run the prepare phase explicitly.
    ///
    /// Drains in-flight persists and prepares every touched object in
    /// ascending object-id order; a following [`StorageSession::commit`]
    /// runs the commit phase over the same snapshot. Callers may skip this
    /// and let `commit` run both phases. A no-op for read-only sessions.
    pub fn prepare(&self) -> SessionResult<()> {
        let Some(session_id) = &self.id else {
            return Ok(());
        };

        {
            let mut state = self.state.lock().expect("lock poisoned");
            if *state != SessionState::Open {
                return Err(SessionError::SessionClosed(*state));
            }
            *state = SessionState::CommitStarted;
        }
        debug!(session = %session_id, "preparing commit");

        self.inflight.await_zero(None);
        let sessions = self.snapshot_object_sessions();
        self.prepare_all(&sessions)?;
        *self.prepared.lock().expect("lock poisoned") = Some(sessions);
        Ok(())
    }

    /// Commit every staged change.
    ///
    /// Drains in-flight persists, then prepares (unless an explicit
    /// [`StorageSession::prepare`] already did) and commits each touched
    /// object in ascending object-id order, then commits the index, then
    /// removes the staging directory. A no-op for read-only sessions.
    pub fn commit(&self) -> SessionResult<()> {
        let Some(session_id) = &self.id else {
            // Read-only: nothing to commit.
            return Ok(());
        };

        let already_prepared = {
            let mut state = self.state.lock().expect("lock poisoned");
            match *state {
                SessionState::Open => {
                    *state = SessionState::CommitStarted;
                    false
                }
                SessionState::CommitStarted => true,
                other => return Err(SessionError::SessionClosed(other)),
            }
        };
        debug!(session = %session_id, "starting commit");

        let sessions = if already_prepared {
            self.prepared
                .lock()
                .expect("lock poisoned")
                .take()
                .ok_or_else(|| {
                    SessionError::InvalidState(
                        "commit already started but no prepared snapshot exists".into(),
                    )
                })?
        } else {
            // No new persists can start (state is no longer Open); wait for
            // the ones already registered.
            self.inflight.await_zero(None);
            debug!(session = %session_id, "all persisters complete");

            let sessions = self.snapshot_object_sessions();
            self.prepare_all(&sessions)?;
            sessions
        };

        // Phase two: commit in the same order, recording what has become
        // durable so rollback can try to undo it.
        for (ocfl_id, oss) in &sessions {
            let mut oss = oss.lock().expect("lock poisoned");
            match oss.commit() {
                Ok(outcome) => {
                    if let Some(mode) = outcome {
                        self.committed
                            .lock()
                            .expect("lock poisoned")
                            .insert(ocfl_id.clone(), mode);
                    }
                    if let Err(e) = oss.close() {
                        warn!(session = %session_id, object = %ocfl_id, error = %e,
                              "failed to close object session after commit");
                    }
                }
                Err(e) => {
                    self.set_state(SessionState::CommitFailed);
                    return Err(match e {
                        SessionError::Store(source) => SessionError::CommitFailed {
                            ocfl_id: ocfl_id.clone(),
                            source,
                        },
                        other => other,
                    });
                }
            }
        }

        // The index commits only after every object commit succeeded.
        if let Err(e) = self.index.commit(session_id) {
            self.set_state(SessionState::CommitFailed);
            return Err(SessionError::IndexCommitFailed(e));
        }

        self.cleanup_staging();
        self.set_state(SessionState::Committed);
        info!(session = %session_id, objects = sessions.len(), "session committed");
        Ok(())
    }

    /// Roll back the session.
    ///
    /// Legal from `Open`, `PrepareFailed`, and `CommitFailed`. Sub-sessions
    /// that already committed are reverted where the store allows it; every
    /// object that cannot be reverted is reported in the aggregate
    /// `RollbackFailed` error.
    pub fn rollback(&self) -> SessionResult<()> {
        let Some(session_id) = &self.id else {
            // Read-only: nothing to roll back.
            return Ok(());
        };

        let commit_was_started = {
            let state = self.state.lock().expect("lock poisoned");
            match *state {
                SessionState::Open => false,
                SessionState::PrepareFailed | SessionState::CommitFailed => true,
                other => {
                    return Err(SessionError::InvalidState(format!(
                        "the session cannot be rolled back in the {other} state"
                    )))
                }
            }
        };

        if !commit_was_started {
            // Commit never drained the in-flight persists, so rollback
            // must; the wait is bounded.
            if !self.inflight.await_zero(Some(self.config.rollback_drain_timeout)) {
                return Err(SessionError::RollbackFailed {
                    failures: vec![RollbackFailure {
                        ocfl_id: None,
                        reason: RollbackReason::DrainTimeout,
                    }],
                });
            }
        }

        self.set_state(SessionState::RollingBack);
        info!(session = %session_id, "rolling back session");

        let committed =
            std::mem::take(&mut *self.committed.lock().expect("lock poisoned"));
        let mut failures = Vec::new();

        // Discard the sub-sessions that never committed.
        for (ocfl_id, oss) in &self.snapshot_object_sessions() {
            if committed.contains_key(ocfl_id) {
                continue;
            }
            if let Err(e) = oss.lock().expect("lock poisoned").close() {
                failures.push(RollbackFailure {
                    ocfl_id: Some(ocfl_id.clone()),
                    reason: RollbackReason::Io(e.to_string()),
                });
            }
        }

        // Try to undo the ones that did commit.
        for (ocfl_id, mode) in &committed {
            match mode {
                CommitMode::MutableHead => failures.push(RollbackFailure {
                    ocfl_id: Some(ocfl_id.clone()),
                    reason: RollbackReason::MutableHead,
                }),
                CommitMode::NewVersion => {
                    match self.store.revert_to_previous_version(ocfl_id) {
                        Ok(()) => {}
                        Err(StoreError::Unsupported(_)) => failures.push(RollbackFailure {
                            ocfl_id: Some(ocfl_id.clone()),
                            reason: RollbackReason::Unsupported,
                        }),
                        Err(e) => failures.push(RollbackFailure {
                            ocfl_id: Some(ocfl_id.clone()),
                            reason: RollbackReason::Io(e.to_string()),
                        }),
                    }
                }
            }
        }

        if let Err(e) = self.index.rollback(session_id) {
            failures.push(RollbackFailure {
                ocfl_id: None,
                reason: RollbackReason::Io(e.to_string()),
            });
        }

        self.cleanup_staging();

        if failures.is_empty() {
            self.set_state(SessionState::RolledBack);
            debug!(session = %session_id, "session rolled back");
            Ok(())
        } else {
            self.set_state(SessionState::RollbackFailed);
            Err(SessionError::RollbackFailed { failures })
        }
    }

    // ---------------------------------------------------------------
    // Internals shared with persisters
    // ---------------------------------------------------------------

    pub(crate) fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<dyn OcflObjectStore> {
        &self.store
    }

    /// Resolve a resource's mapping through the index, honoring this
    /// session's pending delta.
    pub(crate) fn lookup_mapping(&self, rid: &ResourceId) -> SessionResult<OcflMapping> {
        self.index
            .get(self.id.as_ref(), rid)
            .map_err(|_| SessionError::NotFound(rid.clone()))
    }

    /// The sub-session for one object, created on first use.
    pub(crate) fn object_session(
        &self,
        ocfl_id: &OcflObjectId,
    ) -> SessionResult<Arc<Mutex<ObjectSession>>> {
        let mut map = self.object_sessions.lock().expect("lock poisoned");
        let oss = map.entry(ocfl_id.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(ObjectSession::new(
                ocfl_id.clone(),
                Arc::clone(&self.store),
                self.staging_dir.join(fs_safe(ocfl_id.as_str())),
                self.config.commit_mode_default,
            )))
        });
        Ok(Arc::clone(oss))
    }

    pub(crate) fn index_add(&self, rid: &ResourceId, mapping: OcflMapping) -> SessionResult<()> {
        let session_id = self.id.as_ref().ok_or(SessionError::ReadOnly)?;
        Ok(self.index.add(session_id, rid, mapping)?)
    }

    pub(crate) fn index_remove_by_root(&self, root: &ResourceId) -> SessionResult<()> {
        let session_id = self.id.as_ref().ok_or(SessionError::ReadOnly)?;
        Ok(self.index.remove_by_root(session_id, root)?)
    }

    /// Read and decode a resource's sidecar through its sub-session.
    pub(crate) fn read_headers_of(
        &self,
        mapping: &OcflMapping,
        rid: &ResourceId,
        version: Option<&VersionId>,
    ) -> SessionResult<ResourceHeaders> {
        let rel = relative_subpath(rid, mapping)?;
        let oss = self.object_session(&mapping.ocfl_object_id)?;
        let bytes = oss
            .lock()
            .expect("lock poisoned")
            .read(&sidecar_subpath(&rel), version)
            .map_err(|e| self.map_session_not_found(e, rid))?;
        decode_headers(&bytes)
    }

    // ---------------------------------------------------------------
    // Private helpers
    // ---------------------------------------------------------------

    fn read_body(
        &self,
        mapping: &OcflMapping,
        rid: &ResourceId,
        model: arca_types::InteractionModel,
        version: Option<&VersionId>,
    ) -> SessionResult<Vec<u8>> {
        let rel = relative_subpath(rid, mapping)?;
        let oss = self.object_session(&mapping.ocfl_object_id)?;
        let bytes = oss
            .lock()
            .expect("lock poisoned")
            .read(&body_subpath(&rel, model), version)
            .map_err(|e| self.map_session_not_found(e, rid))?;
        Ok(bytes)
    }

    /// Resolve a memento timestamp to the version in effect at that time.
    fn resolve_version(
        &self,
        mapping: &OcflMapping,
        rid: &ResourceId,
        version: Option<DateTime<Utc>>,
    ) -> SessionResult<Option<VersionId>> {
        let Some(memento) = version else {
            return Ok(None);
        };
        let versions = self
            .store
            .list_versions(&mapping.ocfl_object_id)
            .map_err(|e| self.map_not_found(e, rid))?;
        versions
            .iter()
            .rev()
            .find(|info| info.created <= memento)
            .map(|info| Some(info.version_id))
            .ok_or_else(|| SessionError::NotFound(rid.clone()))
    }

    /// Phase one: prepare everything before committing anything. The first
    /// failure marks the session `PrepareFailed` and names the object.
    fn prepare_all(
        &self,
        sessions: &[(OcflObjectId, Arc<Mutex<ObjectSession>>)],
    ) -> SessionResult<()> {
        for (ocfl_id, oss) in sessions {
            let result = oss.lock().expect("lock poisoned").prepare();
            if let Err(e) = result {
                self.set_state(SessionState::PrepareFailed);
                return Err(match e {
                    SessionError::Store(source) => SessionError::PrepareFailed {
                        ocfl_id: ocfl_id.clone(),
                        source,
                    },
                    other => other,
                });
            }
        }
        Ok(())
    }

    fn ensure_open(&self) -> SessionResult<()> {
        let state = *self.state.lock().expect("lock poisoned");
        if state != SessionState::Open {
            return Err(SessionError::SessionClosed(state));
        }
        Ok(())
    }

    fn set_state(&self, next: SessionState) {
        *self.state.lock().expect("lock poisoned") = next;
    }

    fn touch(&self) {
        *self.last_activity.lock().expect("lock poisoned") = Instant::now();
    }

    /// Snapshot the sub-session registry in ascending object-id order, so
    /// prepare and commit visit objects in the same deterministic sequence.
    fn snapshot_object_sessions(&self) -> Vec<(OcflObjectId, Arc<Mutex<ObjectSession>>)> {
        self.object_sessions
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|(id, oss)| (id.clone(), Arc::clone(oss)))
            .collect()
    }

    fn cleanup_staging(&self) {
        if self.staging_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.staging_dir) {
                warn!(
                    staging = %self.staging_dir.display(),
                    error = %e,
                    "failed to clean up session staging directory"
                );
            }
        }
    }

    fn display_id(&self) -> &str {
        self.id.as_ref().map(SessionId::as_str).unwrap_or("read-only")
    }

    fn map_not_found(&self, e: StoreError, rid: &ResourceId) -> SessionError {
        match e {
            StoreError::NotFound(_) => SessionError::NotFound(rid.clone()),
            other => SessionError::Store(other),
        }
    }

    fn map_session_not_found(&self, e: SessionError, rid: &ResourceId) -> SessionError {
        match e {
            SessionError::Store(StoreError::NotFound(_)) => SessionError::NotFound(rid.clone()),
            other => other,
        }
    }
}

impl fmt::Debug for StorageSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSession")
            .field("id", &self.display_id())
            .field("state", &self.state())
            .finish()
    }
}

/// Encode an id into a safe single path component.
pub(crate) fn fs_safe(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02x}")),
        }
    }
    out
}
