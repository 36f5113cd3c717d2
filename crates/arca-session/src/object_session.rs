//! Per-object staging workspaces.
//!
//! An [`ObjectSession`] accumulates every change one storage session makes
//! to one OCFL object: staged file writes (bytes parked in the session's
//! staging directory), staged deletes, an optional promotion to a new
//! version, and an optional purge. At commit time the collapsed pending set
//! becomes a [`Changeset`] handed to the store's two-phase prepare/commit.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use arca_store::{Changeset, CommitMode, OcflObjectStore, StagedFile, StoreError};
use arca_types::{ContentDigest, OcflObjectId, VersionId};

use crate::error::{SessionError, SessionResult};

/// Lifecycle of an object sub-session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OssState {
    Open,
    Prepared,
    Committed,
    Closed,
}

/// One staged change at a subpath. Staging order collapses per path:
/// a later write replaces an earlier write, a delete discards an earlier
/// write, and a write cancels an earlier delete.
#[derive(Debug)]
enum PendingOp {
    Write(StagedFile),
    Delete,
}

/// The staging workspace for one OCFL object within one storage session.
pub struct ObjectSession {
    ocfl_id: OcflObjectId,
    store: Arc<dyn OcflObjectStore>,
    staging_dir: PathBuf,
    commit_mode: CommitMode,
    pending: BTreeMap<String, PendingOp>,
    /// Commit as a new version regardless of the session's default mode.
    promote: bool,
    /// Remove the whole object at commit.
    purge: bool,
    state: OssState,
}

impl ObjectSession {
    pub(crate) fn new(
        ocfl_id: OcflObjectId,
        store: Arc<dyn OcflObjectStore>,
        staging_dir: PathBuf,
        commit_mode: CommitMode,
    ) -> Self {
        Self {
            ocfl_id,
            store,
            staging_dir,
            commit_mode,
            pending: BTreeMap::new(),
            promote: false,
            purge: false,
            state: OssState::Open,
        }
    }

    /// The object this sub-session stages changes for.
    pub fn ocfl_id(&self) -> &OcflObjectId {
        &self.ocfl_id
    }

    /// The current lifecycle state.
    pub fn state(&self) -> OssState {
        self.state
    }

    /// The mode this sub-session will commit under.
    pub fn effective_mode(&self) -> CommitMode {
        if self.promote {
            CommitMode::NewVersion
        } else {
            self.commit_mode
        }
    }

    /// Returns `true` if any work is staged.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || self.purge || self.promote
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.state != OssState::Open {
            return Err(SessionError::InvalidState(format!(
                "object session for <{}> is {:?}",
                self.ocfl_id, self.state
            )));
        }
        Ok(())
    }

    /// Stage bytes at `subpath`, replacing any earlier staged write there.
    pub fn stage_write(
        &mut self,
        subpath: &str,
        bytes: &[u8],
        digest: Option<ContentDigest>,
    ) -> SessionResult<()> {
        self.ensure_open()?;

        let path = self.staging_dir.join(subpath);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;

        self.pending.insert(
            subpath.to_string(),
            PendingOp::Write(StagedFile {
                path,
                size: bytes.len() as u64,
                digest,
            }),
        );
        Ok(())
    }

    /// Stage removal of `subpath`, discarding any earlier staged write.
    pub fn stage_delete(&mut self, subpath: &str) -> SessionResult<()> {
        self.ensure_open()?;

        if let Some(PendingOp::Write(staged)) =
            self.pending.insert(subpath.to_string(), PendingOp::Delete)
        {
            // The staged bytes will never be committed.
            let _ = fs::remove_file(staged.path);
        }
        Ok(())
    }

    /// Stage removal of every head path under `prefix` (staged writes
    /// included).
    pub fn stage_delete_tree(&mut self, prefix: &str) -> SessionResult<()> {
        self.ensure_open()?;
        let subtree = format!("{prefix}/");
        for path in self.head_paths()? {
            if path.starts_with(&subtree) {
                self.stage_delete(&path)?;
            }
        }
        Ok(())
    }

    /// Read `subpath`: staged bytes when present and unversioned, else the
    /// store.
    pub fn read(&self, subpath: &str, version: Option<&VersionId>) -> SessionResult<Vec<u8>> {
        if version.is_none() {
            match self.pending.get(subpath) {
                Some(PendingOp::Write(staged)) => return Ok(fs::read(&staged.path)?),
                Some(PendingOp::Delete) => {
                    return Err(SessionError::Store(StoreError::NotFound(format!(
                        "{}/{subpath}",
                        self.ocfl_id
                    ))))
                }
                None => {}
            }
        }
        Ok(self.store.read(&self.ocfl_id, subpath, version)?)
    }

    /// The head-view paths of the object with pending ops applied.
    pub fn head_paths(&self) -> SessionResult<BTreeSet<String>> {
        let mut paths: BTreeSet<String> = match self.store.paths_at(&self.ocfl_id, None) {
            Ok(map) => map.into_keys().collect(),
            Err(StoreError::NotFound(_)) => BTreeSet::new(),
            Err(e) => return Err(e.into()),
        };
        for (subpath, op) in &self.pending {
            match op {
                PendingOp::Write(_) => {
                    paths.insert(subpath.clone());
                }
                PendingOp::Delete => {
                    paths.remove(subpath);
                }
            }
        }
        Ok(paths)
    }

    /// Commit this sub-session as a new version regardless of the default
    /// mode.
    pub fn promote_on_commit(&mut self) {
        self.promote = true;
    }

    /// Remove the whole object at commit.
    pub fn request_purge(&mut self) {
        self.purge = true;
    }

    /// Validate and materialize the pending set in the store.
    pub fn prepare(&mut self) -> SessionResult<()> {
        self.ensure_open()?;

        if !self.purge && self.has_work() {
            let mut changeset = Changeset::default();
            for (subpath, op) in &self.pending {
                match op {
                    PendingOp::Write(staged) => {
                        changeset.writes.insert(subpath.clone(), staged.clone());
                    }
                    PendingOp::Delete => {
                        changeset.deletes.insert(subpath.clone());
                    }
                }
            }
            self.store.prepare(&self.ocfl_id, &changeset)?;
        }

        self.state = OssState::Prepared;
        debug!(object = %self.ocfl_id, ops = self.pending.len(), "object session prepared");
        Ok(())
    }

    /// Promote the prepared set. Returns the commit mode used, or `None`
    /// when there was nothing to commit.
    pub fn commit(&mut self) -> SessionResult<Option<CommitMode>> {
        if self.state != OssState::Prepared {
            return Err(SessionError::InvalidState(format!(
                "cannot commit object session for <{}> in {:?} state",
                self.ocfl_id, self.state
            )));
        }

        let outcome = if self.purge {
            self.store.purge(&self.ocfl_id)?;
            Some(self.effective_mode())
        } else if self.has_work() {
            let mode = self.effective_mode();
            self.store.commit(&self.ocfl_id, mode)?;
            Some(mode)
        } else {
            None
        };

        self.state = OssState::Committed;
        Ok(outcome)
    }

    /// Release the sub-session: abort any prepared-but-uncommitted work and
    /// drop the staging subtree. Safe to call in any state; idempotent.
    pub fn close(&mut self) -> SessionResult<()> {
        if matches!(self.state, OssState::Open | OssState::Prepared) {
            self.store.abort(&self.ocfl_id)?;
        }
        self.pending.clear();
        if self.staging_dir.exists() {
            fs::remove_dir_all(&self.staging_dir)?;
        }
        self.state = OssState::Closed;
        Ok(())
    }

    /// Whether prepare/commit has store work to do (purges aside).
    fn has_work(&self) -> bool {
        !self.pending.is_empty() || self.promote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arca_store::MemoryOcflStore;
    use tempfile::TempDir;

    struct Fixture {
        _staging: TempDir,
        store: Arc<MemoryOcflStore>,
    }

    impl Fixture {
        fn new() -> (Self, ObjectSession) {
            let staging = TempDir::new().unwrap();
            let store = Arc::new(MemoryOcflStore::default());
            let oss = ObjectSession::new(
                OcflObjectId::from("obj"),
                Arc::clone(&store) as Arc<dyn OcflObjectStore>,
                staging.path().join("obj"),
                CommitMode::MutableHead,
            );
            (
                Self {
                    _staging: staging,
                    store,
                },
                oss,
            )
        }
    }

    #[test]
    fn write_then_read_staged() {
        let (_fx, mut oss) = Fixture::new();
        oss.stage_write("a.nt", b"staged", None).unwrap();

        assert!(oss.has_pending());
        assert_eq!(oss.read("a.nt", None).unwrap(), b"staged");
    }

    #[test]
    fn write_then_delete_collapses() {
        let (_fx, mut oss) = Fixture::new();
        oss.stage_write("a.nt", b"staged", None).unwrap();
        oss.stage_delete("a.nt").unwrap();

        assert!(oss.read("a.nt", None).is_err());
        assert!(!oss.head_paths().unwrap().contains("a.nt"));
    }

    #[test]
    fn last_write_wins() {
        let (_fx, mut oss) = Fixture::new();
        oss.stage_write("a.nt", b"first", None).unwrap();
        oss.stage_write("a.nt", b"second", None).unwrap();
        assert_eq!(oss.read("a.nt", None).unwrap(), b"second");
    }

    #[test]
    fn commit_mutable_head() {
        let (fx, mut oss) = Fixture::new();
        oss.stage_write("a.nt", b"bytes", None).unwrap();

        oss.prepare().unwrap();
        let mode = oss.commit().unwrap();
        assert_eq!(mode, Some(CommitMode::MutableHead));
        assert!(fx.store.has_staged_changes(oss.ocfl_id()).unwrap());
    }

    #[test]
    fn empty_session_commits_nothing() {
        let (fx, mut oss) = Fixture::new();
        oss.prepare().unwrap();
        assert_eq!(oss.commit().unwrap(), None);
        assert!(!fx.store.contains(oss.ocfl_id()).unwrap());
    }

    #[test]
    fn promote_switches_mode() {
        let (fx, mut oss) = Fixture::new();
        oss.stage_write("a.nt", b"bytes", None).unwrap();
        oss.promote_on_commit();

        assert_eq!(oss.effective_mode(), CommitMode::NewVersion);
        oss.prepare().unwrap();
        assert_eq!(oss.commit().unwrap(), Some(CommitMode::NewVersion));
        assert_eq!(fx.store.list_versions(oss.ocfl_id()).unwrap().len(), 1);
    }

    #[test]
    fn lifecycle_is_enforced() {
        let (_fx, mut oss) = Fixture::new();
        assert!(oss.commit().is_err());

        oss.prepare().unwrap();
        assert!(oss.stage_write("a.nt", b"late", None).is_err());
        assert!(oss.prepare().is_err());
    }

    #[test]
    fn close_aborts_prepared_work() {
        let (fx, mut oss) = Fixture::new();
        oss.stage_write("a.nt", b"bytes", None).unwrap();
        oss.prepare().unwrap();

        oss.close().unwrap();
        assert_eq!(oss.state(), OssState::Closed);
        // The prepared changeset was discarded; the object never appeared.
        assert!(!fx.store.contains(oss.ocfl_id()).unwrap());
        // Idempotent.
        oss.close().unwrap();
    }

    #[test]
    fn delete_tree_removes_member_paths() {
        let (fx, mut oss) = Fixture::new();
        oss.stage_write("child/fcr-container.nt", b"c", None).unwrap();
        oss.stage_write("child/fcr-headers.json", b"h", None).unwrap();
        oss.stage_write("fcr-container.nt", b"root", None).unwrap();
        oss.prepare().unwrap();
        oss.commit().unwrap();

        let mut oss2 = ObjectSession::new(
            OcflObjectId::from("obj"),
            Arc::clone(&fx.store) as Arc<dyn OcflObjectStore>,
            fx._staging.path().join("obj2"),
            CommitMode::MutableHead,
        );
        oss2.stage_delete_tree("child").unwrap();

        let paths = oss2.head_paths().unwrap();
        assert!(paths.contains("fcr-container.nt"));
        assert!(!paths.iter().any(|p| p.starts_with("child/")));
    }
}
