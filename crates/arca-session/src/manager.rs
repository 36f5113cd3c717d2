//! The process-wide session registry.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use arca_index::ResourceIndex;
use arca_store::OcflObjectStore;
use arca_types::SessionId;

use crate::config::RepositoryConfig;
use crate::error::SessionResult;
use crate::session::{fs_safe, SessionState, StorageSession};

/// Hands out storage sessions by transaction id.
///
/// A transaction id maps to at most one live session: concurrent
/// `write_session` calls for the same id observe the same instance, which
/// is safe for concurrent `persist` calls under the session's own rules.
/// Sessions left neither committed nor rolled back are reaped by
/// [`SessionManager::reap_orphans`].
pub struct SessionManager {
    config: RepositoryConfig,
    store: Arc<dyn OcflObjectStore>,
    index: Arc<dyn ResourceIndex>,
    sessions: Mutex<HashMap<SessionId, Arc<StorageSession>>>,
}

impl SessionManager {
    /// Create a manager over the given store and index.
    pub fn new(
        store: Arc<dyn OcflObjectStore>,
        index: Arc<dyn ResourceIndex>,
        config: RepositoryConfig,
    ) -> Self {
        Self {
            config,
            store,
            index,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The read-write session for a transaction id, creating it on first
    /// use.
    pub fn write_session(&self, id: &SessionId) -> SessionResult<Arc<StorageSession>> {
        let mut sessions = self.sessions.lock().expect("lock poisoned");
        if let Some(existing) = sessions.get(id) {
            return Ok(Arc::clone(existing));
        }
        let session = Arc::new(StorageSession::new(
            Some(id.clone()),
            Arc::clone(&self.store),
            Arc::clone(&self.index),
            self.config.clone(),
        ));
        sessions.insert(id.clone(), Arc::clone(&session));
        debug!(session = %id, "created write session");
        Ok(session)
    }

    /// A transient read-only session. Never registered, never staged.
    pub fn read_only_session(&self) -> Arc<StorageSession> {
        Arc::new(StorageSession::new(
            None,
            Arc::clone(&self.store),
            Arc::clone(&self.index),
            self.config.clone(),
        ))
    }

    /// Drop a session from the registry (e.g. after commit or rollback).
    pub fn remove(&self, id: &SessionId) {
        self.sessions.lock().expect("lock poisoned").remove(id);
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().expect("lock poisoned").len()
    }

    /// Returns `true` if no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reap abandoned sessions and stray staging directories.
    ///
    /// A session is abandoned when it has been idle longer than the
    /// configured orphan timeout. Open sessions are rolled back
    /// best-effort; sessions in terminal states are simply dropped.
    /// Staging directories with no live session are deleted. Returns the
    /// number of sessions reaped.
    pub fn reap_orphans(&self) -> usize {
        let timeout = self.config.orphan_session_timeout;
        let expired: Vec<(SessionId, Arc<StorageSession>)> = {
            let mut sessions = self.sessions.lock().expect("lock poisoned");
            let expired_ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, s)| s.idle_for() > timeout || is_terminal(s.state()))
                .map(|(id, _)| id.clone())
                .collect();
            expired_ids
                .into_iter()
                .filter_map(|id| sessions.remove(&id).map(|s| (id, s)))
                .collect()
        };

        let mut reaped = 0;
        for (id, session) in expired {
            if session.state() == SessionState::Open {
                if let Err(e) = session.rollback() {
                    warn!(session = %id, error = %e, "failed to roll back orphaned session");
                }
            }
            info!(session = %id, "reaped orphaned session");
            reaped += 1;
        }

        self.sweep_staging_root();
        reaped
    }

    /// Delete staging directories that belong to no live session.
    fn sweep_staging_root(&self) {
        let root = &self.config.session_staging_root;
        let Ok(entries) = fs::read_dir(root) else {
            return;
        };
        let live: Vec<String> = {
            let sessions = self.sessions.lock().expect("lock poisoned");
            sessions
                .values()
                .filter_map(|s| s.id().map(|id| id.as_str().to_string()))
                .collect()
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let owned = live.iter().any(|id| fs_safe(id) == name);
            if !owned {
                if let Err(e) = fs::remove_dir_all(entry.path()) {
                    warn!(path = %entry.path().display(), error = %e,
                          "failed to remove stray staging directory");
                }
            }
        }
    }
}

fn is_terminal(state: SessionState) -> bool {
    matches!(
        state,
        SessionState::Committed | SessionState::RolledBack | SessionState::RollbackFailed
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::TempDir;

    use arca_index::MemoryResourceIndex;
    use arca_store::MemoryOcflStore;
    use arca_types::ResourceId;

    use crate::ops::ResourceOperation;

    struct Fixture {
        _staging: TempDir,
        manager: SessionManager,
    }

    impl Fixture {
        fn new(orphan_timeout: Duration) -> Self {
            let staging = TempDir::new().unwrap();
            let config = RepositoryConfig::default()
                .with_staging_root(staging.path())
                .with_orphan_session_timeout(orphan_timeout);
            let manager = SessionManager::new(
                Arc::new(MemoryOcflStore::default()),
                Arc::new(MemoryResourceIndex::new()),
                config,
            );
            Self {
                _staging: staging,
                manager,
            }
        }
    }

    fn create_op(id: &str) -> ResourceOperation {
        ResourceOperation::create_rdf(ResourceId::new(id).unwrap())
            .triples(b"<> a <#Container> .".to_vec())
            .build()
    }

    #[test]
    fn same_id_returns_same_session() {
        let fx = Fixture::new(Duration::from_secs(3600));
        let id = SessionId::new("tx-1");

        let a = fx.manager.write_session(&id).unwrap();
        let b = fx.manager.write_session(&id).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(fx.manager.len(), 1);

        fx.manager.remove(&id);
        assert!(fx.manager.is_empty());
        let c = fx.manager.write_session(&id).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn read_only_sessions_are_transient() {
        let fx = Fixture::new(Duration::from_secs(3600));
        let session = fx.manager.read_only_session();
        assert!(session.is_read_only());
        assert!(fx.manager.is_empty());
    }

    #[test]
    fn reap_rolls_back_idle_open_sessions() {
        let fx = Fixture::new(Duration::from_millis(20));
        let id = SessionId::new("tx-1");

        let session = fx.manager.write_session(&id).unwrap();
        session.persist(create_op("lonely")).unwrap();

        std::thread::sleep(Duration::from_millis(50));
        let reaped = fx.manager.reap_orphans();

        assert_eq!(reaped, 1);
        assert!(fx.manager.is_empty());
        assert_eq!(session.state(), crate::session::SessionState::RolledBack);
    }

    #[test]
    fn reap_drops_terminated_sessions_immediately() {
        let fx = Fixture::new(Duration::from_secs(3600));
        let id = SessionId::new("tx-1");

        let session = fx.manager.write_session(&id).unwrap();
        session.persist(create_op("thing")).unwrap();
        session.commit().unwrap();

        assert_eq!(fx.manager.reap_orphans(), 1);
        assert!(fx.manager.is_empty());
    }

    #[test]
    fn reap_sweeps_stray_staging_directories() {
        let fx = Fixture::new(Duration::from_secs(3600));
        let stray = fx._staging.path().join("stale-session");
        fs::create_dir_all(&stray).unwrap();

        fx.manager.reap_orphans();
        assert!(!stray.exists());
    }
}
