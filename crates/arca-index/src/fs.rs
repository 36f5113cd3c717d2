//! File-backed index that survives restarts.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use arca_types::{ResourceId, SessionId};

use crate::delta::Delta;
use crate::error::{IndexError, IndexResult};
use crate::mapping::OcflMapping;
use crate::traits::ResourceIndex;

/// On-disk shape of the persisted index.
#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    mappings: HashMap<ResourceId, OcflMapping>,
}

/// Resource index persisted as a JSON file.
///
/// The whole map is loaded at open and rewritten (write-to-temp + atomic
/// rename) on every session commit. Suitable for repositories whose mapping
/// count fits comfortably in memory; larger deployments would swap in a
/// database-backed implementation of [`ResourceIndex`].
pub struct FsResourceIndex {
    path: PathBuf,
    committed: RwLock<HashMap<ResourceId, OcflMapping>>,
    deltas: Mutex<HashMap<SessionId, Delta>>,
}

impl FsResourceIndex {
    /// Open the index at `path`, loading any existing content.
    pub fn open(path: impl Into<PathBuf>) -> IndexResult<Self> {
        let path = path.into();
        let mappings = if path.is_file() {
            let bytes = fs::read(&path)?;
            let file: IndexFile = serde_json::from_slice(&bytes)
                .map_err(|e| IndexError::Serialization(e.to_string()))?;
            file.mappings
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), mappings = mappings.len(), "opened index");
        Ok(Self {
            path,
            committed: RwLock::new(mappings),
            deltas: Mutex::new(HashMap::new()),
        })
    }

    /// The index file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of committed mappings.
    pub fn len(&self) -> usize {
        self.committed.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no mappings have been committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, mappings: &HashMap<ResourceId, OcflMapping>) -> IndexResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = IndexFile {
            mappings: mappings.clone(),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| IndexError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ResourceIndex for FsResourceIndex {
    fn get(&self, session: Option<&SessionId>, rid: &ResourceId) -> IndexResult<OcflMapping> {
        let committed = self.committed.read().expect("lock poisoned");
        if let Some(session) = session {
            let deltas = self.deltas.lock().expect("lock poisoned");
            if let Some(delta) = deltas.get(session) {
                if let Some(resolved) = delta.resolve(rid, &committed) {
                    return resolved.ok_or_else(|| IndexError::NotMapped(rid.clone()));
                }
            }
        }
        committed
            .get(rid)
            .cloned()
            .ok_or_else(|| IndexError::NotMapped(rid.clone()))
    }

    fn add(&self, session: &SessionId, rid: &ResourceId, mapping: OcflMapping) -> IndexResult<()> {
        let mut deltas = self.deltas.lock().expect("lock poisoned");
        deltas
            .entry(session.clone())
            .or_default()
            .add(rid.clone(), mapping);
        Ok(())
    }

    fn remove(&self, session: &SessionId, rid: &ResourceId) -> IndexResult<()> {
        let mut deltas = self.deltas.lock().expect("lock poisoned");
        deltas.entry(session.clone()).or_default().remove(rid.clone());
        Ok(())
    }

    fn remove_by_root(&self, session: &SessionId, root: &ResourceId) -> IndexResult<()> {
        let mut deltas = self.deltas.lock().expect("lock poisoned");
        deltas
            .entry(session.clone())
            .or_default()
            .remove_by_root(root.clone());
        Ok(())
    }

    fn commit(&self, session: &SessionId) -> IndexResult<()> {
        let delta = {
            let mut deltas = self.deltas.lock().expect("lock poisoned");
            deltas.remove(session)
        };
        if let Some(delta) = delta {
            let mut committed = self.committed.write().expect("lock poisoned");
            delta.apply(&mut committed);
            self.persist(&committed)?;
            debug!(session = %session, mappings = committed.len(), "committed index delta");
        }
        Ok(())
    }

    fn rollback(&self, session: &SessionId) -> IndexResult<()> {
        let mut deltas = self.deltas.lock().expect("lock poisoned");
        deltas.remove(session);
        Ok(())
    }
}
