//! In-memory index for tests and embedding.

use std::collections::HashMap;
use std::sync::RwLock;

use arca_types::{ResourceId, SessionId};

use crate::delta::Delta;
use crate::error::{IndexError, IndexResult};
use crate::mapping::OcflMapping;
use crate::traits::ResourceIndex;

/// `HashMap`-based resource index.
///
/// The committed map and the per-session deltas live behind separate locks
/// so readers of committed state do not contend with sessions staging
/// changes.
#[derive(Default)]
pub struct MemoryResourceIndex {
    committed: RwLock<HashMap<ResourceId, OcflMapping>>,
    deltas: RwLock<HashMap<SessionId, Delta>>,
}

impl MemoryResourceIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed mappings.
    pub fn len(&self) -> usize {
        self.committed.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no mappings have been committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceIndex for MemoryResourceIndex {
    fn get(&self, session: Option<&SessionId>, rid: &ResourceId) -> IndexResult<OcflMapping> {
        let committed = self.committed.read().expect("lock poisoned");
        if let Some(session) = session {
            let deltas = self.deltas.read().expect("lock poisoned");
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
        let mut deltas = self.deltas.write().expect("lock poisoned");
        deltas
            .entry(session.clone())
            .or_default()
            .add(rid.clone(), mapping);
        Ok(())
    }

    fn remove(&self, session: &SessionId, rid: &ResourceId) -> IndexResult<()> {
        let mut deltas = self.deltas.write().expect("lock poisoned");
        deltas.entry(session.clone()).or_default().remove(rid.clone());
        Ok(())
    }

    fn remove_by_root(&self, session: &SessionId, root: &ResourceId) -> IndexResult<()> {
        let mut deltas = self.deltas.write().expect("lock poisoned");
        deltas
            .entry(session.clone())
            .or_default()
            .remove_by_root(root.clone());
        Ok(())
    }

    fn commit(&self, session: &SessionId) -> IndexResult<()> {
        let delta = {
            let mut deltas = self.deltas.write().expect("lock poisoned");
            deltas.remove(session)
        };
        if let Some(delta) = delta {
            let mut committed = self.committed.write().expect("lock poisoned");
            delta.apply(&mut committed);
        }
        Ok(())
    }

    fn rollback(&self, session: &SessionId) -> IndexResult<()> {
        let mut deltas = self.deltas.write().expect("lock poisoned");
        deltas.remove(session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(s: &str) -> ResourceId {
        ResourceId::new(s).unwrap()
    }

    #[test]
    fn pending_adds_are_session_private() {
        let index = MemoryResourceIndex::new();
        let s1 = SessionId::new("s1");
        let s2 = SessionId::new("s2");
        let r = rid("res");

        index.add(&s1, &r, OcflMapping::atomic(&r)).unwrap();

        // Visible to the staging session.
        assert!(index.get(Some(&s1), &r).is_ok());
        // Invisible to other sessions and to committed-only readers.
        assert!(index.get(Some(&s2), &r).is_err());
        assert!(index.get(None, &r).is_err());
    }

    #[test]
    fn commit_publishes_delta() {
        let index = MemoryResourceIndex::new();
        let s1 = SessionId::new("s1");
        let r = rid("res");

        index.add(&s1, &r, OcflMapping::atomic(&r)).unwrap();
        index.commit(&s1).unwrap();

        assert!(index.get(None, &r).is_ok());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn rollback_discards_delta() {
        let index = MemoryResourceIndex::new();
        let s1 = SessionId::new("s1");
        let r = rid("res");

        index.add(&s1, &r, OcflMapping::atomic(&r)).unwrap();
        index.rollback(&s1).unwrap();

        assert!(index.get(Some(&s1), &r).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn pending_removal_hides_committed_entry() {
        let index = MemoryResourceIndex::new();
        let s1 = SessionId::new("s1");
        let r = rid("res");

        index.add(&s1, &r, OcflMapping::atomic(&r)).unwrap();
        index.commit(&s1).unwrap();

        let s2 = SessionId::new("s2");
        index.remove(&s2, &r).unwrap();
        assert!(index.get(Some(&s2), &r).is_err());
        // Still visible outside the removing session until it commits.
        assert!(index.get(None, &r).is_ok());

        index.commit(&s2).unwrap();
        assert!(index.get(None, &r).is_err());
    }
}
