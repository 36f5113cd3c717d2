//! In-memory, HashMap-based object store.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::RwLock;

use chrono::Utc;

use arca_types::{ContentDigest, DigestAlgorithm, OcflObjectId, VersionId};

use crate::changeset::Changeset;
use crate::error::{StoreError, StoreResult};
use crate::inventory::Inventory;
use crate::traits::{CommitMode, OcflObjectStore, OcflVersionInfo};

/// The mutable-head shadow of one object: an overwritable path -> digest
/// view layered over the committed versions.
#[derive(Clone, Debug, Default)]
struct MutableHead {
    paths: BTreeMap<String, String>,
}

/// A prepared-but-uncommitted changeset.
#[derive(Debug)]
struct PreparedSet {
    /// Subpath -> (digest, bytes).
    writes: BTreeMap<String, (String, Vec<u8>)>,
    deletes: Vec<String>,
}

#[derive(Debug, Default)]
struct ObjectState {
    inventory: Option<Inventory>,
    /// Content bytes keyed by digest.
    files: HashMap<String, Vec<u8>>,
    head: Option<MutableHead>,
    pending: Option<PreparedSet>,
}

impl ObjectState {
    fn exists(&self) -> bool {
        self.inventory.is_some() || self.head.is_some()
    }

    /// The head view: mutable head if present, else the latest version.
    fn head_paths(&self) -> BTreeMap<String, String> {
        if let Some(head) = &self.head {
            return head.paths.clone();
        }
        match &self.inventory {
            Some(inv) if !inv.is_empty() => {
                inv.head_entry().map(|e| e.path_digests()).unwrap_or_default()
            }
            _ => BTreeMap::new(),
        }
    }
}

/// In-memory object store for tests and embedding.
///
/// All objects are held behind a `RwLock`. Observable semantics match
/// [`crate::FsOcflStore`], including the prepared state, the mutable head,
/// and version reverting.
pub struct MemoryOcflStore {
    digest_algorithm: DigestAlgorithm,
    objects: RwLock<HashMap<OcflObjectId, ObjectState>>,
}

impl MemoryOcflStore {
    /// Create an empty store using the given manifest digest algorithm.
    pub fn new(digest_algorithm: DigestAlgorithm) -> Self {
        Self {
            digest_algorithm,
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects (committed or staged) in the store.
    pub fn len(&self) -> usize {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .filter(|s| s.exists())
            .count()
    }

    /// Returns `true` if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryOcflStore {
    fn default() -> Self {
        Self::new(DigestAlgorithm::Sha512)
    }
}

impl OcflObjectStore for MemoryOcflStore {
    fn contains(&self, id: &OcflObjectId) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(id).is_some_and(ObjectState::exists))
    }

    fn has_staged_changes(&self, id: &OcflObjectId) -> StoreResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(id).is_some_and(|s| s.head.is_some()))
    }

    fn read(
        &self,
        id: &OcflObjectId,
        subpath: &str,
        version: Option<&VersionId>,
    ) -> StoreResult<Vec<u8>> {
        let map = self.objects.read().expect("lock poisoned");
        let state = map
            .get(id)
            .filter(|s| s.exists())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let digest = match version {
            Some(v) => {
                let inv = state
                    .inventory
                    .as_ref()
                    .ok_or_else(|| StoreError::NotFound(format!("{id}/{v}")))?;
                inv.version_entry(v)?
                    .path_digests()
                    .get(subpath)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound(format!("{id}/{v}/{subpath}")))?
            }
            None => state
                .head_paths()
                .get(subpath)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("{id}/{subpath}")))?,
        };

        state
            .files
            .get(&digest)
            .cloned()
            .ok_or_else(|| StoreError::Corrupt {
                id: id.clone(),
                reason: format!("no content for digest {digest}"),
            })
    }

    fn paths_at(
        &self,
        id: &OcflObjectId,
        version: Option<&VersionId>,
    ) -> StoreResult<BTreeMap<String, String>> {
        let map = self.objects.read().expect("lock poisoned");
        let state = map
            .get(id)
            .filter(|s| s.exists())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        match version {
            Some(v) => {
                let inv = state
                    .inventory
                    .as_ref()
                    .ok_or_else(|| StoreError::NotFound(format!("{id}/{v}")))?;
                Ok(inv.version_entry(v)?.path_digests())
            }
            None => Ok(state.head_paths()),
        }
    }

    fn list_versions(&self, id: &OcflObjectId) -> StoreResult<Vec<OcflVersionInfo>> {
        let map = self.objects.read().expect("lock poisoned");
        let state = map
            .get(id)
            .filter(|s| s.exists())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        Ok(state
            .inventory
            .iter()
            .flat_map(|inv| {
                inv.versions.iter().map(|(v, e)| OcflVersionInfo {
                    version_id: *v,
                    created: e.created,
                })
            })
            .collect())
    }

    fn prepare(&self, id: &OcflObjectId, changeset: &Changeset) -> StoreResult<()> {
        let mut map = self.objects.write().expect("lock poisoned");
        let state = map.entry(id.clone()).or_default();

        if state.pending.is_some() {
            return Err(StoreError::Locked(id.clone()));
        }

        let mut writes = BTreeMap::new();
        for (subpath, staged) in &changeset.writes {
            let bytes = fs::read(&staged.path)?;
            if let Some(expected) = &staged.digest {
                if !expected.matches(&bytes) {
                    return Err(StoreError::DigestMismatch {
                        subpath: subpath.clone(),
                        expected: expected.value.clone(),
                        computed: ContentDigest::compute(expected.algorithm, &bytes).value,
                    });
                }
            }
            let digest = ContentDigest::compute(self.digest_algorithm, &bytes).value;
            writes.insert(subpath.clone(), (digest, bytes));
        }

        state.pending = Some(PreparedSet {
            writes,
            deletes: changeset.deletes.iter().cloned().collect(),
        });
        Ok(())
    }

    fn commit(&self, id: &OcflObjectId, mode: CommitMode) -> StoreResult<()> {
        let mut map = self.objects.write().expect("lock poisoned");
        let state = map
            .get_mut(id)
            .ok_or_else(|| StoreError::Conflict {
                id: id.clone(),
                reason: "nothing prepared".into(),
            })?;
        let pending = state.pending.take().ok_or_else(|| StoreError::Conflict {
            id: id.clone(),
            reason: "nothing prepared".into(),
        })?;

        // The merged head view: current head state, deletes removed, writes
        // applied.
        let mut paths = state.head_paths();
        for path in &pending.deletes {
            paths.remove(path);
        }
        let mut write_digests: BTreeMap<String, String> = BTreeMap::new();
        for (subpath, (digest, bytes)) in pending.writes {
            state.files.insert(digest.clone(), bytes);
            paths.insert(subpath.clone(), digest.clone());
            write_digests.insert(subpath, digest);
        }

        match mode {
            CommitMode::MutableHead => {
                state.head = Some(MutableHead { paths });
            }
            CommitMode::NewVersion => {
                state.head = None;
                let inv = state.inventory.get_or_insert_with(|| {
                    Inventory::new(id.clone(), self.digest_algorithm)
                });
                inv.record_version(Utc::now(), &paths, &write_digests);
            }
        }
        Ok(())
    }

    fn abort(&self, id: &OcflObjectId) -> StoreResult<()> {
        let mut map = self.objects.write().expect("lock poisoned");
        if let Some(state) = map.get_mut(id) {
            state.pending = None;
            if !state.exists() {
                map.remove(id);
            }
        }
        Ok(())
    }

    fn revert_to_previous_version(&self, id: &OcflObjectId) -> StoreResult<()> {
        let mut map = self.objects.write().expect("lock poisoned");
        let state = map
            .get_mut(id)
            .filter(|s| s.exists())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let inv = state.inventory.as_mut().ok_or_else(|| StoreError::Conflict {
            id: id.clone(),
            reason: "no committed versions to revert".into(),
        })?;
        if inv.drop_head_version()?.is_none() {
            map.remove(id);
        }
        Ok(())
    }

    fn purge(&self, id: &OcflObjectId) -> StoreResult<()> {
        let mut map = self.objects.write().expect("lock poisoned");
        map.remove(id)
            .filter(|s| s.exists())
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::StagedFile;
    use std::io::Write;
    use tempfile::TempDir;

    fn stage(dir: &TempDir, name: &str, bytes: &[u8]) -> StagedFile {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        StagedFile {
            path,
            size: bytes.len() as u64,
            digest: None,
        }
    }

    fn changeset(dir: &TempDir, files: &[(&str, &[u8])]) -> Changeset {
        let mut cs = Changeset::default();
        for (i, (subpath, bytes)) in files.iter().enumerate() {
            cs.writes
                .insert(subpath.to_string(), stage(dir, &format!("staged-{i}"), bytes));
        }
        cs
    }

    #[test]
    fn prepare_commit_new_version() {
        let dir = TempDir::new().unwrap();
        let store = MemoryOcflStore::default();
        let id = OcflObjectId::from("obj");

        assert!(!store.contains(&id).unwrap());
        store.prepare(&id, &changeset(&dir, &[("a.nt", b"alpha")])).unwrap();
        // Prepared but not committed: still invisible.
        assert!(!store.contains(&id).unwrap());

        store.commit(&id, CommitMode::NewVersion).unwrap();
        assert!(store.contains(&id).unwrap());
        assert!(!store.has_staged_changes(&id).unwrap());
        assert_eq!(store.read(&id, "a.nt", None).unwrap(), b"alpha");
        assert_eq!(store.list_versions(&id).unwrap().len(), 1);
    }

    #[test]
    fn mutable_head_shadows_versions() {
        let dir = TempDir::new().unwrap();
        let store = MemoryOcflStore::default();
        let id = OcflObjectId::from("obj");

        store.prepare(&id, &changeset(&dir, &[("a.nt", b"v1")])).unwrap();
        store.commit(&id, CommitMode::NewVersion).unwrap();

        store.prepare(&id, &changeset(&dir, &[("a.nt", b"staged")])).unwrap();
        store.commit(&id, CommitMode::MutableHead).unwrap();

        assert!(store.has_staged_changes(&id).unwrap());
        // Head read sees the mutable head; versioned read sees v1.
        assert_eq!(store.read(&id, "a.nt", None).unwrap(), b"staged");
        assert_eq!(store.read(&id, "a.nt", Some(&VersionId::V1)).unwrap(), b"v1");
    }

    #[test]
    fn promote_head_to_version() {
        let dir = TempDir::new().unwrap();
        let store = MemoryOcflStore::default();
        let id = OcflObjectId::from("obj");

        store.prepare(&id, &changeset(&dir, &[("a.nt", b"head")])).unwrap();
        store.commit(&id, CommitMode::MutableHead).unwrap();
        assert!(store.has_staged_changes(&id).unwrap());
        assert!(store.list_versions(&id).unwrap().is_empty());

        // Promote with an empty changeset.
        store.prepare(&id, &Changeset::default()).unwrap();
        store.commit(&id, CommitMode::NewVersion).unwrap();

        assert!(!store.has_staged_changes(&id).unwrap());
        let versions = store.list_versions(&id).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(store.read(&id, "a.nt", Some(&VersionId::V1)).unwrap(), b"head");
    }

    #[test]
    fn deletes_drop_paths_from_head() {
        let dir = TempDir::new().unwrap();
        let store = MemoryOcflStore::default();
        let id = OcflObjectId::from("obj");

        store
            .prepare(&id, &changeset(&dir, &[("a.nt", b"x"), ("b.nt", b"y")]))
            .unwrap();
        store.commit(&id, CommitMode::NewVersion).unwrap();

        let mut cs = Changeset::default();
        cs.deletes.insert("a.nt".into());
        store.prepare(&id, &cs).unwrap();
        store.commit(&id, CommitMode::NewVersion).unwrap();

        assert!(store.read(&id, "a.nt", None).is_err());
        assert_eq!(store.read(&id, "b.nt", None).unwrap(), b"y");
        // Historical version still has it.
        assert_eq!(store.read(&id, "a.nt", Some(&VersionId::V1)).unwrap(), b"x");
    }

    #[test]
    fn double_prepare_is_locked() {
        let dir = TempDir::new().unwrap();
        let store = MemoryOcflStore::default();
        let id = OcflObjectId::from("obj");

        store.prepare(&id, &changeset(&dir, &[("a.nt", b"x")])).unwrap();
        let err = store.prepare(&id, &changeset(&dir, &[("b.nt", b"y")])).unwrap_err();
        assert!(matches!(err, StoreError::Locked(_)));

        store.abort(&id).unwrap();
        store.prepare(&id, &changeset(&dir, &[("b.nt", b"y")])).unwrap();
    }

    #[test]
    fn commit_without_prepare_conflicts() {
        let store = MemoryOcflStore::default();
        let id = OcflObjectId::from("obj");
        let err = store.commit(&id, CommitMode::NewVersion).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[test]
    fn digest_validation_on_prepare() {
        let dir = TempDir::new().unwrap();
        let store = MemoryOcflStore::default();
        let id = OcflObjectId::from("obj");

        let mut cs = changeset(&dir, &[("a.nt", b"payload")]);
        cs.writes.get_mut("a.nt").unwrap().digest =
            Some(ContentDigest::compute(DigestAlgorithm::Sha256, b"other"));

        let err = store.prepare(&id, &cs).unwrap_err();
        assert!(matches!(err, StoreError::DigestMismatch { .. }));
    }

    #[test]
    fn revert_drops_latest_version() {
        let dir = TempDir::new().unwrap();
        let store = MemoryOcflStore::default();
        let id = OcflObjectId::from("obj");

        store.prepare(&id, &changeset(&dir, &[("a.nt", b"one")])).unwrap();
        store.commit(&id, CommitMode::NewVersion).unwrap();
        store.prepare(&id, &changeset(&dir, &[("a.nt", b"two")])).unwrap();
        store.commit(&id, CommitMode::NewVersion).unwrap();

        store.revert_to_previous_version(&id).unwrap();
        assert_eq!(store.read(&id, "a.nt", None).unwrap(), b"one");

        // Reverting v1 removes the object.
        store.revert_to_previous_version(&id).unwrap();
        assert!(!store.contains(&id).unwrap());
    }

    #[test]
    fn purge_removes_object() {
        let dir = TempDir::new().unwrap();
        let store = MemoryOcflStore::default();
        let id = OcflObjectId::from("obj");

        store.prepare(&id, &changeset(&dir, &[("a.nt", b"x")])).unwrap();
        store.commit(&id, CommitMode::NewVersion).unwrap();
        assert_eq!(store.len(), 1);

        store.purge(&id).unwrap();
        assert!(store.is_empty());
        assert!(matches!(store.purge(&id), Err(StoreError::NotFound(_))));
    }
}
