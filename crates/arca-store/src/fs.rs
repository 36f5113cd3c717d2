//! Filesystem-backed OCFL object store.
//!
//! On-disk layout, one directory per object under the store root:
//!
//! ```text
//! <root>/<encoded-object-id>/
//!   inventory.json          durable inventory; a version exists iff named here
//!   v1/content/<subpath>    immutable version content
//!   v2/content/<subpath>
//!   head/                   mutable-head shadow (absent when no staged changes)
//!     manifest.json         logical path -> digest for the head view
//!     content/<subpath>     content written to the head
//!   pending/                prepared-but-uncommitted changeset
//!     changeset.json        written last; marks the prepare as complete
//!     content/<subpath>
//! ```
//!
//! Crash-safety: `prepare` fully writes `pending/` and finishes with the
//! `changeset.json` marker; `commit` moves content with renames and swaps
//! `inventory.json` (write-to-temp + rename) as its final step. A crash at
//! any point leaves either the old durable state or the new one, plus at
//! worst an unreferenced directory.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use arca_types::{ContentDigest, DigestAlgorithm, OcflObjectId, VersionId};

use crate::changeset::Changeset;
use crate::error::{StoreError, StoreResult};
use crate::inventory::Inventory;
use crate::traits::{CommitMode, OcflObjectStore, OcflVersionInfo};

const INVENTORY_FILE: &str = "inventory.json";
const HEAD_DIR: &str = "head";
const HEAD_MANIFEST_FILE: &str = "manifest.json";
const PENDING_DIR: &str = "pending";
const CHANGESET_FILE: &str = "changeset.json";
const CONTENT_DIR: &str = "content";

/// Head-view manifest stored at `head/manifest.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct HeadManifest {
    /// Logical path -> digest.
    paths: BTreeMap<String, String>,
}

/// Prepared changeset marker stored at `pending/changeset.json`.
#[derive(Debug, Serialize, Deserialize)]
struct PendingChangeset {
    /// Subpath -> digest (computed under the store's algorithm).
    writes: BTreeMap<String, String>,
    deletes: Vec<String>,
}

/// Filesystem OCFL object store.
///
/// Objects are serialized by an internal per-object lock map; distinct
/// objects never block each other.
pub struct FsOcflStore {
    root: PathBuf,
    digest_algorithm: DigestAlgorithm,
    locks: Mutex<HashMap<OcflObjectId, Arc<Mutex<()>>>>,
}

impl FsOcflStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, digest_algorithm: DigestAlgorithm) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            digest_algorithm,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// The store root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_lock(&self, id: &OcflObjectId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock poisoned");
        Arc::clone(locks.entry(id.clone()).or_default())
    }

    fn object_dir(&self, id: &OcflObjectId) -> PathBuf {
        self.root.join(encode_object_id(id.as_str()))
    }

    fn load_inventory(&self, id: &OcflObjectId, dir: &Path) -> StoreResult<Option<Inventory>> {
        read_json_opt(&dir.join(INVENTORY_FILE), |reason| StoreError::Corrupt {
            id: id.clone(),
            reason,
        })
    }

    fn load_head(&self, id: &OcflObjectId, dir: &Path) -> StoreResult<Option<HeadManifest>> {
        read_json_opt(
            &dir.join(HEAD_DIR).join(HEAD_MANIFEST_FILE),
            |reason| StoreError::Corrupt {
                id: id.clone(),
                reason,
            },
        )
    }

    /// The head view: mutable head when present, else the inventory head.
    fn head_view(&self, id: &OcflObjectId, dir: &Path) -> StoreResult<BTreeMap<String, String>> {
        if let Some(head) = self.load_head(id, dir)? {
            return Ok(head.paths);
        }
        match self.load_inventory(id, dir)? {
            Some(inv) => Ok(inv.head_paths()),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    /// Read content bytes for a head-view path.
    fn read_head_content(
        &self,
        id: &OcflObjectId,
        dir: &Path,
        subpath: &str,
    ) -> StoreResult<Vec<u8>> {
        // Content written into the head lives under head/content; paths
        // carried over from committed versions resolve via the manifest.
        let head_file = dir.join(HEAD_DIR).join(CONTENT_DIR).join(subpath);
        if head_file.is_file() {
            return Ok(fs::read(head_file)?);
        }
        let inv = self
            .load_inventory(id, dir)?
            .ok_or_else(|| StoreError::NotFound(format!("{id}/{subpath}")))?;
        let digest = inv
            .head_paths()
            .get(subpath)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{id}/{subpath}")))?;
        let content_path = inv.content_path(&digest)?.to_string();
        Ok(fs::read(dir.join(content_path))?)
    }
}

impl OcflObjectStore for FsOcflStore {
    fn contains(&self, id: &OcflObjectId) -> StoreResult<bool> {
        let dir = self.object_dir(id);
        Ok(dir.join(INVENTORY_FILE).is_file()
            || dir.join(HEAD_DIR).join(HEAD_MANIFEST_FILE).is_file())
    }

    fn has_staged_changes(&self, id: &OcflObjectId) -> StoreResult<bool> {
        Ok(self
            .object_dir(id)
            .join(HEAD_DIR)
            .join(HEAD_MANIFEST_FILE)
            .is_file())
    }

    fn read(
        &self,
        id: &OcflObjectId,
        subpath: &str,
        version: Option<&VersionId>,
    ) -> StoreResult<Vec<u8>> {
        let _guard = self.object_lock(id);
        let _held = _guard.lock().expect("lock poisoned");
        let dir = self.object_dir(id);
        if !self.contains(id)? {
            return Err(StoreError::NotFound(id.to_string()));
        }

        match version {
            Some(v) => {
                let inv = self
                    .load_inventory(id, &dir)?
                    .ok_or_else(|| StoreError::NotFound(format!("{id}/{v}")))?;
                let digest = inv
                    .version_entry(v)?
                    .path_digests()
                    .get(subpath)
                    .cloned()
                    .ok_or_else(|| StoreError::NotFound(format!("{id}/{v}/{subpath}")))?;
                let content_path = inv.content_path(&digest)?.to_string();
                Ok(fs::read(dir.join(content_path))?)
            }
            None => {
                let view = self.head_view(id, &dir)?;
                if !view.contains_key(subpath) {
                    return Err(StoreError::NotFound(format!("{id}/{subpath}")));
                }
                self.read_head_content(id, &dir, subpath)
            }
        }
    }

    fn paths_at(
        &self,
        id: &OcflObjectId,
        version: Option<&VersionId>,
    ) -> StoreResult<BTreeMap<String, String>> {
        let _guard = self.object_lock(id);
        let _held = _guard.lock().expect("lock poisoned");
        let dir = self.object_dir(id);
        if !self.contains(id)? {
            return Err(StoreError::NotFound(id.to_string()));
        }
        match version {
            Some(v) => {
                let inv = self
                    .load_inventory(id, &dir)?
                    .ok_or_else(|| StoreError::NotFound(format!("{id}/{v}")))?;
                Ok(inv.version_entry(v)?.path_digests())
            }
            None => self.head_view(id, &dir),
        }
    }

    fn list_versions(&self, id: &OcflObjectId) -> StoreResult<Vec<OcflVersionInfo>> {
        let _guard = self.object_lock(id);
        let _held = _guard.lock().expect("lock poisoned");
        let dir = self.object_dir(id);
        if !self.contains(id)? {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(self
            .load_inventory(id, &dir)?
            .into_iter()
            .flat_map(|inv| {
                inv.versions
                    .into_iter()
                    .map(|(v, e)| OcflVersionInfo {
                        version_id: v,
                        created: e.created,
                    })
                    .collect::<Vec<_>>()
            })
            .collect())
    }

    fn prepare(&self, id: &OcflObjectId, changeset: &Changeset) -> StoreResult<()> {
        let _guard = self.object_lock(id);
        let _held = _guard.lock().expect("lock poisoned");
        let dir = self.object_dir(id);
        let pending = dir.join(PENDING_DIR);

        if pending.join(CHANGESET_FILE).is_file() {
            return Err(StoreError::Locked(id.clone()));
        }
        if pending.exists() {
            // Leftover from an interrupted prepare; rebuild from scratch.
            fs::remove_dir_all(&pending)?;
        }
        fs::create_dir_all(pending.join(CONTENT_DIR))?;

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
            let target = pending.join(CONTENT_DIR).join(subpath);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &bytes)?;
            writes.insert(subpath.clone(), digest);
        }

        // The changeset marker lands last: its presence marks the prepare
        // as complete.
        write_json_atomic(
            &pending.join(CHANGESET_FILE),
            &PendingChangeset {
                writes,
                deletes: changeset.deletes.iter().cloned().collect(),
            },
        )?;

        debug!(object = %id, files = changeset.writes.len(), "prepared changeset");
        Ok(())
    }

    fn commit(&self, id: &OcflObjectId, mode: CommitMode) -> StoreResult<()> {
        let _guard = self.object_lock(id);
        let _held = _guard.lock().expect("lock poisoned");
        let dir = self.object_dir(id);
        let pending = dir.join(PENDING_DIR);

        let pc: PendingChangeset = read_json_opt(&pending.join(CHANGESET_FILE), |reason| {
            StoreError::Corrupt {
                id: id.clone(),
                reason,
            }
        })?
        .ok_or_else(|| StoreError::Conflict {
            id: id.clone(),
            reason: "nothing prepared".into(),
        })?;

        let head_dir = dir.join(HEAD_DIR);
        let prior_head = self.load_head(id, &dir)?;

        match mode {
            CommitMode::MutableHead => {
                let mut paths = match prior_head {
                    Some(head) => head.paths,
                    None => self
                        .load_inventory(id, &dir)?
                        .map(|inv| inv.head_paths())
                        .unwrap_or_default(),
                };
                for path in &pc.deletes {
                    paths.remove(path);
                    let staged = head_dir.join(CONTENT_DIR).join(path);
                    if staged.is_file() {
                        fs::remove_file(staged)?;
                    }
                }
                fs::create_dir_all(head_dir.join(CONTENT_DIR))?;
                for (subpath, digest) in &pc.writes {
                    let target = head_dir.join(CONTENT_DIR).join(subpath);
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::rename(pending.join(CONTENT_DIR).join(subpath), &target)?;
                    paths.insert(subpath.clone(), digest.clone());
                }
                // The manifest swap is the fence that makes the head commit
                // visible.
                write_json_atomic(
                    &head_dir.join(HEAD_MANIFEST_FILE),
                    &HeadManifest { paths },
                )?;
                fs::remove_dir_all(&pending)?;
            }
            CommitMode::NewVersion => {
                let mut inv = self
                    .load_inventory(id, &dir)?
                    .unwrap_or_else(|| Inventory::new(id.clone(), self.digest_algorithm));

                let promoting = prior_head.is_some();
                let mut paths = match prior_head {
                    Some(head) => head.paths,
                    None => inv.head_paths(),
                };
                for path in &pc.deletes {
                    paths.remove(path);
                }
                for (subpath, digest) in &pc.writes {
                    paths.insert(subpath.clone(), digest.clone());
                }

                let next = inv.next_version_id();
                let version_content = dir.join(next.to_string()).join(CONTENT_DIR);
                fs::create_dir_all(&version_content)?;

                let mut new_content = pc.writes.clone();
                for subpath in pc.writes.keys() {
                    let target = version_content.join(subpath);
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::rename(pending.join(CONTENT_DIR).join(subpath), target)?;
                }
                if promoting {
                    // Carry head-local content into the version directory.
                    for (subpath, digest) in &paths {
                        if new_content.contains_key(subpath) {
                            continue;
                        }
                        let head_file = head_dir.join(CONTENT_DIR).join(subpath);
                        if head_file.is_file() {
                            let target = version_content.join(subpath);
                            if let Some(parent) = target.parent() {
                                fs::create_dir_all(parent)?;
                            }
                            fs::rename(head_file, target)?;
                            new_content.insert(subpath.clone(), digest.clone());
                        }
                    }
                }

                inv.record_version(Utc::now(), &paths, &new_content);
                // The inventory swap is the durable commit point.
                write_json_atomic(&dir.join(INVENTORY_FILE), &inv)?;

                fs::remove_dir_all(&pending)?;
                if promoting {
                    fs::remove_dir_all(&head_dir)?;
                }
            }
        }

        debug!(object = %id, ?mode, "committed changeset");
        Ok(())
    }

    fn abort(&self, id: &OcflObjectId) -> StoreResult<()> {
        let _guard = self.object_lock(id);
        let _held = _guard.lock().expect("lock poisoned");
        let dir = self.object_dir(id);
        let pending = dir.join(PENDING_DIR);
        if pending.exists() {
            fs::remove_dir_all(&pending)?;
        }
        // Drop the directory shell of an object that never committed.
        if dir.exists() && !self.contains(id)? {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    fn revert_to_previous_version(&self, id: &OcflObjectId) -> StoreResult<()> {
        let _guard = self.object_lock(id);
        let _held = _guard.lock().expect("lock poisoned");
        let dir = self.object_dir(id);

        let mut inv = self
            .load_inventory(id, &dir)?
            .ok_or_else(|| StoreError::Conflict {
                id: id.clone(),
                reason: "no committed versions to revert".into(),
            })?;

        let dropped = inv.head;
        match inv.drop_head_version()? {
            Some(_) => {
                write_json_atomic(&dir.join(INVENTORY_FILE), &inv)?;
                let stale = dir.join(dropped.to_string());
                if stale.exists() {
                    fs::remove_dir_all(stale)?;
                }
            }
            None => {
                fs::remove_dir_all(&dir)?;
            }
        }
        debug!(object = %id, version = %dropped, "reverted version");
        Ok(())
    }

    fn purge(&self, id: &OcflObjectId) -> StoreResult<()> {
        let _guard = self.object_lock(id);
        let _held = _guard.lock().expect("lock poisoned");
        let dir = self.object_dir(id);
        if !dir.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        fs::remove_dir_all(&dir)?;
        debug!(object = %id, "purged object");
        Ok(())
    }
}

/// Percent-encode an object id into a safe single path component.
fn encode_object_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{b:02x}")),
        }
    }
    out
}

/// Read and parse an optional JSON file; `None` when the file is absent.
fn read_json_opt<T: DeserializeOwned>(
    path: &Path,
    corrupt: impl FnOnce(String) -> StoreError,
) -> StoreResult<Option<T>> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| corrupt(format!("{}: {e}", path.display())))
}

/// Serialize to a temp file, then atomically rename into place.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    if let Err(e) = fs::rename(&tmp, path) {
        warn!(path = %path.display(), "failed to swap in {}", tmp.display());
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::StagedFile;
    use tempfile::TempDir;

    struct Fixture {
        staging: TempDir,
        _store_dir: TempDir,
        store: FsOcflStore,
    }

    impl Fixture {
        fn new() -> Self {
            let staging = TempDir::new().unwrap();
            let store_dir = TempDir::new().unwrap();
            let store = FsOcflStore::open(store_dir.path(), DigestAlgorithm::Sha256).unwrap();
            Self {
                staging,
                _store_dir: store_dir,
                store,
            }
        }

        fn changeset(&self, files: &[(&str, &[u8])]) -> Changeset {
            let mut cs = Changeset::default();
            for (i, (subpath, bytes)) in files.iter().enumerate() {
                let path = self
                    .staging
                    .path()
                    .join(format!("staged-{i}-{}", subpath.replace('/', "_")));
                fs::write(&path, bytes).unwrap();
                cs.writes.insert(
                    subpath.to_string(),
                    StagedFile {
                        path,
                        size: bytes.len() as u64,
                        digest: None,
                    },
                );
            }
            cs
        }
    }

    #[test]
    fn new_version_layout_on_disk() {
        let fx = Fixture::new();
        let id = OcflObjectId::from("info:arca/obj one");

        fx.store
            .prepare(&id, &fx.changeset(&[("a.nt", b"alpha"), ("c/b.nt", b"beta")]))
            .unwrap();
        fx.store.commit(&id, CommitMode::NewVersion).unwrap();

        let dir = fx.store.object_dir(&id);
        assert!(dir.join("inventory.json").is_file());
        assert!(dir.join("v1/content/a.nt").is_file());
        assert!(dir.join("v1/content/c/b.nt").is_file());
        assert!(!dir.join("pending").exists());

        assert_eq!(fx.store.read(&id, "c/b.nt", None).unwrap(), b"beta");
    }

    #[test]
    fn object_id_encoding_is_path_safe() {
        assert_eq!(encode_object_id("plain-id_1.2"), "plain-id_1.2");
        assert_eq!(encode_object_id("a/b:c"), "a%2fb%3ac");
    }

    #[test]
    fn reopen_reads_existing_objects() {
        let fx = Fixture::new();
        let id = OcflObjectId::from("obj");

        fx.store.prepare(&id, &fx.changeset(&[("a.nt", b"alpha")])).unwrap();
        fx.store.commit(&id, CommitMode::NewVersion).unwrap();

        let reopened =
            FsOcflStore::open(fx.store.root(), DigestAlgorithm::Sha256).unwrap();
        assert!(reopened.contains(&id).unwrap());
        assert_eq!(reopened.read(&id, "a.nt", None).unwrap(), b"alpha");
    }

    #[test]
    fn mutable_head_commit_and_promotion() {
        let fx = Fixture::new();
        let id = OcflObjectId::from("obj");

        fx.store.prepare(&id, &fx.changeset(&[("a.nt", b"first")])).unwrap();
        fx.store.commit(&id, CommitMode::MutableHead).unwrap();

        assert!(fx.store.contains(&id).unwrap());
        assert!(fx.store.has_staged_changes(&id).unwrap());
        assert!(fx.store.list_versions(&id).unwrap().is_empty());
        assert_eq!(fx.store.read(&id, "a.nt", None).unwrap(), b"first");

        // Overwrite within the head.
        fx.store.prepare(&id, &fx.changeset(&[("a.nt", b"second")])).unwrap();
        fx.store.commit(&id, CommitMode::MutableHead).unwrap();
        assert_eq!(fx.store.read(&id, "a.nt", None).unwrap(), b"second");

        // Promote.
        fx.store.prepare(&id, &Changeset::default()).unwrap();
        fx.store.commit(&id, CommitMode::NewVersion).unwrap();

        assert!(!fx.store.has_staged_changes(&id).unwrap());
        assert_eq!(fx.store.list_versions(&id).unwrap().len(), 1);
        assert_eq!(
            fx.store.read(&id, "a.nt", Some(&VersionId::V1)).unwrap(),
            b"second"
        );
    }

    #[test]
    fn prepare_is_invisible_until_commit() {
        let fx = Fixture::new();
        let id = OcflObjectId::from("obj");

        fx.store.prepare(&id, &fx.changeset(&[("a.nt", b"x")])).unwrap();
        assert!(!fx.store.contains(&id).unwrap());

        fx.store.abort(&id).unwrap();
        assert!(!fx.store.object_dir(&id).exists());
    }

    #[test]
    fn version_history_reads() {
        let fx = Fixture::new();
        let id = OcflObjectId::from("obj");

        fx.store.prepare(&id, &fx.changeset(&[("a.nt", b"one")])).unwrap();
        fx.store.commit(&id, CommitMode::NewVersion).unwrap();
        fx.store.prepare(&id, &fx.changeset(&[("a.nt", b"two")])).unwrap();
        fx.store.commit(&id, CommitMode::NewVersion).unwrap();

        let versions = fx.store.list_versions(&id).unwrap();
        assert_eq!(versions.len(), 2);
        assert!(versions[0].version_id < versions[1].version_id);

        assert_eq!(fx.store.read(&id, "a.nt", Some(&VersionId::V1)).unwrap(), b"one");
        assert_eq!(fx.store.read(&id, "a.nt", None).unwrap(), b"two");
    }

    #[test]
    fn revert_and_purge() {
        let fx = Fixture::new();
        let id = OcflObjectId::from("obj");

        fx.store.prepare(&id, &fx.changeset(&[("a.nt", b"one")])).unwrap();
        fx.store.commit(&id, CommitMode::NewVersion).unwrap();
        fx.store.prepare(&id, &fx.changeset(&[("a.nt", b"two")])).unwrap();
        fx.store.commit(&id, CommitMode::NewVersion).unwrap();

        fx.store.revert_to_previous_version(&id).unwrap();
        assert_eq!(fx.store.read(&id, "a.nt", None).unwrap(), b"one");
        assert!(!fx.store.object_dir(&id).join("v2").exists());

        fx.store.purge(&id).unwrap();
        assert!(!fx.store.contains(&id).unwrap());
        assert!(matches!(fx.store.purge(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn digest_mismatch_fails_prepare() {
        let fx = Fixture::new();
        let id = OcflObjectId::from("obj");

        let mut cs = fx.changeset(&[("a.nt", b"payload")]);
        cs.writes.get_mut("a.nt").unwrap().digest =
            Some(ContentDigest::compute(DigestAlgorithm::Sha512, b"not the payload"));

        let err = fx.store.prepare(&id, &cs).unwrap_err();
        assert!(matches!(err, StoreError::DigestMismatch { .. }));
    }
}
