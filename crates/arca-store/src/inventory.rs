//! The OCFL inventory: the per-object record of versions and content.
//!
//! An inventory enumerates an object's versions (`v1`, `v2`, ...), maps
//! content digests to stored file paths (the manifest), and records each
//! version's logical state as a digest -> logical-paths map. The inventory
//! is the durability root of an object: a version exists exactly when the
//! inventory names it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use arca_types::{DigestAlgorithm, OcflObjectId, VersionId};

use crate::error::{StoreError, StoreResult};

/// Inventory type declaration written to disk.
const INVENTORY_TYPE: &str = "https://ocfl.io/1.1/spec/#inventory";

/// One version's record: creation time and logical state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// When the version was created.
    pub created: DateTime<Utc>,
    /// Digest -> logical paths present in this version.
    pub state: BTreeMap<String, Vec<String>>,
}

impl VersionEntry {
    /// Invert the state map into logical path -> digest.
    pub fn path_digests(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (digest, paths) in &self.state {
            for path in paths {
                out.insert(path.clone(), digest.clone());
            }
        }
        out
    }
}

/// The OCFL inventory for one object.
///
/// A freshly constructed inventory has no versions; the first
/// [`Inventory::record_version`] creates `v1`. `head` is meaningful once at
/// least one version exists, and a version-less inventory is never written
/// to disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub id: OcflObjectId,
    #[serde(rename = "type")]
    pub type_decl: String,
    #[serde(rename = "digestAlgorithm")]
    pub digest_algorithm: DigestAlgorithm,
    pub head: VersionId,
    /// Digest -> content file paths (relative to the object root).
    pub manifest: BTreeMap<String, Vec<String>>,
    pub versions: BTreeMap<VersionId, VersionEntry>,
}

impl Inventory {
    /// A new, version-less inventory.
    pub fn new(id: OcflObjectId, digest_algorithm: DigestAlgorithm) -> Self {
        Self {
            id,
            type_decl: INVENTORY_TYPE.to_string(),
            digest_algorithm,
            head: VersionId::V1,
            manifest: BTreeMap::new(),
            versions: BTreeMap::new(),
        }
    }

    /// Returns `true` if no version has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// The id of the next version to be created.
    pub fn next_version_id(&self) -> VersionId {
        if self.versions.is_empty() {
            VersionId::V1
        } else {
            self.head.next()
        }
    }

    /// The head version's entry.
    pub fn head_entry(&self) -> StoreResult<&VersionEntry> {
        self.versions.get(&self.head).ok_or_else(|| StoreError::Corrupt {
            id: self.id.clone(),
            reason: format!("inventory head {} has no version entry", self.head),
        })
    }

    /// The entry of a specific version.
    pub fn version_entry(&self, version: &VersionId) -> StoreResult<&VersionEntry> {
        self.versions
            .get(version)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{version}", self.id)))
    }

    /// A content file path for `digest`, from the manifest.
    pub fn content_path(&self, digest: &str) -> StoreResult<&str> {
        self.manifest
            .get(digest)
            .and_then(|paths| paths.first())
            .map(String::as_str)
            .ok_or_else(|| StoreError::Corrupt {
                id: self.id.clone(),
                reason: format!("manifest has no content path for digest {digest}"),
            })
    }

    /// The head state as logical path -> digest, empty before `v1`.
    pub fn head_paths(&self) -> BTreeMap<String, String> {
        self.versions
            .get(&self.head)
            .map(VersionEntry::path_digests)
            .unwrap_or_default()
    }

    /// Compute the head state with `writes` applied and `deletes` removed.
    pub fn merged_paths(
        &self,
        writes: &BTreeMap<String, String>,
        deletes: impl IntoIterator<Item = String>,
    ) -> BTreeMap<String, String> {
        let mut paths = self.head_paths();
        for path in deletes {
            paths.remove(&path);
        }
        for (subpath, digest) in writes {
            paths.insert(subpath.clone(), digest.clone());
        }
        paths
    }

    /// Record the next version with the given full logical state.
    ///
    /// `state_paths` maps every logical subpath of the new version to its
    /// digest. `new_content` names the subset whose content is stored under
    /// this version's own directory; those digests are entered into the
    /// manifest as `vN/content/<subpath>`. Paths absent from `new_content`
    /// must already be resolvable through the manifest.
    pub fn record_version(
        &mut self,
        created: DateTime<Utc>,
        state_paths: &BTreeMap<String, String>,
        new_content: &BTreeMap<String, String>,
    ) -> VersionId {
        let next = self.next_version_id();

        for (subpath, digest) in new_content {
            self.manifest
                .entry(digest.clone())
                .or_default()
                .push(format!("{next}/content/{subpath}"));
        }

        let mut state: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (path, digest) in state_paths {
            state.entry(digest.clone()).or_default().push(path.clone());
        }

        self.versions.insert(next, VersionEntry { created, state });
        self.head = next;
        next
    }

    /// Drop the head version, reverting to its predecessor. Returns the new
    /// head, or `None` when the dropped version was `v1` (the object has no
    /// prior state).
    pub fn drop_head_version(&mut self) -> StoreResult<Option<VersionId>> {
        if self.versions.is_empty() {
            return Err(StoreError::Corrupt {
                id: self.id.clone(),
                reason: "cannot drop a version from an empty inventory".into(),
            });
        }
        let dropped = self.head;
        self.versions.remove(&dropped);

        // Remove manifest entries that only the dropped version contributed.
        let prefix = format!("{dropped}/");
        self.manifest.retain(|_, paths| {
            paths.retain(|p| !p.starts_with(&prefix));
            !paths.is_empty()
        });

        match self.versions.keys().next_back().copied() {
            Some(prev) => {
                self.head = prev;
                Ok(Some(prev))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv() -> Inventory {
        Inventory::new(OcflObjectId::from("obj-1"), DigestAlgorithm::Sha512)
    }

    fn writes(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(p, d)| (p.to_string(), d.to_string())).collect()
    }

    /// Apply a changeset the way a non-promoting commit does.
    fn apply(inv: &mut Inventory, w: &[(&str, &str)], deletes: &[&str]) -> VersionId {
        let w = writes(w);
        let merged = inv.merged_paths(&w, deletes.iter().map(|d| d.to_string()));
        inv.record_version(Utc::now(), &merged, &w)
    }

    #[test]
    fn first_apply_creates_v1() {
        let mut inv = inv();
        assert!(inv.is_empty());

        let v = apply(&mut inv, &[("a.nt", "d1")], &[]);
        assert_eq!(v, VersionId::V1);
        assert_eq!(inv.head, VersionId::V1);
        assert_eq!(inv.head_paths()["a.nt"], "d1");
        assert_eq!(inv.content_path("d1").unwrap(), "v1/content/a.nt");
    }

    #[test]
    fn later_versions_carry_prior_state() {
        let mut inv = inv();
        apply(&mut inv, &[("a.nt", "d1")], &[]);
        let v2 = apply(&mut inv, &[("b.nt", "d2")], &[]);

        assert_eq!(v2.to_string(), "v2");
        let paths = inv.head_paths();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths["a.nt"], "d1");
        assert_eq!(paths["b.nt"], "d2");
    }

    #[test]
    fn deletes_remove_paths() {
        let mut inv = inv();
        apply(&mut inv, &[("a.nt", "d1"), ("b.nt", "d2")], &[]);
        apply(&mut inv, &[], &["a.nt"]);

        let paths = inv.head_paths();
        assert!(!paths.contains_key("a.nt"));
        assert!(paths.contains_key("b.nt"));
        // v1 still has the deleted path.
        let v1 = inv.version_entry(&VersionId::V1).unwrap().path_digests();
        assert!(v1.contains_key("a.nt"));
    }

    #[test]
    fn drop_head_reverts() {
        let mut inv = inv();
        apply(&mut inv, &[("a.nt", "d1")], &[]);
        apply(&mut inv, &[("a.nt", "d2")], &[]);

        let prev = inv.drop_head_version().unwrap();
        assert_eq!(prev, Some(VersionId::V1));
        assert_eq!(inv.head_paths()["a.nt"], "d1");
        assert!(!inv.manifest.contains_key("d2"));

        let none = inv.drop_head_version().unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn json_round_trip() {
        let mut inv = inv();
        apply(&mut inv, &[("a.nt", "d1")], &[]);

        let json = serde_json::to_string_pretty(&inv).unwrap();
        assert!(json.contains("digestAlgorithm"));
        assert!(json.contains("\"v1\""));
        let back: Inventory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, inv);
    }
}
