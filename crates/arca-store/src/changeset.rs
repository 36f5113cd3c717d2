//! The collapsed pending-op set handed to the store at prepare time.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use arca_types::ContentDigest;

/// One staged file awaiting prepare: bytes already written to a session
/// staging area, plus what the writer claims about them.
#[derive(Clone, Debug)]
pub struct StagedFile {
    /// Location of the staged bytes on disk.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    /// Digest declared by the writer, verified by the store at prepare.
    pub digest: Option<ContentDigest>,
}

/// All changes targeted at one OCFL object, collapsed per subpath.
///
/// A subpath appears in `writes` or in `deletes`, never both: the object
/// sub-session collapses write-then-delete sequences before building the
/// changeset.
#[derive(Clone, Debug, Default)]
pub struct Changeset {
    /// Subpath -> staged file, in deterministic path order.
    pub writes: BTreeMap<String, StagedFile>,
    /// Subpaths to remove from the head state.
    pub deletes: BTreeSet<String>,
}

impl Changeset {
    /// Returns `true` if the changeset carries no work.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.deletes.is_empty()
    }

    /// Number of affected subpaths.
    pub fn len(&self) -> usize {
        self.writes.len() + self.deletes.len()
    }
}
