//! Logical resource identifiers.
//!
//! A [`ResourceId`] names one resource in the repository. Ids are opaque
//! strings with an optional hierarchical suffix: `accounts/2024/report`
//! denotes a resource nested beneath `accounts/2024`, which in turn sits
//! beneath `accounts`. Hierarchy matters for archival groups, where every
//! descendant of the group root shares the root's storage object.
//!
//! Valid resource ids:
//! - Must be non-empty
//! - Must not contain whitespace or control characters
//! - Must not contain `..` (parent traversal)
//! - Must not start or end with `/`
//! - Must not contain consecutive slashes (`//`)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The distinguished id of the repository root pseudo-resource.
///
/// The root exists implicitly: it is never stored, never mapped, and serves
/// only as the parent of top-level resources.
const ROOT_ID: &str = "info:arca/root";

/// Identifier of one logical resource.
///
/// Stable for the life of the resource. The hierarchical form `root/child`
/// implies `root` is (or will become) an archival group containing `child`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Create a resource id, validating its form.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        validate(&id)?;
        Ok(Self(id))
    }

    /// The repository root pseudo-resource.
    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    /// Returns `true` if this is the repository root.
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }

    /// Append one path segment, producing a child id.
    ///
    /// Resolving against the repository root yields a top-level id equal to
    /// the bare segment.
    pub fn resolve(&self, segment: &str) -> Result<Self, TypeError> {
        if segment.is_empty() || segment.contains('/') {
            return Err(TypeError::InvalidResourceId {
                id: segment.to_string(),
                reason: "child segment must be a single non-empty path component".into(),
            });
        }
        if self.is_root() {
            Self::new(segment)
        } else {
            Self::new(format!("{}/{segment}", self.0))
        }
    }

    /// The hierarchical parent of this id, or the repository root for a
    /// top-level id. The root itself has no parent.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rsplit_once('/') {
            Some((prefix, _)) => Some(Self(prefix.to_string())),
            None => Some(Self::root()),
        }
    }

    /// Returns `true` if this id sits strictly beneath `ancestor`.
    pub fn is_descendant_of(&self, ancestor: &ResourceId) -> bool {
        if self == ancestor || self.is_root() {
            return false;
        }
        if ancestor.is_root() {
            return true;
        }
        self.0.starts_with(&ancestor.0)
            && self.0.as_bytes().get(ancestor.0.len()) == Some(&b'/')
    }

    /// The path of this resource relative to `root`: empty when this id *is*
    /// the root, the slash-separated suffix when it is a descendant, `None`
    /// otherwise.
    ///
    /// This is the OCFL subpath of a resource within its archival group.
    pub fn relative_to(&self, root: &ResourceId) -> Option<String> {
        if self == root {
            return Some(String::new());
        }
        if self.is_descendant_of(root) {
            if root.is_root() {
                return Some(self.0.clone());
            }
            return Some(self.0[root.0.len() + 1..].to_string());
        }
        None
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(id: &str) -> Result<(), TypeError> {
    let err = |reason: &str| {
        Err(TypeError::InvalidResourceId {
            id: id.to_string(),
            reason: reason.to_string(),
        })
    };

    if id.is_empty() {
        return err("id must not be empty");
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return err("id must not contain whitespace or control characters");
    }
    if id.contains("..") {
        return err("id must not contain '..'");
    }
    if id.starts_with('/') || id.ends_with('/') {
        return err("id must not start or end with '/'");
    }
    if id.contains("//") {
        return err("id must not contain '//'");
    }
    Ok(())
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_ids() {
        assert!(ResourceId::new("report").is_ok());
        assert!(ResourceId::new("accounts/2024/report").is_ok());
        assert!(ResourceId::new("urn:uuid:1234").is_ok());
    }

    #[test]
    fn invalid_ids() {
        assert!(ResourceId::new("").is_err());
        assert!(ResourceId::new("has space").is_err());
        assert!(ResourceId::new("up/../escape").is_err());
        assert!(ResourceId::new("/leading").is_err());
        assert!(ResourceId::new("trailing/").is_err());
        assert!(ResourceId::new("double//slash").is_err());
    }

    #[test]
    fn root_is_special() {
        let root = ResourceId::root();
        assert!(root.is_root());
        assert!(root.parent().is_none());
    }

    #[test]
    fn resolve_builds_hierarchy() {
        let root = ResourceId::root();
        let top = root.resolve("group").unwrap();
        assert_eq!(top.as_str(), "group");

        let child = top.resolve("member").unwrap();
        assert_eq!(child.as_str(), "group/member");

        assert!(top.resolve("a/b").is_err());
        assert!(top.resolve("").is_err());
    }

    #[test]
    fn parent_walks_up() {
        let child = ResourceId::new("group/member").unwrap();
        let parent = child.parent().unwrap();
        assert_eq!(parent.as_str(), "group");
        assert!(parent.parent().unwrap().is_root());
    }

    #[test]
    fn descendant_checks() {
        let group = ResourceId::new("group").unwrap();
        let child = ResourceId::new("group/member").unwrap();
        let other = ResourceId::new("groupie").unwrap();

        assert!(child.is_descendant_of(&group));
        assert!(!group.is_descendant_of(&child));
        assert!(!group.is_descendant_of(&group));
        // Prefix without a path boundary is not containment.
        assert!(!other.is_descendant_of(&group));
        // Everything is a descendant of the root.
        assert!(group.is_descendant_of(&ResourceId::root()));
    }

    #[test]
    fn relative_paths() {
        let group = ResourceId::new("group").unwrap();
        let child = ResourceId::new("group/a/b").unwrap();

        assert_eq!(group.relative_to(&group).unwrap(), "");
        assert_eq!(child.relative_to(&group).unwrap(), "a/b");
        assert!(group.relative_to(&child).is_none());
    }
}
