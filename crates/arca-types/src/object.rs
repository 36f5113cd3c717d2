//! Storage-side identifiers: OCFL object ids and version labels.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::resource::ResourceId;

/// Identifier of one OCFL object in the object store.
///
/// For an atomic resource the object id equals the resource id. For an
/// archival group the id is the group root's resource id; all descendants
/// share it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OcflObjectId(String);

impl OcflObjectId {
    /// The object id a resource maps to when it is its own storage root.
    pub fn from_resource(rid: &ResourceId) -> Self {
        Self(rid.as_str().to_string())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OcflObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OcflObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for OcflObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for OcflObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OcflObjectId({})", self.0)
    }
}

/// An OCFL version label: `v1`, `v2`, ...
///
/// Ordered numerically, not lexically, so `v10 > v9`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionId(u64);

impl VersionId {
    /// The first version of any object.
    pub const V1: VersionId = VersionId(1);

    /// Construct from a version number (must be >= 1).
    pub fn new(n: u64) -> Result<Self, TypeError> {
        if n == 0 {
            return Err(TypeError::InvalidVersionId("v0".to_string()));
        }
        Ok(Self(n))
    }

    /// Parse a `vN` label.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let digits = s
            .strip_prefix('v')
            .ok_or_else(|| TypeError::InvalidVersionId(s.to_string()))?;
        let n: u64 = digits
            .parse()
            .map_err(|_| TypeError::InvalidVersionId(s.to_string()))?;
        Self::new(n)
    }

    /// The version number.
    pub fn number(&self) -> u64 {
        self.0
    }

    /// The next version label.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Debug for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl Serialize for VersionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        VersionId::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_mapping_for_atomic_resources() {
        let rid = ResourceId::new("report").unwrap();
        assert_eq!(OcflObjectId::from_resource(&rid).as_str(), "report");
    }

    #[test]
    fn version_parse_and_display() {
        let v = VersionId::parse("v3").unwrap();
        assert_eq!(v.number(), 3);
        assert_eq!(v.to_string(), "v3");
        assert_eq!(v.next(), VersionId::new(4).unwrap());

        assert!(VersionId::parse("3").is_err());
        assert!(VersionId::parse("v0").is_err());
        assert!(VersionId::parse("vx").is_err());
    }

    #[test]
    fn versions_order_numerically() {
        let v9 = VersionId::parse("v9").unwrap();
        let v10 = VersionId::parse("v10").unwrap();
        assert!(v10 > v9);
    }

    #[test]
    fn version_serde_round_trip() {
        let v = VersionId::parse("v12").unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"v12\"");
        let back: VersionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
