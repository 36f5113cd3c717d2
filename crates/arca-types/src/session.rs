//! Session (transaction) identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one read-write storage session.
///
/// Session ids are externally generated (they are the repository's
/// transaction ids); [`SessionId::mint`] exists for callers that have no
/// external id to carry.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an externally generated transaction id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh session id.
    pub fn mint() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_external_ids() {
        let id = SessionId::new("tx-42");
        assert_eq!(id.as_str(), "tx-42");
        assert_eq!(id.to_string(), "tx-42");
    }

    #[test]
    fn minted_ids_are_unique() {
        assert_ne!(SessionId::mint(), SessionId::mint());
    }
}
