//! Content digests for OCFL manifests and binary validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use crate::error::TypeError;

/// Digest algorithms accepted by the store.
///
/// OCFL requires sha256 or sha512 for the inventory manifest; sha512 is the
/// recommended default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// The algorithm's canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A content digest: algorithm plus lowercase hex value.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest {
    pub algorithm: DigestAlgorithm,
    pub value: String,
}

impl ContentDigest {
    /// Compute the digest of `bytes` under `algorithm`.
    pub fn compute(algorithm: DigestAlgorithm, bytes: &[u8]) -> Self {
        let value = match algorithm {
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
            DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(bytes)),
        };
        Self { algorithm, value }
    }

    /// Construct from an already-computed hex value, normalizing case.
    pub fn from_hex(algorithm: DigestAlgorithm, value: &str) -> Result<Self, TypeError> {
        let expected_len = match algorithm {
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Sha512 => 128,
        };
        if value.len() != expected_len || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidDigest(format!(
                "{algorithm} digest must be {expected_len} hex characters"
            )));
        }
        Ok(Self {
            algorithm,
            value: value.to_ascii_lowercase(),
        })
    }

    /// Returns `true` if `bytes` hash to this digest.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        Self::compute(self.algorithm, bytes).value == self.value
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}...", self.algorithm, &self.value[..8.min(self.value.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_and_match() {
        let d = ContentDigest::compute(DigestAlgorithm::Sha256, b"hello");
        assert!(d.matches(b"hello"));
        assert!(!d.matches(b"goodbye"));
    }

    #[test]
    fn sha512_is_distinct() {
        let a = ContentDigest::compute(DigestAlgorithm::Sha256, b"x");
        let b = ContentDigest::compute(DigestAlgorithm::Sha512, b"x");
        assert_ne!(a.value, b.value);
        assert_eq!(a.value.len(), 64);
        assert_eq!(b.value.len(), 128);
    }

    #[test]
    fn from_hex_validates_shape() {
        let good = ContentDigest::compute(DigestAlgorithm::Sha256, b"data");
        let parsed =
            ContentDigest::from_hex(DigestAlgorithm::Sha256, &good.value.to_uppercase()).unwrap();
        assert_eq!(parsed.value, good.value);

        assert!(ContentDigest::from_hex(DigestAlgorithm::Sha256, "abc").is_err());
        assert!(ContentDigest::from_hex(DigestAlgorithm::Sha512, &good.value).is_err());
    }
}
