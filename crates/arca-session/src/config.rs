use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use arca_store::CommitMode;
use arca_types::DigestAlgorithm;

/// Configuration for storage sessions and the session manager.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Default commit mode for object sub-sessions.
    pub commit_mode_default: CommitMode,
    /// Directory under which per-session staging directories live.
    pub session_staging_root: PathBuf,
    /// How long rollback waits for in-flight persists to drain.
    pub rollback_drain_timeout: Duration,
    /// Idle age after which the session manager reaps an abandoned session.
    pub orphan_session_timeout: Duration,
    /// Digest algorithm used for binary headers and ingest validation.
    pub digest_algorithm: DigestAlgorithm,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            commit_mode_default: CommitMode::MutableHead,
            session_staging_root: std::env::temp_dir().join("arca-staging"),
            rollback_drain_timeout: Duration::from_secs(30),
            orphan_session_timeout: Duration::from_secs(60 * 60),
            digest_algorithm: DigestAlgorithm::Sha512,
        }
    }
}

impl RepositoryConfig {
    /// Set the default commit mode.
    pub fn with_commit_mode(mut self, mode: CommitMode) -> Self {
        self.commit_mode_default = mode;
        self
    }

    /// Set the staging root directory.
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.session_staging_root = root.into();
        self
    }

    /// Set the rollback drain timeout.
    pub fn with_rollback_drain_timeout(mut self, timeout: Duration) -> Self {
        self.rollback_drain_timeout = timeout;
        self
    }

    /// Set the orphan session timeout.
    pub fn with_orphan_session_timeout(mut self, timeout: Duration) -> Self {
        self.orphan_session_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = RepositoryConfig::default();
        assert_eq!(c.commit_mode_default, CommitMode::MutableHead);
        assert_eq!(c.rollback_drain_timeout, Duration::from_secs(30));
        assert_eq!(c.orphan_session_timeout, Duration::from_secs(3600));
        assert_eq!(c.digest_algorithm, DigestAlgorithm::Sha512);
    }

    #[test]
    fn builders() {
        let c = RepositoryConfig::default()
            .with_commit_mode(CommitMode::NewVersion)
            .with_staging_root("/var/arca/staging")
            .with_rollback_drain_timeout(Duration::from_secs(5));
        assert_eq!(c.commit_mode_default, CommitMode::NewVersion);
        assert_eq!(c.session_staging_root, PathBuf::from("/var/arca/staging"));
        assert_eq!(c.rollback_drain_timeout, Duration::from_secs(5));
    }
}
