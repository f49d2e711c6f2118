//! Versioned rule text.
//!
//! The store is append-only: [`ConstitutionStore::propose`] always creates version
//! `N + 1` from version `N` and never edits a recorded text. There is no rollback.

use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;

/// Rules the contest starts with.
pub const DEFAULT_CONSTITUTION: &str = "All unit tests pass: + $1,000

Compilation error or any failing test: - $500

Latency: - $5 x (seconds of measured execution time)

The Principle Evaluator may overwrite these lines (or add new ones) after any round.";

/// One recorded version of the rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstitutionVersion {
    /// Starts at 1, strictly increasing.
    pub version: u32,
    #[allow(missing_docs)]
    pub text: String,
    /// First round played under this version.
    pub active_from_round: u32,
    #[allow(missing_docs)]
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

/// Append-only history of constitution versions.
#[derive(Debug)]
pub struct ConstitutionStore {
    versions: RwLock<Vec<ConstitutionVersion>>,
}

impl Default for ConstitutionStore {
    fn default() -> Self {
        ConstitutionStore::new(DEFAULT_CONSTITUTION)
    }
}

impl ConstitutionStore {
    /// Store whose version 1 is `initial_text`, active from round 0.
    pub fn new(initial_text: impl Into<String>) -> ConstitutionStore {
        ConstitutionStore {
            versions: RwLock::new(vec![ConstitutionVersion {
                version: 1,
                text: initial_text.into(),
                active_from_round: 0,
                recorded_at: OffsetDateTime::now_utc(),
            }]),
        }
    }

    /// Rebuild a store from persisted versions.
    ///
    /// # Errors
    /// Fails if `versions` is empty or its numbers are not `1, 2, 3, ...`.
    pub fn from_versions(versions: Vec<ConstitutionVersion>) -> anyhow::Result<ConstitutionStore> {
        if versions.is_empty() {
            anyhow::bail!("a constitution needs at least one version");
        }
        for (i, v) in versions.iter().enumerate() {
            if v.version as usize != i + 1 {
                anyhow::bail!(
                    "constitution versions must be contiguous from 1, found {} at position {}",
                    v.version,
                    i
                );
            }
        }
        Ok(ConstitutionStore {
            versions: RwLock::new(versions),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<ConstitutionVersion>> {
        self.versions.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// The active version.
    pub fn current(&self) -> ConstitutionVersion {
        // never empty: built with one version and only appended to
        self.read()
            .last()
            .cloned()
            .unwrap_or_else(|| ConstitutionVersion {
                version: 0,
                text: String::new(),
                active_from_round: 0,
                recorded_at: OffsetDateTime::UNIX_EPOCH,
            })
    }

    /// Record `text` as the next version, active from `active_from_round`.
    /// Returns the new version number.
    pub fn propose(&self, text: impl Into<String>, active_from_round: u32) -> u32 {
        let mut guard = self
            .versions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let version = guard.last().map_or(1, |v| v.version + 1);
        guard.push(ConstitutionVersion {
            version,
            text: text.into(),
            active_from_round,
            recorded_at: OffsetDateTime::now_utc(),
        });
        info!(version, active_from_round, "constitution updated");
        version
    }

    /// A specific version, if it exists.
    pub fn version(&self, version: u32) -> Option<ConstitutionVersion> {
        self.read().iter().find(|v| v.version == version).cloned()
    }

    /// All versions, oldest first.
    pub fn versions(&self) -> Vec<ConstitutionVersion> {
        self.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_default_text() {
        let store = ConstitutionStore::default();
        let current = store.current();
        assert_eq!(current.version, 1);
        assert_eq!(current.text, DEFAULT_CONSTITUTION);
        assert_eq!(current.active_from_round, 0);
    }

    #[test]
    fn propose_appends_without_touching_history() {
        let store = ConstitutionStore::new("v1");
        assert_eq!(store.propose("v2", 2), 2);
        assert_eq!(store.propose("v3", 5), 3);

        let versions = store.versions();
        let numbers = versions.iter().map(|v| v.version).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(store.version(1).map(|v| v.text), Some("v1".to_string()));
        assert_eq!(store.current().text, "v3");
        assert_eq!(store.current().active_from_round, 5);
        assert!(store.version(4).is_none());
    }

    #[test]
    fn identical_text_still_creates_a_version() {
        let store = ConstitutionStore::new("same");
        assert_eq!(store.propose("same", 1), 2);
        assert_eq!(store.versions().len(), 2);
    }

    #[test]
    fn from_versions_rejects_gaps() {
        let store = ConstitutionStore::new("a");
        store.propose("b", 1);
        let mut versions = store.versions();
        assert!(ConstitutionStore::from_versions(versions.clone()).is_ok());
        versions.remove(0);
        assert!(ConstitutionStore::from_versions(versions).is_err());
        assert!(ConstitutionStore::from_versions(vec![]).is_err());
    }
}
