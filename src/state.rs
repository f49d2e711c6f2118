//! Explicit contest state shared by the engine and dashboards.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::bank::{Bank, LedgerEntry};
use crate::constitution::{ConstitutionStore, ConstitutionVersion};

/// Ledger, constitution history and round counter of one contest.
///
/// Share it as an `Arc` between the engine and any number of
/// [`Dashboard`](crate::dashboard::Dashboard)s.
#[derive(Debug, Default)]
pub struct ContestState {
    bank: Bank,
    constitution: ConstitutionStore,
    round: AtomicU32,
}

#[derive(Serialize, Deserialize)]
struct PersistedState {
    round: u32,
    ledger: Vec<LedgerEntry>,
    constitution: Vec<ConstitutionVersion>,
}

impl ContestState {
    /// Fresh state under the default constitution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh state whose first constitution is `text`.
    pub fn with_constitution(text: impl Into<String>) -> Self {
        ContestState {
            bank: Bank::new(),
            constitution: ConstitutionStore::new(text),
            round: AtomicU32::new(0),
        }
    }

    #[allow(missing_docs)]
    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    #[allow(missing_docs)]
    pub fn constitution(&self) -> &ConstitutionStore {
        &self.constitution
    }

    /// Last round started, 0 before the first one.
    pub fn round(&self) -> u32 {
        self.round.load(Ordering::SeqCst)
    }

    /// Allocate the next round number.
    pub(crate) fn next_round(&self) -> u32 {
        self.round.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Write the ledger and the constitution history to `path` as JSON.
    #[instrument(skip(self))]
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let persisted = PersistedState {
            round: self.round(),
            ledger: self.bank.entries(),
            constitution: self.constitution.versions(),
        };
        let file = File::create(path)
            .with_context(|| format!("could not create state file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &persisted)
            .context("could not serialize contest state")?;
        writer.flush().context("could not write contest state")?;
        info!(round = persisted.round, "contest state saved");
        Ok(())
    }

    /// Restore a state written by [`save`](Self::save). Rounds continue after the last
    /// saved one.
    #[instrument]
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("could not open state file {}", path.display()))?;
        let persisted: PersistedState = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("invalid state file {}", path.display()))?;

        let last_round = persisted
            .ledger
            .iter()
            .map(|e| e.round)
            .chain(
                persisted
                    .constitution
                    .iter()
                    .map(|v| v.active_from_round.saturating_sub(1)),
            )
            .fold(persisted.round, u32::max);
        let constitution = ConstitutionStore::from_versions(persisted.constitution)?;
        info!(round = last_round, "contest state loaded");

        Ok(ContestState {
            bank: Bank::from_entries(persisted.ledger),
            constitution,
            round: AtomicU32::new(last_round),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_are_allocated_in_order() {
        let state = ContestState::new();
        assert_eq!(state.round(), 0);
        assert_eq!(state.next_round(), 1);
        assert_eq!(state.next_round(), 2);
        assert_eq!(state.round(), 2);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let state = ContestState::with_constitution("be fair");
        let round = state.next_round();
        state.bank().credit("Alice", 990, "passed", round);
        state.bank().credit("Bob", -505, "failed", round);
        state.constitution().propose("be fairer", round + 1);
        state.save(&path).unwrap();

        let loaded = ContestState::load(&path).unwrap();
        assert_eq!(loaded.round(), 1);
        assert_eq!(loaded.bank().entries(), state.bank().entries());
        assert_eq!(loaded.constitution().versions(), state.constitution().versions());
        assert_eq!(loaded.constitution().current().text, "be fairer");
        assert_eq!(loaded.next_round(), 2);
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{\"round\": 1}").unwrap();
        assert!(ContestState::load(&path).is_err());
        assert!(ContestState::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn load_rejects_empty_constitution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{\"round\": 0, \"ledger\": [], \"constitution\": []}").unwrap();
        assert!(ContestState::load(&path).is_err());
    }
}
