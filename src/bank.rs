//! Append-only ledger of credits and debits.
//!
//! The [`Bank`] never stores a balance: every balance is a fold over the ledger, so
//! [`Bank::balance`] is always consistent with [`Bank::history`]. Entries are immutable
//! once appended and all writes go through a single lock, so appends coming from
//! concurrent rounds are serialized.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, instrument};

/// Whole currency units.
pub type Amount = i64;

/// One immutable line of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Account the amount is booked on.
    pub participant: String,
    /// Signed amount, negative for debits.
    pub amount: Amount,
    /// Human readable reason.
    pub reason: String,
    /// Round the entry belongs to. Round 0 is account opening.
    pub round: u32,
    /// Wall clock time the entry was created.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl LedgerEntry {
    /// Create an entry stamped with the current time.
    pub fn new(
        participant: impl Into<String>,
        amount: Amount,
        reason: impl Into<String>,
        round: u32,
    ) -> LedgerEntry {
        LedgerEntry {
            participant: participant.into(),
            amount,
            reason: reason.into(),
            round,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// A name and its current balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub balance: Amount,
}

/// The ledger.
#[derive(Debug, Default)]
pub struct Bank {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl Bank {
    /// Empty ledger.
    pub fn new() -> Bank {
        Bank::default()
    }

    /// Rebuild a bank from previously persisted entries.
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Bank {
        Bank {
            entries: Mutex::new(entries),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LedgerEntry>> {
        // entries are only ever pushed, a poisoned lock still holds a valid ledger
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open an account with a zero entry so it shows up in the leaderboard.
    ///
    /// Does nothing if the participant already has entries.
    pub fn open_account(&self, participant: &str) {
        let mut guard = self.lock();
        if guard.iter().any(|e| e.participant == participant) {
            return;
        }
        guard.push(LedgerEntry::new(participant, 0, "initial registration", 0));
    }

    /// Append a single entry and return a copy of it.
    #[instrument(skip(self, reason))]
    pub fn credit(
        &self,
        participant: &str,
        amount: Amount,
        reason: impl Into<String>,
        round: u32,
    ) -> LedgerEntry {
        let entry = LedgerEntry::new(participant, amount, reason, round);
        self.lock().push(entry.clone());
        debug!(reason = %entry.reason, "posted");
        entry
    }

    /// Append a batch of entries atomically: readers see either none or all of them.
    pub fn post(&self, entries: &[LedgerEntry]) {
        let mut guard = self.lock();
        guard.extend_from_slice(entries);
        debug!(count = entries.len(), ledger_size = guard.len(), "batch posted");
    }

    /// Current balance of `participant` (0 for unknown names).
    pub fn balance(&self, participant: &str) -> Amount {
        self.lock()
            .iter()
            .filter(|e| e.participant == participant)
            .map(|e| e.amount)
            .sum()
    }

    /// Balance of `participant` counting only rounds `..=round`.
    pub fn balance_at(&self, participant: &str, round: u32) -> Amount {
        self.lock()
            .iter()
            .filter(|e| e.participant == participant && e.round <= round)
            .map(|e| e.amount)
            .sum()
    }

    /// Sum of the entries `participant` received in exactly `round`.
    pub fn round_delta(&self, participant: &str, round: u32) -> Amount {
        self.lock()
            .iter()
            .filter(|e| e.participant == participant && e.round == round)
            .map(|e| e.amount)
            .sum()
    }

    /// Entries of `participant`, in posting order.
    pub fn history(&self, participant: &str) -> Vec<LedgerEntry> {
        self.lock()
            .iter()
            .filter(|e| e.participant == participant)
            .cloned()
            .collect()
    }

    /// Snapshot of the whole ledger.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.lock().clone()
    }

    /// Every known account and its balance.
    pub fn balances(&self) -> BTreeMap<String, Amount> {
        fold_balances(&self.lock())
    }

    /// Accounts sorted by balance, richest first. Equal balances are ordered by name.
    pub fn leaderboard(&self) -> Vec<Standing> {
        leaderboard_of(&self.lock())
    }

    /// Money in the system.
    pub fn total(&self) -> Amount {
        self.lock().iter().map(|e| e.amount).sum()
    }
}

fn fold_balances(entries: &[LedgerEntry]) -> BTreeMap<String, Amount> {
    let mut balances = BTreeMap::new();
    for entry in entries {
        *balances.entry(entry.participant.clone()).or_insert(0) += entry.amount;
    }
    balances
}

/// Leaderboard of an already copied ledger, ordered like [`Bank::leaderboard`].
pub fn leaderboard_of(entries: &[LedgerEntry]) -> Vec<Standing> {
    let mut standings = fold_balances(entries)
        .into_iter()
        .map(|(name, balance)| Standing { name, balance })
        .collect::<Vec<_>>();
    // BTreeMap already yields names in order and the sort is stable
    standings.sort_by(|a, b| b.balance.cmp(&a.balance));
    standings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_is_fold_of_history() {
        let bank = Bank::new();
        bank.credit("Alice", 1000, "pass", 1);
        bank.credit("Alice", -505, "fail", 2);
        bank.credit("Bob", 42, "pass", 1);

        let history = bank.history("Alice");
        assert_eq!(history.len(), 2);
        assert_eq!(
            bank.balance("Alice"),
            history.iter().map(|e| e.amount).sum::<Amount>()
        );
        assert_eq!(bank.balance("Alice"), 495);
        assert_eq!(bank.balance("Nobody"), 0);
        assert_eq!(bank.total(), 537);
    }

    #[test]
    fn balance_at_only_counts_past_rounds() {
        let bank = Bank::new();
        bank.credit("Alice", 990, "r1", 1);
        bank.credit("Alice", -505, "r2", 2);
        bank.credit("Alice", 100, "r3", 3);

        assert_eq!(bank.balance_at("Alice", 0), 0);
        assert_eq!(bank.balance_at("Alice", 2), 485);
        assert_eq!(bank.balance_at("Alice", 3), bank.balance("Alice"));
        assert_eq!(bank.round_delta("Alice", 2), -505);
    }

    #[test]
    fn leaderboard_sorts_by_balance_then_name() {
        let bank = Bank::new();
        bank.open_account("Bob");
        bank.open_account("Alice");
        bank.open_account("Alice");
        bank.credit("Carol", 10, "x", 1);

        let board = bank.leaderboard();
        let names = board.iter().map(|s| s.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Carol", "Alice", "Bob"]);
        assert_eq!(bank.history("Alice").len(), 1);
    }

    #[test]
    fn batch_post_keeps_order() {
        let bank = Bank::new();
        bank.post(&[
            LedgerEntry::new("Alice", 1, "a", 1),
            LedgerEntry::new("Alice", 2, "b", 1),
        ]);
        let reasons = bank
            .history("Alice")
            .into_iter()
            .map(|e| e.reason)
            .collect::<Vec<_>>();
        assert_eq!(reasons, vec!["a", "b"]);
    }

    #[test]
    fn concurrent_credits_are_all_kept() {
        let bank = Bank::new();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        bank.credit("Alice", 1, "tick", 1);
                    }
                });
            }
        });
        assert_eq!(bank.balance("Alice"), 800);
        assert_eq!(bank.history("Alice").len(), 800);
    }
}
