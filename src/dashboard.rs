//! Read-only views of a running contest.
//!
//! A [`Dashboard`] only reads committed state: it can be polled from another thread while
//! the engine plays rounds, and it never writes.

use std::fmt::{self, Display, Write};
use std::sync::Arc;

use serde::Serialize;

use crate::bank::{leaderboard_of, Amount, LedgerEntry, Standing};
use crate::constitution::ConstitutionVersion;
use crate::state::ContestState;

/// Everything a dashboard shows, at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    /// Last round started.
    pub round: u32,
    /// Richest first.
    pub leaderboard: Vec<Standing>,
    /// Money in the system.
    pub total: Amount,
    /// Whole ledger, in posting order.
    pub ledger: Vec<LedgerEntry>,
    /// Every constitution version, oldest first.
    pub constitution: Vec<ConstitutionVersion>,
}

/// One line of a [`ConstitutionDiff`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "line", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum DiffLine {
    Same(String),
    Added(String),
    Removed(String),
}

impl Display for DiffLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffLine::Same(line) => write!(f, "  {line}"),
            DiffLine::Added(line) => write!(f, "+ {line}"),
            DiffLine::Removed(line) => write!(f, "- {line}"),
        }
    }
}

/// Line diff between two constitution versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstitutionDiff {
    #[allow(missing_docs)]
    pub from: u32,
    #[allow(missing_docs)]
    pub to: u32,
    #[allow(missing_docs)]
    pub lines: Vec<DiffLine>,
}

impl ConstitutionDiff {
    /// Whether both versions hold the same text.
    pub fn is_unchanged(&self) -> bool {
        self.lines.iter().all(|l| matches!(l, DiffLine::Same(_)))
    }
}

impl Display for ConstitutionDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- v{}", self.from)?;
        writeln!(f, "+++ v{}", self.to)?;
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Read-only access to a [`ContestState`].
#[derive(Debug, Clone)]
pub struct Dashboard {
    state: Arc<ContestState>,
}

impl Dashboard {
    #[allow(missing_docs)]
    pub fn new(state: Arc<ContestState>) -> Self {
        Dashboard { state }
    }

    /// Copy of the current state. Balances and total are computed from the copied ledger.
    pub fn snapshot(&self) -> DashboardSnapshot {
        let ledger = self.state.bank().entries();
        DashboardSnapshot {
            round: self.state.round(),
            leaderboard: leaderboard_of(&ledger),
            total: ledger.iter().map(|e| e.amount).sum(),
            ledger,
            constitution: self.state.constitution().versions(),
        }
    }

    /// Ledger entries of one participant.
    pub fn history(&self, participant: &str) -> Vec<LedgerEntry> {
        self.state.bank().history(participant)
    }

    /// Diff from version `from` to version `to`, `None` if either does not exist.
    pub fn constitution_diff(&self, from: u32, to: u32) -> Option<ConstitutionDiff> {
        let store = self.state.constitution();
        let old = store.version(from)?;
        let new = store.version(to)?;
        Some(ConstitutionDiff {
            from,
            to,
            lines: diff_lines(&old.text, &new.text),
        })
    }

    /// Plain text summary: leaderboard, active constitution and latest change.
    pub fn render(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();

        let _ = writeln!(out, "Round {}", snapshot.round);
        let _ = writeln!(out);
        let _ = writeln!(out, "Balances (total {}):", snapshot.total);
        let width = snapshot
            .leaderboard
            .iter()
            .fold(0, |acu, standing| acu.max(standing.name.len()))
            + 3;
        for standing in &snapshot.leaderboard {
            let _ = writeln!(out, "  {:·<width$} {:>8}", standing.name, standing.balance);
        }

        if let Some(current) = snapshot.constitution.last() {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "Constitution v{} (active from round {}):",
                current.version, current.active_from_round
            );
            for line in current.text.lines() {
                let _ = writeln!(out, "  {line}");
            }
            if current.version > 1 {
                if let Some(diff) = self.constitution_diff(current.version - 1, current.version) {
                    let _ = writeln!(out);
                    let _ = write!(out, "{diff}");
                }
            }
        }
        out
    }
}

/// Longest common subsequence diff over lines.
fn diff_lines(old: &str, new: &str) -> Vec<DiffLine> {
    let old = old.lines().collect::<Vec<_>>();
    let new = new.lines().collect::<Vec<_>>();

    // lcs[i][j]: length of the LCS of old[i..] and new[j..]
    let mut lcs = vec![vec![0usize; new.len() + 1]; old.len() + 1];
    for i in (0..old.len()).rev() {
        for j in (0..new.len()).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut lines = Vec::with_capacity(old.len().max(new.len()));
    let (mut i, mut j) = (0, 0);
    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            lines.push(DiffLine::Same(old[i].to_string()));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            lines.push(DiffLine::Removed(old[i].to_string()));
            i += 1;
        } else {
            lines.push(DiffLine::Added(new[j].to_string()));
            j += 1;
        }
    }
    lines.extend(old[i..].iter().map(|l| DiffLine::Removed(l.to_string())));
    lines.extend(new[j..].iter().map(|l| DiffLine::Added(l.to_string())));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_marks_changed_lines() {
        let lines = diff_lines("a\nb\nc", "a\nB\nc\nd");
        assert_eq!(
            lines,
            vec![
                DiffLine::Same("a".into()),
                DiffLine::Removed("b".into()),
                DiffLine::Added("B".into()),
                DiffLine::Same("c".into()),
                DiffLine::Added("d".into()),
            ]
        );
    }

    #[test]
    fn diff_of_identical_texts() {
        let lines = diff_lines("x\ny", "x\ny");
        assert!(lines.iter().all(|l| matches!(l, DiffLine::Same(_))));
        assert_eq!(diff_lines("", "new"), vec![DiffLine::Added("new".into())]);
    }

    #[test]
    fn snapshot_and_render() {
        let state = Arc::new(ContestState::with_constitution("pass: +1000\nfail: -500"));
        let round = state.next_round();
        state.bank().credit("Alice", 990, "passed", round);
        state.bank().credit("Bob", -505, "failed", round);
        state.constitution().propose("pass: +1000\nfail: -800", round + 1);

        let dashboard = Dashboard::new(state.clone());
        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.round, 1);
        assert_eq!(snapshot.total, 485);
        assert_eq!(snapshot.leaderboard[0].name, "Alice");
        assert_eq!(snapshot.constitution.len(), 2);
        assert_eq!(dashboard.history("Bob").len(), 1);

        let diff = dashboard.constitution_diff(1, 2).unwrap();
        assert!(!diff.is_unchanged());
        assert_eq!(
            diff.to_string(),
            "--- v1\n+++ v2\n  pass: +1000\n- fail: -500\n+ fail: -800\n"
        );
        assert!(dashboard.constitution_diff(1, 3).is_none());

        let text = dashboard.render();
        assert!(text.contains("Constitution v2 (active from round 2)"));
        assert!(text.contains("+ fail: -800"));
        assert!(text.contains("Alice"));
    }

    #[test]
    fn snapshot_serializes() {
        let dashboard = Dashboard::new(Arc::new(ContestState::new()));
        let json = serde_json::to_value(dashboard.snapshot()).unwrap();
        assert_eq!(json["round"], 0);
        assert_eq!(json["constitution"][0]["version"], 1);
    }
}
