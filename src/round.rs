//! What a round produces.

use serde::Serialize;

use crate::bank::{Amount, LedgerEntry, Standing};
use crate::error::ContestError;
use crate::evaluator::ConstitutionDecision;
use crate::sandbox::Verdict;
use crate::scoring::{Outcome, Score};

/// One developer's attempt at a round's problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    #[allow(missing_docs)]
    pub participant: String,
    #[allow(missing_docs)]
    pub round: u32,
    /// Extracted code, `None` when nothing usable was submitted.
    pub code: Option<String>,
    /// Sandbox verdict, `None` when the sandbox was not run.
    pub verdict: Option<Verdict>,
    #[allow(missing_docs)]
    pub outcome: Outcome,
    #[allow(missing_docs)]
    pub score: Score,
}

impl Submission {
    /// Seconds the latency penalty was computed from.
    pub fn elapsed_seconds(&self) -> f64 {
        self.verdict.as_ref().map_or(0.0, |v| v.elapsed_seconds)
    }
}

/// Everything that happened during one round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundResult {
    #[allow(missing_docs)]
    pub round: u32,
    #[allow(missing_docs)]
    pub problem_id: String,
    /// Constitution version the round was played under.
    pub constitution_version: u32,
    /// In developer registration order.
    pub submissions: Vec<Submission>,
    /// Ledger entries posted by the round, developers first.
    pub entries: Vec<LedgerEntry>,
    /// `None` if the evaluator stayed silent.
    pub decision: Option<ConstitutionDecision>,
    /// Version created by the evaluator, active from the next round.
    pub new_constitution_version: Option<u32>,
    /// Contained failures, in the order they happened.
    pub issues: Vec<ContestError>,
}

impl RoundResult {
    /// Net amount `participant` received during this round.
    pub fn delta(&self, participant: &str) -> Amount {
        self.entries
            .iter()
            .filter(|e| e.participant == participant)
            .map(|e| e.amount)
            .sum()
    }

    /// The submission of `participant`, if registered.
    pub fn submission(&self, participant: &str) -> Option<&Submission> {
        self.submissions.iter().find(|s| s.participant == participant)
    }
}

/// Final standings of a contest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContestSummary {
    /// Rounds played by this call, in order.
    pub rounds: Vec<RoundResult>,
    /// All accounts, richest first.
    pub leaderboard: Vec<Standing>,
    /// Richest developer; equal balances go to the first name in alphabetical order.
    pub winner: Option<String>,
    /// Money in the system.
    pub total: Amount,
}

/// Progress notifications sent by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum ContestEvent {
    RoundStarted {
        round: u32,
        problem_id: String,
        constitution_version: u32,
    },
    SubmissionReceived {
        round: u32,
        participant: String,
        outcome: Outcome,
    },
    RoundCompleted(Box<RoundResult>),
    ContestEnded {
        rounds: u32,
        leaderboard: Vec<Standing>,
        winner: Option<String>,
    },
}
