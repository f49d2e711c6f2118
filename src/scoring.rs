//! Turning sandbox verdicts into money.
//!
//! The policy is fixed per contest and does not read the constitution text: the
//! evaluator influences money only through explicit adjustments.

use serde::{Deserialize, Serialize};

use crate::bank::Amount;
use crate::sandbox::Verdict;

/// What happened to one developer's submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every test passed.
    Passed,
    /// The check/compile step rejected the code.
    CompileError,
    /// At least one test failed.
    TestFailure,
    /// The sandbox deadline was hit.
    Timeout,
    /// The developer produced nothing.
    Missing,
}

impl Outcome {
    /// Classify a verdict. A timeout wins over everything else, then compile errors.
    pub fn from_verdict(verdict: &Verdict) -> Outcome {
        if verdict.timed_out {
            Outcome::Timeout
        } else if verdict.compile_error {
            Outcome::CompileError
        } else if verdict.passed {
            Outcome::Passed
        } else {
            Outcome::TestFailure
        }
    }

    #[allow(missing_docs)]
    pub fn is_pass(self) -> bool {
        self == Outcome::Passed
    }

    /// Short label used in ledger reasons.
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Passed => "all tests pass",
            Outcome::CompileError => "compilation error",
            Outcome::TestFailure => "failing tests",
            Outcome::Timeout => "timeout",
            Outcome::Missing => "no submission",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Money a single submission earned, split into its two components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    /// Reward or penalty for the outcome.
    pub outcome_delta: Amount,
    /// Never positive.
    pub latency_penalty: Amount,
}

impl Score {
    /// What gets posted to the bank.
    pub fn total(&self) -> Amount {
        self.outcome_delta + self.latency_penalty
    }
}

/// Reward constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// Granted when every test passes.
    pub pass_reward: Amount,
    /// Taken (as a positive number) for any failing outcome.
    pub failure_penalty: Amount,
    /// Taken per second of measured latency, whatever the outcome.
    pub latency_penalty_per_second: Amount,
    /// Granted to the evaluator for each completed evaluation.
    pub evaluation_reward: Amount,
    /// Evaluator adjustments are clamped to `[-cap, cap]`.
    pub adjustment_cap: Amount,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        ScoringPolicy {
            pass_reward: 1000,
            failure_penalty: 500,
            latency_penalty_per_second: 5,
            evaluation_reward: 1000,
            adjustment_cap: 10_000,
        }
    }
}

impl ScoringPolicy {
    #[allow(missing_docs)]
    pub fn outcome_delta(&self, outcome: Outcome) -> Amount {
        if outcome.is_pass() {
            self.pass_reward
        } else {
            -self.failure_penalty
        }
    }

    /// `-(rate x seconds)`, rounded to whole units. Negative or non-finite durations cost nothing.
    pub fn latency_penalty(&self, elapsed_seconds: f64) -> Amount {
        if !elapsed_seconds.is_finite() || elapsed_seconds <= 0.0 {
            return 0;
        }
        let penalty = (self.latency_penalty_per_second as f64 * elapsed_seconds).round() as Amount;
        -penalty
    }

    #[allow(missing_docs)]
    pub fn score(&self, outcome: Outcome, elapsed_seconds: f64) -> Score {
        Score {
            outcome_delta: self.outcome_delta(outcome),
            latency_penalty: self.latency_penalty(elapsed_seconds),
        }
    }

    #[allow(missing_docs)]
    pub fn clamp_adjustment(&self, amount: Amount) -> Amount {
        amount.clamp(-self.adjustment_cap, self.adjustment_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(passed: bool, compile_error: bool, timed_out: bool) -> Verdict {
        Verdict {
            passed,
            compile_error,
            timed_out,
            elapsed_seconds: 1.0,
            output: String::new(),
        }
    }

    #[test]
    fn classification_priority() {
        assert_eq!(Outcome::from_verdict(&verdict(true, false, false)), Outcome::Passed);
        assert_eq!(Outcome::from_verdict(&verdict(false, false, false)), Outcome::TestFailure);
        assert_eq!(Outcome::from_verdict(&verdict(true, true, false)), Outcome::CompileError);
        assert_eq!(Outcome::from_verdict(&verdict(true, true, true)), Outcome::Timeout);
    }

    #[test]
    fn pass_and_failure_deltas() {
        let policy = ScoringPolicy::default();
        assert_eq!(policy.score(Outcome::Passed, 2.0).total(), 990);
        assert_eq!(policy.score(Outcome::CompileError, 1.0).total(), -505);
        assert_eq!(policy.score(Outcome::Missing, 0.0).total(), -500);
    }

    #[test]
    fn compile_error_never_earns_the_pass_reward() {
        let policy = ScoringPolicy::default();
        for secs in [0.0, 0.4, 1.0, 7.25, 30.0] {
            let score = policy.score(Outcome::CompileError, secs);
            assert_eq!(score.outcome_delta, -500);
            assert_eq!(score.total(), -500 + policy.latency_penalty(secs));
        }
    }

    #[test]
    fn latency_is_rounded_and_never_positive() {
        let policy = ScoringPolicy::default();
        assert_eq!(policy.latency_penalty(0.0), 0);
        assert_eq!(policy.latency_penalty(0.09), 0);
        assert_eq!(policy.latency_penalty(0.1), -1);
        assert_eq!(policy.latency_penalty(1.5), -8);
        assert_eq!(policy.latency_penalty(-3.0), 0);
        assert_eq!(policy.latency_penalty(f64::NAN), 0);
    }

    #[test]
    fn adjustments_are_clamped() {
        let policy = ScoringPolicy::default();
        assert_eq!(policy.clamp_adjustment(25_000), 10_000);
        assert_eq!(policy.clamp_adjustment(-25_000), -10_000);
        assert_eq!(policy.clamp_adjustment(-42), -42);
    }
}
