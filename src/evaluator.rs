//! The Principle Evaluator.
//!
//! After each round the evaluator sees the round's submissions and scores and answers
//! with an [`Evaluation`]: optional score adjustments and a [`ConstitutionDecision`].
//! The engine rewards every completed evaluation, so keeping the current rules pays as
//! much as rewriting them.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bank::Amount;
use crate::constitution::ConstitutionVersion;
use crate::problem::Problem;
use crate::round::Submission;

/// What the evaluator wants to do with the constitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "text", rename_all = "snake_case")]
pub enum ConstitutionDecision {
    /// Leave the rules as they are.
    Keep,
    /// Record this text as the next version. Blank text counts as [`Keep`](Self::Keep).
    Replace(String),
}

/// A score correction requested by the evaluator.
///
/// Amounts are clamped by the engine and adjustments to unknown developers are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    #[allow(missing_docs)]
    pub participant: String,
    #[allow(missing_docs)]
    pub amount: Amount,
    #[allow(missing_docs)]
    pub reason: String,
}

/// Output of a completed evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    #[allow(missing_docs)]
    pub adjustments: Vec<Adjustment>,
    #[allow(missing_docs)]
    pub decision: ConstitutionDecision,
}

impl Evaluation {
    /// No adjustment, constitution unchanged.
    pub fn keep() -> Evaluation {
        Evaluation {
            adjustments: Vec::new(),
            decision: ConstitutionDecision::Keep,
        }
    }

    /// No adjustment, constitution replaced by `text`.
    pub fn replace(text: impl Into<String>) -> Evaluation {
        Evaluation {
            adjustments: Vec::new(),
            decision: ConstitutionDecision::Replace(text.into()),
        }
    }

    #[allow(missing_docs)]
    pub fn with_adjustment(
        mut self,
        participant: impl Into<String>,
        amount: Amount,
        reason: impl Into<String>,
    ) -> Evaluation {
        self.adjustments.push(Adjustment {
            participant: participant.into(),
            amount,
            reason: reason.into(),
        });
        self
    }
}

/// What the evaluator is shown once a round is scored.
#[derive(Debug, Clone)]
pub struct EvaluationContext<'a> {
    #[allow(missing_docs)]
    pub round: u32,
    #[allow(missing_docs)]
    pub problem: &'a Problem,
    /// Constitution the round was played under.
    pub constitution: &'a ConstitutionVersion,
    #[allow(missing_docs)]
    pub submissions: &'a [Submission],
    /// Balances with the developers' entries for this round already posted.
    pub balances: BTreeMap<String, Amount>,
}

/// A judge of rounds, able to rewrite the rules.
pub trait Evaluator: Send + Sync {
    /// Evaluate a scored round.
    ///
    /// `Ok(None)` and errors mean no evaluation took place: nothing is rewarded and the
    /// constitution stays as it is.
    fn evaluate(&self, context: &EvaluationContext<'_>) -> anyhow::Result<Option<Evaluation>>;
}

impl<E: Evaluator + ?Sized> Evaluator for std::sync::Arc<E> {
    fn evaluate(&self, context: &EvaluationContext<'_>) -> anyhow::Result<Option<Evaluation>> {
        (**self).evaluate(context)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    submissions: u32,
    passed: u32,
    reward: Amount,
}

/// Deterministic evaluator that never adjusts scores.
///
/// After rounds 3 and 7, and every 10th round, it rewrites the constitution: the rule
/// lines are kept and a single performance line (success rate and average reward since
/// the evaluator was created) replaces the previous one.
#[derive(Debug, Default)]
pub struct RuleBasedEvaluator {
    tally: Mutex<Tally>,
}

/// Prefix of the line the [`RuleBasedEvaluator`] maintains.
pub const PERFORMANCE_LINE_PREFIX: &str = "Performance review";

impl RuleBasedEvaluator {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    fn should_amend(round: u32) -> bool {
        round == 3 || round == 7 || (round > 0 && round % 10 == 0)
    }

    fn amend(text: &str, round: u32, tally: &Tally) -> String {
        let success_rate = if tally.submissions == 0 {
            0.0
        } else {
            f64::from(tally.passed) * 100.0 / f64::from(tally.submissions)
        };
        let average_reward = if tally.submissions == 0 {
            0.0
        } else {
            tally.reward as f64 / f64::from(tally.submissions)
        };

        let mut rules = text
            .lines()
            .filter(|line| !line.starts_with(PERFORMANCE_LINE_PREFIX))
            .collect::<Vec<_>>()
            .join("\n")
            .trim_end()
            .to_string();
        rules.push_str(&format!(
            "\n\n{PERFORMANCE_LINE_PREFIX} after round {round}: {} submissions, success rate {success_rate:.1}%, average reward ${average_reward:.0}",
            tally.submissions
        ));
        rules
    }
}

impl Evaluator for RuleBasedEvaluator {
    fn evaluate(&self, context: &EvaluationContext<'_>) -> anyhow::Result<Option<Evaluation>> {
        let mut tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        for submission in context.submissions {
            tally.submissions += 1;
            tally.passed += u32::from(submission.outcome.is_pass());
            tally.reward += submission.score.total();
        }
        debug!(?tally, round = context.round, "round tallied");

        if !Self::should_amend(context.round) {
            return Ok(Some(Evaluation::keep()));
        }
        info!(round = context.round, "amending constitution");
        let text = Self::amend(&context.constitution.text, context.round, &tally);
        Ok(Some(Evaluation::replace(text)))
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::scoring::{Outcome, Score};

    fn submission(participant: &str, outcome: Outcome, total: Amount) -> Submission {
        Submission {
            participant: participant.to_string(),
            round: 1,
            code: None,
            verdict: None,
            outcome,
            score: Score {
                outcome_delta: total,
                latency_penalty: 0,
            },
        }
    }

    fn evaluate_round(evaluator: &RuleBasedEvaluator, round: u32, text: &str) -> Evaluation {
        let problem = Problem::new("001", "d", "", "t");
        let constitution = ConstitutionVersion {
            version: 1,
            text: text.to_string(),
            active_from_round: 0,
            recorded_at: OffsetDateTime::UNIX_EPOCH,
        };
        let submissions = [
            submission("Alice", Outcome::Passed, 990),
            submission("Bob", Outcome::TestFailure, -510),
        ];
        let context = EvaluationContext {
            round,
            problem: &problem,
            constitution: &constitution,
            submissions: &submissions,
            balances: BTreeMap::new(),
        };
        evaluator.evaluate(&context).unwrap().unwrap()
    }

    #[test]
    fn amends_on_schedule() {
        let evaluator = RuleBasedEvaluator::new();
        let amended = (1..=20)
            .filter(|&round| {
                evaluate_round(&evaluator, round, "rules").decision != ConstitutionDecision::Keep
            })
            .collect::<Vec<_>>();
        assert_eq!(amended, vec![3, 7, 10, 20]);
    }

    #[test]
    fn amendment_keeps_rules_and_replaces_review() {
        let evaluator = RuleBasedEvaluator::new();
        evaluate_round(&evaluator, 1, "rules");
        evaluate_round(&evaluator, 2, "rules");
        let decision = evaluate_round(&evaluator, 3, "rule one\nrule two").decision;
        let ConstitutionDecision::Replace(text) = decision else {
            panic!("round 3 must amend");
        };
        assert_eq!(
            text,
            "rule one\nrule two\n\nPerformance review after round 3: 6 submissions, success rate 50.0%, average reward $240"
        );

        let decision = evaluate_round(&evaluator, 7, &text).decision;
        let ConstitutionDecision::Replace(again) = decision else {
            panic!("round 7 must amend");
        };
        assert!(again.starts_with("rule one\nrule two\n\nPerformance review after round 7"));
        assert_eq!(again.matches(PERFORMANCE_LINE_PREFIX).count(), 1);
    }

    #[test]
    fn never_adjusts() {
        let evaluator = RuleBasedEvaluator::new();
        assert!(evaluate_round(&evaluator, 10, "rules").adjustments.is_empty());
    }
}
