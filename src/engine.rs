//! Core contest logic.
//!
//! The [`ContestEngine`] runs rounds against an explicit [`ContestState`]. One round:
//!
//! 1. allocates the next round number and snapshots the active constitution;
//! 2. queries every developer concurrently, extracts code from each response and runs it
//!    in the [`Sandbox`] under the problem's deadline;
//! 3. scores every submission with the [`ScoringPolicy`] and posts the developers' entries
//!    to the bank in one batch;
//! 4. asks the [`Evaluator`] for an evaluation, rewards it, applies its score adjustments
//!    and records a new constitution version when it asks for one;
//! 5. sends every developer its [`Feedback`].
//!
//! Collaborator failures (a developer erroring or panicking, a sandbox panicking, a
//! silent evaluator) never abort a round: they are recorded in
//! [`RoundResult::issues`] and only show up in the ledger.
//!
//! A constitution replaced during round `N` is active from round `N + 1`. Developers
//! querying in round `N` all saw the same version.
//!
//! # Example
//!
//! ```no_run
//! use constitution_contest::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::new().with_allow_uncontained(true);
//!     let constraints = ConstraintsBuilder::new().build()?;
//!     let sandbox = ProcessSandbox::new(Toolchain::python(), config, constraints);
//!
//!     let engine = ContestEngine::new(sandbox, RuleBasedEvaluator::new())
//!         .with_configuration(config)
//!         .with_developer(CommandDeveloper::from_command_line("Alice", "python3 alice.py")?)
//!         .with_developer(CommandDeveloper::from_command_line("Bob", "python3 bob.py")?);
//!
//!     let state = ContestState::new();
//!     let summary = engine.run_contest(&state, &Problem::builtin());
//!     println!("winner: {:?}", summary.winner);
//!     Ok(())
//! }
//! ```

use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::bank::{LedgerEntry, Standing};
use crate::configuration::Configuration;
use crate::constraints::DEFAULT_EXECUTION_TIMEOUT;
use crate::developer::{Developer, Feedback};
use crate::error::ContestError;
use crate::evaluator::{Adjustment, ConstitutionDecision, EvaluationContext, Evaluator};
use crate::extraction::extract_code;
use crate::participant::{Participant, EVALUATOR_NAME};
use crate::problem::Problem;
use crate::round::{ContestEvent, ContestSummary, RoundResult, Submission};
use crate::sandbox::{Sandbox, Verdict};
use crate::scoring::{Outcome, ScoringPolicy};
use crate::state::ContestState;

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const DEFAULT: &str = "\x1b[39m";

type Attempt = (Submission, Option<ContestError>);

/// Runs rounds between registered developers, judged by one evaluator.
pub struct ContestEngine {
    developers: Vec<Box<dyn Developer>>,
    evaluator: Box<dyn Evaluator>,
    sandbox: Box<dyn Sandbox>,
    config: Configuration,
    policy: ScoringPolicy,
    default_timeout: Duration,
    events: Option<Sender<ContestEvent>>,
}

impl ContestEngine {
    /// Engine without developers, using the default [`Configuration`] and [`ScoringPolicy`].
    pub fn new(sandbox: impl Sandbox + 'static, evaluator: impl Evaluator + 'static) -> Self {
        ContestEngine {
            developers: Vec::new(),
            evaluator: Box::new(evaluator),
            sandbox: Box::new(sandbox),
            config: Configuration::default(),
            policy: ScoringPolicy::default(),
            default_timeout: DEFAULT_EXECUTION_TIMEOUT,
            events: None,
        }
    }

    /// Register a developer. Names must be unique and differ from the evaluator's;
    /// a developer with a taken name is ignored.
    pub fn with_developer(self, developer: impl Developer + 'static) -> Self {
        self.with_boxed_developer(Box::new(developer))
    }

    /// Same as [`with_developer`](Self::with_developer), for developers chosen at runtime.
    pub fn with_boxed_developer(mut self, developer: Box<dyn Developer>) -> Self {
        let name = developer.name();
        if name == EVALUATOR_NAME || self.is_developer(name) {
            warn!(name, "name already taken, developer ignored");
            return self;
        }
        self.developers.push(developer);
        self
    }

    #[allow(missing_docs)]
    pub fn with_configuration(mut self, config: Configuration) -> Self {
        self.config = config;
        self
    }

    #[allow(missing_docs)]
    pub fn with_scoring_policy(mut self, policy: ScoringPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Deadline for problems that do not set their own.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Send [`ContestEvent`]s to `sender`. Sending never blocks and a dropped receiver is
    /// ignored.
    pub fn with_event_sender(mut self, sender: Sender<ContestEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Registered developer names, in registration order.
    pub fn developers(&self) -> Vec<&str> {
        self.developers.iter().map(|d| d.name()).collect()
    }

    /// Every account the engine posts to: the developers, then the evaluator.
    pub fn participants(&self) -> Vec<Participant> {
        self.developers
            .iter()
            .map(|d| Participant::developer(d.name()))
            .chain(std::iter::once(Participant::evaluator()))
            .collect()
    }

    #[allow(missing_docs)]
    pub fn scoring_policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    fn emit(&self, event: ContestEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn is_developer(&self, name: &str) -> bool {
        self.developers.iter().any(|d| d.name() == name)
    }

    /// Play `problem` as the next round of `state`.
    #[instrument(skip_all, fields(problem = %problem.id))]
    pub fn run_round(&self, state: &ContestState, problem: &Problem) -> RoundResult {
        let round = state.next_round();
        let constitution = state.constitution().current();
        let bank = state.bank();
        for developer in &self.developers {
            bank.open_account(developer.name());
        }
        bank.open_account(EVALUATOR_NAME);

        info!(round, constitution = constitution.version, "round started");
        self.emit(ContestEvent::RoundStarted {
            round,
            problem_id: problem.id.clone(),
            constitution_version: constitution.version,
        });
        if self.config.verbose {
            print_round_start(round, problem, constitution.version);
        }

        // 1. submissions
        let timeout = problem.timeout.unwrap_or(self.default_timeout);
        let mut issues = Vec::new();
        let mut submissions = Vec::with_capacity(self.developers.len());
        let attempts = self.collect_submissions(round, problem, &constitution.text, timeout);
        for (submission, issue) in attempts {
            issues.extend(issue);
            submissions.push(submission);
        }

        // 2. developer entries, one batch
        let mut entries = submissions
            .iter()
            .map(|s| LedgerEntry::new(&s.participant, s.score.total(), describe(problem, s), round))
            .collect::<Vec<_>>();
        bank.post(&entries);

        // 3. evaluation
        let context = EvaluationContext {
            round,
            problem,
            constitution: &constitution,
            submissions: &submissions,
            balances: bank.balances(),
        };
        let evaluation = match panic::catch_unwind(AssertUnwindSafe(|| {
            self.evaluator.evaluate(&context)
        })) {
            Ok(Ok(evaluation)) => evaluation,
            Ok(Err(e)) => {
                warn!("evaluator failed: {e:#}");
                None
            }
            Err(_) => {
                error!("evaluator panicked");
                None
            }
        };

        let mut new_constitution_version = None;
        let decision = match evaluation {
            None => {
                issues.push(ContestError::EvaluatorSilent);
                None
            }
            Some(evaluation) => {
                let evaluator_entries = self.evaluator_entries(round, &evaluation.adjustments);
                bank.post(&evaluator_entries);
                entries.extend(evaluator_entries);

                match &evaluation.decision {
                    ConstitutionDecision::Replace(text) if !text.trim().is_empty() => {
                        new_constitution_version =
                            Some(state.constitution().propose(text.clone(), round + 1));
                    }
                    _ => issues.push(ContestError::EvaluatorAbstained),
                }
                Some(evaluation.decision)
            }
        };

        // 4. feedback
        let next_constitution = state.constitution().current();
        for (developer, submission) in self.developers.iter().zip(&submissions) {
            let feedback = Feedback {
                round,
                problem_id: problem.id.clone(),
                outcome: submission.outcome,
                delta: submission.score.total(),
                balance: bank.balance(developer.name()),
                constitution: next_constitution.text.clone(),
                output: submission
                    .verdict
                    .as_ref()
                    .map(|v| v.output.clone())
                    .unwrap_or_default(),
            };
            if panic::catch_unwind(AssertUnwindSafe(|| developer.feedback(&feedback))).is_err() {
                error!(developer = developer.name(), "feedback panicked");
            }
        }

        let result = RoundResult {
            round,
            problem_id: problem.id.clone(),
            constitution_version: constitution.version,
            submissions,
            entries,
            decision,
            new_constitution_version,
            issues,
        };
        info!(round, issues = result.issues.len(), "round completed");
        if self.config.verbose {
            print_round_result(&result);
        }
        self.emit(ContestEvent::RoundCompleted(Box::new(result.clone())));
        result
    }

    /// Play one round per problem, in order, and rank the participants.
    pub fn run_contest(&self, state: &ContestState, problems: &[Problem]) -> ContestSummary {
        let rounds = problems
            .iter()
            .map(|problem| self.run_round(state, problem))
            .collect::<Vec<_>>();

        let leaderboard = state.bank().leaderboard();
        let winner = leaderboard
            .iter()
            .find(|standing| self.is_developer(&standing.name))
            .map(|standing| standing.name.clone());
        info!(?winner, rounds = rounds.len(), "contest ended");

        if self.config.verbose {
            print_leaderboard(&leaderboard, winner.as_deref());
        }
        self.emit(ContestEvent::ContestEnded {
            rounds: rounds.len() as u32,
            leaderboard: leaderboard.clone(),
            winner: winner.clone(),
        });

        ContestSummary {
            rounds,
            leaderboard,
            winner,
            total: state.bank().total(),
        }
    }

    fn collect_submissions(
        &self,
        round: u32,
        problem: &Problem,
        constitution: &str,
        timeout: Duration,
    ) -> Vec<Attempt> {
        if self.config.sequential_developers {
            return self
                .developers
                .iter()
                .map(|developer| {
                    let attempt =
                        self.attempt(developer.as_ref(), round, problem, constitution, timeout);
                    self.submission_received(&attempt.0);
                    attempt
                })
                .collect();
        }

        let (tx, rx) = mpsc::channel();
        let mut attempts = std::thread::scope(|s| {
            for (index, developer) in self.developers.iter().enumerate() {
                let tx = tx.clone();
                s.spawn(move || {
                    let attempt =
                        self.attempt(developer.as_ref(), round, problem, constitution, timeout);
                    let _ = tx.send((index, attempt));
                });
            }
            drop(tx);

            // barrier: the iterator ends once every developer thread is done
            rx.iter()
                .inspect(|(_, (submission, _))| self.submission_received(submission))
                .collect::<Vec<_>>()
        });
        attempts.sort_by_key(|(index, _)| *index);
        attempts.into_iter().map(|(_, attempt)| attempt).collect()
    }

    fn submission_received(&self, submission: &Submission) {
        debug!(
            participant = %submission.participant,
            outcome = %submission.outcome,
            "submission received"
        );
        self.emit(ContestEvent::SubmissionReceived {
            round: submission.round,
            participant: submission.participant.clone(),
            outcome: submission.outcome,
        });
    }

    #[instrument(skip_all, fields(developer = developer.name()))]
    fn attempt(
        &self,
        developer: &dyn Developer,
        round: u32,
        problem: &Problem,
        constitution: &str,
        timeout: Duration,
    ) -> Attempt {
        let participant = developer.name().to_string();
        let response = match panic::catch_unwind(AssertUnwindSafe(|| {
            developer.query(problem, constitution)
        })) {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("developer failed: {e:#}");
                None
            }
            Err(_) => {
                error!("developer panicked");
                None
            }
        };

        let Some(code) = response.and_then(|r| extract_code(&r, problem.function_name())) else {
            let outcome = Outcome::Missing;
            let submission = Submission {
                participant: participant.clone(),
                round,
                code: None,
                verdict: None,
                outcome,
                score: self.policy.score(outcome, 0.0),
            };
            return (submission, Some(ContestError::MissingSubmission { participant }));
        };

        let verdict = match panic::catch_unwind(AssertUnwindSafe(|| {
            self.sandbox.execute(&code, &problem.tests, timeout)
        })) {
            Ok(verdict) => verdict.enforce_deadline(timeout),
            Err(_) => {
                error!("sandbox panicked");
                Verdict::test_failure(0.0, "sandbox panicked")
            }
        };

        let outcome = Outcome::from_verdict(&verdict);
        let issue = match outcome {
            Outcome::Passed => None,
            Outcome::CompileError => Some(ContestError::CompileError {
                participant: participant.clone(),
            }),
            Outcome::Timeout => Some(ContestError::Timeout {
                participant: participant.clone(),
                after: timeout,
            }),
            Outcome::TestFailure | Outcome::Missing => Some(ContestError::TestFailure {
                participant: participant.clone(),
            }),
        };
        let score = self.policy.score(outcome, verdict.elapsed_seconds);
        debug!(%outcome, total = score.total(), "scored");

        let submission = Submission {
            participant,
            round,
            code: Some(code),
            verdict: Some(verdict),
            outcome,
            score,
        };
        (submission, issue)
    }

    /// The evaluation reward followed by the accepted adjustments.
    fn evaluator_entries(&self, round: u32, adjustments: &[Adjustment]) -> Vec<LedgerEntry> {
        let mut entries = vec![LedgerEntry::new(
            EVALUATOR_NAME,
            self.policy.evaluation_reward,
            format!("evaluation of round {round}"),
            round,
        )];
        for adjustment in adjustments {
            if !self.is_developer(&adjustment.participant) {
                warn!(
                    participant = %adjustment.participant,
                    "adjustment for unknown developer ignored"
                );
                continue;
            }
            let amount = self.policy.clamp_adjustment(adjustment.amount);
            if amount != adjustment.amount {
                warn!(
                    participant = %adjustment.participant,
                    requested = adjustment.amount,
                    amount,
                    "adjustment clamped"
                );
            }
            entries.push(LedgerEntry::new(
                &adjustment.participant,
                amount,
                format!("evaluator adjustment: {}", adjustment.reason),
                round,
            ));
        }
        entries
    }
}

fn describe(problem: &Problem, submission: &Submission) -> String {
    format!(
        "problem {}: {} ({:+}), latency {:.2}s ({:+})",
        problem.id,
        submission.outcome,
        submission.score.outcome_delta,
        submission.elapsed_seconds(),
        submission.score.latency_penalty
    )
}

fn print_round_start(round: u32, problem: &Problem, constitution_version: u32) {
    print!(
        "{GREEN}Round {round}{DEFAULT}: problem {} (constitution v{constitution_version})... ",
        problem.id
    );
    let _ = std::io::stdout().flush();
}

fn print_round_result(result: &RoundResult) {
    let submissions = result
        .submissions
        .iter()
        .map(|s| {
            let color = if s.outcome.is_pass() { GREEN } else { RED };
            format!(
                "{}: {color}{}{DEFAULT} {:+}",
                s.participant,
                s.outcome,
                s.score.total()
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    let evaluator = match (&result.decision, result.new_constitution_version) {
        (None, _) => format!("{RED}evaluator silent{DEFAULT}"),
        (Some(_), Some(version)) => format!("{YELLOW}constitution v{version}{DEFAULT}"),
        (Some(_), None) => "constitution kept".to_string(),
    };
    println!("{submissions} | {evaluator}");
}

fn print_leaderboard(leaderboard: &[Standing], winner: Option<&str>) {
    let width = leaderboard
        .iter()
        .fold(0, |acu, standing| acu.max(standing.name.len()))
        + 3; // at least 3 dots
    println!("Leaderboard:");
    for standing in leaderboard {
        let color = if Some(standing.name.as_str()) == winner {
            GREEN
        } else {
            DEFAULT
        };
        println!(
            "{color}{:·<width$} {:>8}{DEFAULT}",
            standing.name, standing.balance
        );
    }
}
