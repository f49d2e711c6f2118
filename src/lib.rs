//! # Constitution Contest
//!
//! A coding contest in which developers submit solutions that are executed in a sandbox and
//! scored into a bank ledger, while a privileged Principle Evaluator is paid for every
//! evaluation, may adjust scores, and may rewrite the contest's rules (the constitution).
//!
//! It provides:
//! - Round and contest execution ([`ContestEngine`](crate::engine::ContestEngine))
//! - An append-only ledger ([`Bank`](crate::bank::Bank)) and an append-only, versioned
//!   [`ConstitutionStore`](crate::constitution::ConstitutionStore)
//! - The [`Developer`](crate::developer::Developer) and [`Evaluator`](crate::evaluator::Evaluator)
//!   traits, with a command-line developer and a deterministic rule-based evaluator
//! - A process-based [`Sandbox`](crate::sandbox::Sandbox) enforcing resource constraints
//!   through Linux cgroups v2 and `taskset`
//! - Read-only [`Dashboard`](crate::dashboard::Dashboard)s, including constitution diffs
//!
//! # Documentation Overview
//!
//! - For the round lifecycle and the failure policy, see the [`engine`] module.
//! - For scoring rules, see [`ScoringPolicy`](crate::scoring::ScoringPolicy).
//! - For configuring behavior, resource limits and execution environment, see
//!   [`Configuration`](crate::configuration::Configuration) and [`constraints`].
//! - For loading problems from disk, see [`problem_collector`].
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use constitution_contest::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::from_env();
//!     let constraints = ConstraintsBuilder::from_env().build()?;
//!     let timeout = constraints.execution_timeout();
//!     let sandbox = ProcessSandbox::new(Toolchain::python(), config, constraints);
//!
//!     let engine = ContestEngine::new(sandbox, RuleBasedEvaluator::new())
//!         .with_configuration(config)
//!         .with_default_timeout(timeout)
//!         .with_developer(CommandDeveloper::from_command_line("Alice", "./alice")?)
//!         .with_developer(CommandDeveloper::from_command_line("Bob", "./bob")?);
//!
//!     let state = Arc::new(ContestState::new());
//!     let dashboard = Dashboard::new(state.clone());
//!
//!     engine.run_contest(&state, &Problem::builtin());
//!     println!("{}", dashboard.render());
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

mod cgroup_manager;
pub use anyhow;
pub mod bank;
pub mod configuration;
pub mod constitution;
pub mod constraints;
pub mod dashboard;
pub mod developer;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod extraction;
pub mod logger;
pub mod participant;
pub mod problem;
pub mod problem_collector;
pub mod round;
pub mod sandbox;
pub mod scoring;
pub mod state;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use constitution_contest::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bank::{Amount, Bank, LedgerEntry};
    pub use crate::configuration::Configuration;
    pub use crate::constitution::{ConstitutionStore, DEFAULT_CONSTITUTION};
    pub use crate::constraints::ConstraintsBuilder;
    pub use crate::dashboard::Dashboard;
    pub use crate::developer::{CommandDeveloper, Developer, Feedback, StubDeveloper};
    pub use crate::engine::ContestEngine;
    pub use crate::error::ContestError;
    pub use crate::evaluator::{
        ConstitutionDecision, Evaluation, EvaluationContext, Evaluator, RuleBasedEvaluator,
    };
    pub use crate::problem::Problem;
    pub use crate::round::{ContestEvent, ContestSummary, RoundResult, Submission};
    pub use crate::sandbox::{ProcessSandbox, Sandbox, Toolchain, Verdict};
    pub use crate::scoring::{Outcome, ScoringPolicy};
    pub use crate::state::ContestState;
}
