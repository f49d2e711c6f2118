//! Run a full contest from the command line.
//!
//! Everything is configured through environment variables:
//!
//! - `CONTEST_ALICE_CMD`, `CONTEST_BOB_CMD`: command lines of the two developers. An unset
//!   developer submits the problem stub unchanged.
//! - `CONTEST_RESPONSE_TIMEOUT_MS`: time given to a developer command to answer
//! - `CONTEST_PROBLEM_DIR`: load problems from this directory instead of the built-in ones
//! - `CONTEST_TOOLCHAIN`: `python` (default), `shell` or `custom`. A custom toolchain reads
//!   `CONTEST_TOOLCHAIN_SOURCE`, `CONTEST_TOOLCHAIN_TEST`, `CONTEST_TOOLCHAIN_RUN` and the
//!   optional `CONTEST_TOOLCHAIN_CHECK` (see `Toolchain::from_command_lines`)
//! - `CONTEST_STATE_FILE`: resume from this JSON file if it exists, and save to it at the end
//! - `CONTEST_LOG_DIR`: directory of the log file when `CONTEST_LOG=true` (default: `.`)
//!
//! plus the variables read by `Configuration::from_env` and `ConstraintsBuilder::from_env`.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use constitution_contest::logger::init_logger;
use constitution_contest::prelude::*;
use constitution_contest::problem_collector::collect_problems;

fn developer(name: &str, var: &str) -> anyhow::Result<Box<dyn Developer>> {
    let Ok(command_line) = env::var(var) else {
        return Ok(Box::new(StubDeveloper::new(name)));
    };
    let mut developer = CommandDeveloper::from_command_line(name, &command_line)
        .with_context(|| format!("invalid {var}"))?;
    if let Ok(ms) = env::var("CONTEST_RESPONSE_TIMEOUT_MS") {
        let ms = ms
            .parse::<u64>()
            .context("CONTEST_RESPONSE_TIMEOUT_MS must be a number of milliseconds")?;
        developer = developer.with_response_timeout(Duration::from_millis(ms));
    }
    Ok(Box::new(developer))
}

fn toolchain() -> anyhow::Result<Toolchain> {
    match env::var("CONTEST_TOOLCHAIN").as_deref() {
        Err(_) | Ok("python") => Ok(Toolchain::python()),
        Ok("shell") => Ok(Toolchain::shell()),
        Ok("custom") => {
            let var = |name: &str| env::var(name).with_context(|| format!("{name} is not set"));
            let check = env::var("CONTEST_TOOLCHAIN_CHECK").ok();
            Toolchain::from_command_lines(
                &var("CONTEST_TOOLCHAIN_SOURCE")?,
                &var("CONTEST_TOOLCHAIN_TEST")?,
                check.as_deref(),
                &var("CONTEST_TOOLCHAIN_RUN")?,
            )
        }
        Ok(other) => bail!("unknown toolchain '{other}', expected 'python', 'shell' or 'custom'"),
    }
}

fn problems(verbose: bool) -> anyhow::Result<Vec<Problem>> {
    let Ok(dir) = env::var("CONTEST_PROBLEM_DIR") else {
        return Ok(Problem::builtin());
    };
    let problems = collect_problems(Path::new(&dir), verbose)?;
    if problems.is_empty() {
        bail!("no valid problem found in {dir}");
    }
    Ok(problems)
}

fn state(path: Option<&Path>) -> anyhow::Result<ContestState> {
    match path {
        Some(path) if path.exists() => ContestState::load(path),
        _ => Ok(ContestState::new()),
    }
}

fn main() -> anyhow::Result<()> {
    let config = Configuration::from_env();
    if config.log_enabled() {
        let dir = env::var("CONTEST_LOG_DIR").unwrap_or_else(|_| ".".to_string());
        let path = init_logger(Path::new(&dir))?;
        if config.verbose_enabled() {
            println!("Logging to {}", path.display());
        }
    }

    let constraints = ConstraintsBuilder::from_env().build()?;
    let timeout = constraints.execution_timeout();
    let sandbox = ProcessSandbox::new(toolchain()?, config, constraints);

    let engine = ContestEngine::new(sandbox, RuleBasedEvaluator::new())
        .with_configuration(config)
        .with_default_timeout(timeout)
        .with_boxed_developer(developer("Alice", "CONTEST_ALICE_CMD")?)
        .with_boxed_developer(developer("Bob", "CONTEST_BOB_CMD")?);

    let state_file = env::var("CONTEST_STATE_FILE").ok().map(PathBuf::from);
    let state = Arc::new(state(state_file.as_deref())?);
    let dashboard = Dashboard::new(state.clone());

    let summary = engine.run_contest(&state, &problems(config.verbose_enabled())?);

    if let Some(path) = &state_file {
        state.save(path)?;
    }
    println!();
    print!("{}", dashboard.render());
    match summary.winner {
        Some(winner) => println!("\nWinner: {winner}"),
        None => println!("\nNo winner"),
    }
    Ok(())
}
