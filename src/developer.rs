//! Developers competing in the contest.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::bank::Amount;
use crate::problem::Problem;
use crate::scoring::Outcome;

/// A contestant producing code for a problem under the current constitution.
///
/// Implementations are queried concurrently, one thread per developer.
pub trait Developer: Send + Sync {
    /// Name under which the developer is registered in the bank.
    fn name(&self) -> &str;

    /// Produce a response for `problem`.
    ///
    /// The response goes through [`extract_code`](crate::extraction::extract_code); `Ok(None)`,
    /// a blank response or an error are all recorded as a missing submission.
    fn query(&self, problem: &Problem, constitution: &str) -> anyhow::Result<Option<String>>;

    /// Called once per round, after scoring.
    fn feedback(&self, _feedback: &Feedback) {}
}

impl<D: Developer + ?Sized> Developer for std::sync::Arc<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn query(&self, problem: &Problem, constitution: &str) -> anyhow::Result<Option<String>> {
        (**self).query(problem, constitution)
    }

    fn feedback(&self, feedback: &Feedback) {
        (**self).feedback(feedback)
    }
}

/// What a developer learns about its own submission at the end of a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feedback {
    #[allow(missing_docs)]
    pub round: u32,
    #[allow(missing_docs)]
    pub problem_id: String,
    #[allow(missing_docs)]
    pub outcome: Outcome,
    /// Total amount credited for the submission (outcome and latency).
    pub delta: Amount,
    /// Balance once the whole round, evaluator adjustments included, is posted.
    pub balance: Amount,
    /// Constitution in force for the next round.
    pub constitution: String,
    /// Sandbox output, truncated.
    pub output: String,
}

/// Render the text handed to external developers.
pub fn render_prompt(problem: &Problem, constitution: &str) -> String {
    format!(
        "CONSTITUTION:\n{constitution}\n\nPROBLEM {}:\n{}\n\nSTUB:\n{}\n\nTESTS:\n{}\n",
        problem.id, problem.description, problem.stub_code, problem.tests
    )
}

/// Developer backed by an external command.
///
/// The command receives [`render_prompt`] on stdin and answers on stdout. It is killed if
/// it does not finish within the response timeout.
#[derive(Debug, Clone)]
pub struct CommandDeveloper {
    name: String,
    program: String,
    args: Vec<String>,
    response_timeout: Duration,
}

impl CommandDeveloper {
    /// Default time given to the command to answer.
    pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

    #[allow(missing_docs)]
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        CommandDeveloper {
            name: name.into(),
            program: program.into(),
            args,
            response_timeout: Self::DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Split a whitespace separated command line. Quotes are not supported.
    pub fn from_command_line(name: impl Into<String>, command_line: &str) -> anyhow::Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let Some(program) = parts.next() else {
            bail!("empty command line");
        };
        if command_line.contains(['"', '\'']) {
            bail!("quotes are not supported in command lines: {command_line}");
        }
        Ok(Self::new(name, program, parts.collect()))
    }

    #[allow(missing_docs)]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

impl Developer for CommandDeveloper {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(developer = %self.name, problem = %problem.id))]
    fn query(&self, problem: &Problem, constitution: &str) -> anyhow::Result<Option<String>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("command '{}' not found", self.program))?;

        let mut stdin = child.stdin.take().context("stdin not captured")?;
        let mut stdout = child.stdout.take().context("stdout not captured")?;
        let prompt = render_prompt(problem, constitution);

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            // a command that ignores its input closes the pipe early
            if let Err(e) = stdin.write_all(prompt.as_bytes()) {
                debug!("prompt not fully written: {e}");
            }
            drop(stdin);
            let mut response = String::new();
            let read = stdout.read_to_string(&mut response).map(|_| response);
            let _ = tx.send(read);
        });

        match rx.recv_timeout(self.response_timeout) {
            Ok(read) => {
                let response = read.context("could not read response")?;
                let status = child.wait().context("could not wait for command")?;
                if !status.success() {
                    warn!(%status, "developer command failed");
                    return Err(anyhow!("developer command exited with {status}"));
                }
                Ok((!response.trim().is_empty()).then_some(response))
            }
            Err(_) => {
                if let Err(e) = child.kill() {
                    warn!("could not kill developer command: {e}");
                }
                let _ = child.wait();
                Err(anyhow!(
                    "no response within {:.1}s",
                    self.response_timeout.as_secs_f64()
                ))
            }
        }
    }
}

/// Developer that hands back the problem's stub untouched.
///
/// Used when no real developer is configured; its submissions run but fail.
#[derive(Debug, Clone)]
pub struct StubDeveloper {
    name: String,
}

impl StubDeveloper {
    #[allow(missing_docs)]
    pub fn new(name: impl Into<String>) -> Self {
        StubDeveloper { name: name.into() }
    }
}

impl Developer for StubDeveloper {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self, problem: &Problem, _constitution: &str) -> anyhow::Result<Option<String>> {
        Ok(Some(problem.stub_code.clone()))
    }
}
