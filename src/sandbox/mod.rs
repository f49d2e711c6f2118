//! Execution of candidate code against a test suite.
//!
//! The engine only knows the [`Sandbox`] trait: given code, tests and a hard deadline it
//! returns a [`Verdict`]. Implementations must keep the candidate away from the engine's
//! own process state and must return within the deadline. [`ProcessSandbox`] is the
//! implementation shipped with the crate: it runs an external toolchain in a separate
//! process, contained with cgroups when available.

use std::time::Duration;

use serde::{Deserialize, Serialize};

mod process;
mod toolchain;

pub use process::ProcessSandbox;
pub use toolchain::Toolchain;

/// Result of one sandboxed execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Every test passed.
    pub passed: bool,
    /// The code was rejected before the tests ran.
    pub compile_error: bool,
    /// The deadline was hit. `elapsed_seconds` is then the deadline itself.
    pub timed_out: bool,
    #[allow(missing_docs)]
    pub elapsed_seconds: f64,
    /// Diagnostic output, possibly truncated.
    pub output: String,
}

impl Verdict {
    #[allow(missing_docs)]
    pub fn pass(elapsed_seconds: f64) -> Verdict {
        Verdict {
            passed: true,
            compile_error: false,
            timed_out: false,
            elapsed_seconds,
            output: String::new(),
        }
    }

    #[allow(missing_docs)]
    pub fn compile_error(elapsed_seconds: f64, output: impl Into<String>) -> Verdict {
        Verdict {
            passed: false,
            compile_error: true,
            timed_out: false,
            elapsed_seconds,
            output: output.into(),
        }
    }

    #[allow(missing_docs)]
    pub fn test_failure(elapsed_seconds: f64, output: impl Into<String>) -> Verdict {
        Verdict {
            passed: false,
            compile_error: false,
            timed_out: false,
            elapsed_seconds,
            output: output.into(),
        }
    }

    /// A failing verdict for an execution killed at `timeout`.
    pub fn timeout(timeout: Duration) -> Verdict {
        Verdict {
            passed: false,
            compile_error: false,
            timed_out: true,
            elapsed_seconds: timeout.as_secs_f64(),
            output: format!("Timeout after {:.3} seconds", timeout.as_secs_f64()),
        }
    }

    /// Replace a verdict that ran past `timeout` with a timeout verdict.
    pub fn enforce_deadline(self, timeout: Duration) -> Verdict {
        if self.timed_out || self.elapsed_seconds > timeout.as_secs_f64() {
            Verdict::timeout(timeout)
        } else {
            self
        }
    }
}

/// A compile/run/test oracle.
pub trait Sandbox: Send + Sync {
    /// Run `code` against `tests` and return within `timeout`.
    fn execute(&self, code: &str, tests: &str, timeout: Duration) -> Verdict;
}

impl<S: Sandbox + ?Sized> Sandbox for std::sync::Arc<S> {
    fn execute(&self, code: &str, tests: &str, timeout: Duration) -> Verdict {
        (**self).execute(code, tests, timeout)
    }
}
