//! Round-level failures.
//!
//! None of these are fatal: the engine records them in the
//! [`RoundResult`](crate::round::RoundResult) and the only lasting effect is the
//! penalty posted to the bank for the affected participant.

use std::time::Duration;

use serde::Serialize;

/// Something that went wrong for one participant during a round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContestError {
    /// The submission did not pass the compile/check step.
    CompileError {
        /// Developer name.
        participant: String,
    },
    /// The submission compiled but at least one test failed.
    TestFailure {
        /// Developer name.
        participant: String,
    },
    /// The sandbox hit its hard deadline.
    Timeout {
        /// Developer name.
        participant: String,
        /// Deadline that was exceeded.
        #[serde(with = "duration_secs")]
        after: Duration,
    },
    /// The developer produced no output (or failed while producing it).
    MissingSubmission {
        /// Developer name.
        participant: String,
    },
    /// The evaluator completed but offered no constitution update.
    EvaluatorAbstained,
    /// The evaluator produced no output at all. It is not rewarded.
    EvaluatorSilent,
}

impl ContestError {
    /// Name of the participant this failure belongs to, if any.
    pub fn participant(&self) -> Option<&str> {
        match self {
            ContestError::CompileError { participant }
            | ContestError::TestFailure { participant }
            | ContestError::Timeout { participant, .. }
            | ContestError::MissingSubmission { participant } => Some(participant),
            ContestError::EvaluatorAbstained | ContestError::EvaluatorSilent => None,
        }
    }
}

impl std::fmt::Display for ContestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContestError::CompileError { participant } => {
                write!(f, "{participant}: compilation error")
            }
            ContestError::TestFailure { participant } => write!(f, "{participant}: failing tests"),
            ContestError::Timeout { participant, after } => {
                write!(f, "{participant}: timeout after {:.1}s", after.as_secs_f64())
            }
            ContestError::MissingSubmission { participant } => {
                write!(f, "{participant}: no submission")
            }
            ContestError::EvaluatorAbstained => write!(f, "evaluator kept the constitution"),
            ContestError::EvaluatorSilent => write!(f, "evaluator produced no output"),
        }
    }
}

impl std::error::Error for ContestError {}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_is_reported_for_developer_failures_only() {
        let timeout = ContestError::Timeout {
            participant: "Bob".into(),
            after: Duration::from_secs(3),
        };
        assert_eq!(timeout.participant(), Some("Bob"));
        assert_eq!(timeout.to_string(), "Bob: timeout after 3.0s");
        assert_eq!(ContestError::EvaluatorAbstained.participant(), None);
    }
}
