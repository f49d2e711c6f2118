//! Who can hold money in the contest.

use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Name under which the principle evaluator is credited in the bank.
pub const EVALUATOR_NAME: &str = "PrincipleEvaluator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Role {
    Developer,
    Evaluator,
}

/// Identity of someone holding a bank account.
///
/// Balances are never stored here, they are always folded from the ledger.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Unique name, also the bank account key.
    pub name: String,
    #[allow(missing_docs)]
    pub role: Role,
}

impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Hash for Participant {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

#[allow(missing_docs)]
impl Participant {
    pub fn developer(name: impl Into<String>) -> Participant {
        Participant {
            name: name.into(),
            role: Role::Developer,
        }
    }

    pub fn evaluator() -> Participant {
        Participant {
            name: EVALUATOR_NAME.to_string(),
            role: Role::Evaluator,
        }
    }

    pub fn is_evaluator(&self) -> bool {
        self.role == Role::Evaluator
    }
}

impl std::fmt::Display for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
