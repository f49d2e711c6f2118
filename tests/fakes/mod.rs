use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use constitution_contest::prelude::*;

/// Developer answering the same thing every round and remembering what it was shown.
pub struct ScriptedDeveloper {
    name: String,
    response: Result<Option<String>, String>,
    pub seen_constitutions: Mutex<Vec<String>>,
    pub feedback: Mutex<Vec<Feedback>>,
}

impl ScriptedDeveloper {
    pub fn answering(name: &str, response: &str) -> Self {
        Self::with_response(name, Ok(Some(response.to_string())))
    }

    pub fn silent(name: &str) -> Self {
        Self::with_response(name, Ok(None))
    }

    pub fn failing(name: &str) -> Self {
        Self::with_response(name, Err("model unavailable".to_string()))
    }

    fn with_response(name: &str, response: Result<Option<String>, String>) -> Self {
        ScriptedDeveloper {
            name: name.to_string(),
            response,
            seen_constitutions: Mutex::new(Vec::new()),
            feedback: Mutex::new(Vec::new()),
        }
    }
}

impl Developer for ScriptedDeveloper {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self, _problem: &Problem, constitution: &str) -> anyhow::Result<Option<String>> {
        self.seen_constitutions
            .lock()
            .unwrap()
            .push(constitution.to_string());
        self.response.clone().map_err(anyhow::Error::msg)
    }

    fn feedback(&self, feedback: &Feedback) {
        self.feedback.lock().unwrap().push(feedback.clone());
    }
}

/// Developer that panics when queried.
pub struct PanickingDeveloper(pub &'static str);

impl Developer for PanickingDeveloper {
    fn name(&self) -> &str {
        self.0
    }

    fn query(&self, _problem: &Problem, _constitution: &str) -> anyhow::Result<Option<String>> {
        panic!("developer crashed")
    }
}

/// Sandbox returning a fixed verdict per submitted code.
#[derive(Default)]
pub struct TableSandbox {
    verdicts: HashMap<String, Verdict>,
    pub calls: AtomicUsize,
}

impl TableSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, code: &str, verdict: Verdict) -> Self {
        self.verdicts.insert(code.to_string(), verdict);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Sandbox for TableSandbox {
    fn execute(&self, code: &str, _tests: &str, _timeout: Duration) -> Verdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdicts
            .get(code)
            .cloned()
            .unwrap_or_else(|| Verdict::test_failure(0.0, "unknown code"))
    }
}

/// Evaluator answering from a script, one answer per round, then `Keep`.
pub struct ScriptedEvaluator {
    answers: Mutex<Vec<anyhow::Result<Option<Evaluation>>>>,
    pub seen_balances: Mutex<Vec<std::collections::BTreeMap<String, Amount>>>,
}

impl ScriptedEvaluator {
    pub fn new(answers: Vec<anyhow::Result<Option<Evaluation>>>) -> Self {
        let mut answers = answers;
        answers.reverse();
        ScriptedEvaluator {
            answers: Mutex::new(answers),
            seen_balances: Mutex::new(Vec::new()),
        }
    }

    pub fn keeping() -> Self {
        Self::new(Vec::new())
    }
}

impl Evaluator for ScriptedEvaluator {
    fn evaluate(&self, context: &EvaluationContext<'_>) -> anyhow::Result<Option<Evaluation>> {
        self.seen_balances
            .lock()
            .unwrap()
            .push(context.balances.clone());
        self.answers
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Ok(Some(Evaluation::keep())))
    }
}

pub fn quiet() -> Configuration {
    Configuration::new().with_verbose(false)
}

pub fn problem() -> Problem {
    Problem::new(
        "001",
        "Write a function that adds two numbers",
        "def add(a, b):\n    pass",
        "def test_add():\n    assert add(5, 3) == 8",
    )
    .with_timeout(Duration::from_secs(3))
}
