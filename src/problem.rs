//! Coding problems handed to developers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One coding problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Unique id, also used to order problems.
    pub id: String,
    /// What has to be implemented.
    pub description: String,
    /// Signature the solution must provide.
    pub stub_code: String,
    /// Test suite appended to the candidate code by the sandbox.
    pub tests: String,
    /// Overrides the sandbox's default deadline.
    pub timeout: Option<Duration>,
}

impl Problem {
    #[allow(missing_docs)]
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        stub_code: impl Into<String>,
        tests: impl Into<String>,
    ) -> Problem {
        Problem {
            id: id.into(),
            description: description.into(),
            stub_code: stub_code.into(),
            tests: tests.into(),
            timeout: None,
        }
    }

    #[allow(missing_docs)]
    pub fn with_timeout(mut self, timeout: Duration) -> Problem {
        self.timeout = Some(timeout);
        self
    }

    /// Name of the first function declared in the stub (`def name(` style), if any.
    pub fn function_name(&self) -> Option<&str> {
        self.stub_code.lines().find_map(|line| {
            let rest = line.trim_start().strip_prefix("def ")?;
            let name = rest.split('(').next()?.trim();
            (!name.is_empty()).then_some(name)
        })
    }

    /// Five small Python problems used when no problem directory is given.
    pub fn builtin() -> Vec<Problem> {
        vec![
            Problem::new(
                "001",
                "Write a function that adds two numbers",
                "def add(a, b):\n    pass",
                "def test_add():\n    assert add(5, 3) == 8\n    assert add(-1, 1) == 0",
            ),
            Problem::new(
                "002",
                "Write a function that returns the length of a string",
                "def length(text):\n    pass",
                "def test_length():\n    assert length('hello') == 5\n    assert length('') == 0",
            ),
            Problem::new(
                "003",
                "Write a function that checks if a number is even",
                "def is_even(n):\n    pass",
                "def test_is_even():\n    assert is_even(4) is True\n    assert is_even(7) is False",
            ),
            Problem::new(
                "004",
                "Write a function that finds the maximum in a list",
                "def find_max(numbers):\n    pass",
                "def test_find_max():\n    assert find_max([1, 5, 3, 9, 2]) == 9\n    assert find_max([-4]) == -4",
            ),
            Problem::new(
                "005",
                "Write a function that reverses a string",
                "def reverse(text):\n    pass",
                "def test_reverse():\n    assert reverse('hello') == 'olleh'\n    assert reverse('') == ''",
            ),
        ]
    }
}
