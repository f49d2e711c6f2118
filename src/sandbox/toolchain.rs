use std::path::Path;

use anyhow::bail;

const SOURCE_PLACEHOLDER: &str = "{source}";
const TEST_PLACEHOLDER: &str = "{test}";

/// How candidate code is checked and tested.
///
/// The candidate is written to `source_file`; `test_file` holds the candidate followed by
/// the test suite. In `check` and `run`, `{source}` and `{test}` are replaced by those
/// file names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    #[allow(missing_docs)]
    pub source_file: String,
    #[allow(missing_docs)]
    pub test_file: String,
    /// Optional compile/syntax-check command. A non-zero exit is a compile error.
    pub check: Option<Vec<String>>,
    /// Test command. Exit code 0 means every test passed.
    pub run: Vec<String>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Toolchain::python()
    }
}

impl Toolchain {
    /// `py_compile` as the check step, `pytest` for the tests.
    pub fn python() -> Toolchain {
        Toolchain {
            source_file: "solution.py".to_string(),
            test_file: "test_solution.py".to_string(),
            check: Some(to_args(&["python3", "-m", "py_compile", SOURCE_PLACEHOLDER])),
            run: to_args(&[
                "python3",
                "-m",
                "pytest",
                "-q",
                "-p",
                "no:cacheprovider",
                TEST_PLACEHOLDER,
            ]),
        }
    }

    /// POSIX shell: `sh -n` as the check step, the combined script as the test.
    pub fn shell() -> Toolchain {
        Toolchain {
            source_file: "solution.sh".to_string(),
            test_file: "test_solution.sh".to_string(),
            check: Some(to_args(&["sh", "-n", SOURCE_PLACEHOLDER])),
            run: to_args(&["sh", TEST_PLACEHOLDER]),
        }
    }

    /// Build a toolchain from space separated command lines.
    ///
    /// # Errors
    /// Fails if a command line is empty or contains quotes.
    pub fn from_command_lines(
        source_file: &str,
        test_file: &str,
        check: Option<&str>,
        run: &str,
    ) -> anyhow::Result<Toolchain> {
        let check = check.map(split_command_line).transpose()?;
        let run = split_command_line(run)?;
        if source_file.is_empty() || test_file.is_empty() || source_file == test_file {
            bail!("source and test files must be two distinct names");
        }
        if Path::new(source_file).components().count() != 1
            || Path::new(test_file).components().count() != 1
        {
            bail!("source and test files must be plain file names");
        }
        Ok(Toolchain {
            source_file: source_file.to_string(),
            test_file: test_file.to_string(),
            check,
            run,
        })
    }

    /// Content of the test file: the candidate, then the suite.
    pub fn test_file_content(&self, code: &str, tests: &str) -> String {
        format!("{code}\n\n{tests}\n")
    }

    /// `command` with placeholders substituted.
    pub fn expand(&self, command: &[String]) -> Vec<String> {
        command
            .iter()
            .map(|arg| {
                arg.replace(SOURCE_PLACEHOLDER, &self.source_file)
                    .replace(TEST_PLACEHOLDER, &self.test_file)
            })
            .collect()
    }
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn split_command_line(line: &str) -> anyhow::Result<Vec<String>> {
    if line.contains('"') || line.contains('\'') || line.contains('`') {
        bail!("command lines should not contain any quote")
    }
    let args = line.split_whitespace().map(String::from).collect::<Vec<_>>();
    if args.is_empty() {
        bail!("empty command line");
    }
    Ok(args)
}
