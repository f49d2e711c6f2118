use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{error, instrument};

pub(super) const PROBLEM_FILE: &str = "problem.yaml";

/// Content of a `problem.yaml` file.
#[derive(Debug, PartialEq, Eq)]
pub(super) struct ProblemFile {
    pub description: String,
    pub stub: Option<PathBuf>,
    pub tests: PathBuf,
    pub timeout: Option<Duration>,
}

/// Parse a flat `key: value` file.
///
/// Known keys are `description`, `stub`, `tests` and `timeout_ms`; `description` and
/// `tests` are required. Values may be wrapped in double quotes.
pub(super) fn parse_problem_file(yaml: &str) -> anyhow::Result<ProblemFile> {
    let mut description = None;
    let mut stub = None;
    let mut tests = None;
    let mut timeout = None;

    for (i, line) in yaml.lines().enumerate() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .with_context(|| format!("Line {}: Missing ':'", i + 1))?;
        let value = unquote(value.trim());
        if value.is_empty() {
            bail!("Line {}: '{}' value missing", i + 1, key.trim());
        }

        match key.trim() {
            "description" => description = Some(value.to_string()),
            "stub" => stub = Some(PathBuf::from(value)),
            "tests" => tests = Some(PathBuf::from(value)),
            "timeout_ms" => {
                let ms = value
                    .parse::<u64>()
                    .with_context(|| format!("Line {}: invalid timeout '{value}'", i + 1))?;
                timeout = Some(Duration::from_millis(ms));
            }
            other => bail!("Line {}: unknown key '{other}'", i + 1),
        }
    }

    Ok(ProblemFile {
        description: description.context("Missing 'description' key")?,
        stub,
        tests: tests.context("Missing 'tests' key")?,
        timeout,
    })
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[instrument]
pub(super) fn check_dir_integrity(dir: &Path) -> anyhow::Result<()> {
    let metadata = match dir.metadata() {
        Ok(metadata) => metadata,
        Err(e) => {
            error!("Error reading directory: {}", e);
            bail!("error reading directory: {}", e);
        }
    };
    if !metadata.is_dir() {
        error!("Not a directory");
        bail!("not a directory");
    }
    Ok(())
}

/// Read a file referenced by `problem.yaml`, relative to the problem directory.
pub(super) fn read_relative(dir: &Path, file: &Path) -> anyhow::Result<String> {
    if file.is_absolute() || file.components().any(|c| c.as_os_str() == "..") {
        bail!("{} must stay inside the problem directory", file.display());
    }
    let path = dir.join(file);
    std::fs::read_to_string(&path).with_context(|| format!("could not read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_file() {
        let file = parse_problem_file(
            "# a comment\ndescription: \"Add two numbers\"\nstub: stub.py\ntests: test.py\ntimeout_ms: 1500\n",
        )
        .unwrap();
        assert_eq!(
            file,
            ProblemFile {
                description: "Add two numbers".to_string(),
                stub: Some(PathBuf::from("stub.py")),
                tests: PathBuf::from("test.py"),
                timeout: Some(Duration::from_millis(1500)),
            }
        );
    }

    #[test]
    fn description_may_contain_colons() {
        let file = parse_problem_file("description: Input: a list\ntests: t.py").unwrap();
        assert_eq!(file.description, "Input: a list");
    }

    #[test]
    fn rejects_bad_files() {
        assert!(parse_problem_file("tests: t.py").is_err());
        assert!(parse_problem_file("description: x").is_err());
        assert!(parse_problem_file("description: x\ntests: t.py\ncolor: blue").is_err());
        assert!(parse_problem_file("description: x\ntests: t.py\ntimeout_ms: soon").is_err());
        assert!(parse_problem_file("description x").is_err());
    }

    #[test]
    fn relative_files_cannot_escape() {
        let dir = Path::new("/tmp");
        assert!(read_relative(dir, Path::new("../etc/passwd")).is_err());
        assert!(read_relative(dir, Path::new("/etc/passwd")).is_err());
    }
}
