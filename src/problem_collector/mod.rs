//! Loading problems from disk.
//!
//! Every subdirectory of the given directory is one problem, named after the directory.
//! It must contain a `problem.yaml`:
//!
//! ```yaml
//! description: Write a function that adds two numbers
//! stub: stub.py        # optional
//! tests: test_add.py
//! timeout_ms: 2000     # optional
//! ```
//!
//! > ⚠️ This file is manually parsed and supports only flat `key: value` lines and comments.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context};
use tracing::{error, info, instrument, warn};

use crate::problem::Problem;
use problem_file_utils::{check_dir_integrity, parse_problem_file, read_relative, PROBLEM_FILE};

mod problem_file_utils;

/// Load every valid problem found in `directory`, sorted by id.
///
/// Invalid problem directories are skipped (and reported when `verbose`).
///
/// # Errors
/// Fails if `directory` is not a readable directory.
#[instrument]
pub fn collect_problems(directory: &Path, verbose: bool) -> anyhow::Result<Vec<Problem>> {
    if !directory.is_dir() {
        bail!("'{directory:?}' is not a valid directory");
    }

    const RED: &str = "\x1b[31m";
    const GREEN: &str = "\x1b[32m";
    const RESET: &str = "\x1b[0m";

    let mut subdirs = std::fs::read_dir(directory)
        .with_context(|| format!("could not read {}", directory.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect::<Vec<_>>();
    subdirs.sort();
    info!(problem_directories = ?subdirs);

    let longest_name = subdirs
        .iter()
        .filter_map(|p| p.file_name())
        .fold(0, |acu, name| acu.max(name.len()))
        + 3; // at least 3 dots

    if verbose {
        println!("Collecting problems...");
    }

    let mut problems = Vec::new();
    for subdir in subdirs {
        let Some(name) = subdir.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
            warn!("skipping non UTF-8 name {subdir:?}");
            continue;
        };

        if verbose {
            print!("Collecting {name:·<longest_name$} ");
            let _ = std::io::stdout().flush();
        }

        if !subdir.is_dir() {
            warn!("Not a directory: '{name}'");
            if verbose {
                println!("{RED}Not a directory{RESET}");
            }
            continue;
        }

        match load_problem(&subdir, &name) {
            Ok(problem) => {
                if verbose {
                    println!("{GREEN}Ok{RESET}");
                }
                problems.push(problem);
            }
            Err(e) => {
                error!("problem '{name}' skipped: {e:#}");
                if verbose {
                    println!("{RED}{e:#}{RESET}");
                }
            }
        }
    }

    problems.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(problems)
}

fn load_problem(dir: &Path, id: &str) -> anyhow::Result<Problem> {
    check_dir_integrity(dir)?;
    let yaml = std::fs::read_to_string(dir.join(PROBLEM_FILE))
        .with_context(|| format!("missing {PROBLEM_FILE}"))?;
    let file = parse_problem_file(&yaml)?;

    let stub_code = match &file.stub {
        Some(stub) => read_relative(dir, stub)?,
        None => String::new(),
    };
    let tests = read_relative(dir, &file.tests)?;
    if tests.trim().is_empty() {
        bail!("empty test suite");
    }

    let mut problem = Problem::new(id, file.description, stub_code, tests);
    problem.timeout = file.timeout;
    Ok(problem)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use super::*;

    fn write_problem(root: &Path, id: &str, yaml: &str, tests: &str) {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(PROBLEM_FILE), yaml).unwrap();
        fs::write(dir.join("test.py"), tests).unwrap();
    }

    #[test]
    fn collects_valid_problems_in_order() {
        let root = tempfile::tempdir().unwrap();
        write_problem(
            root.path(),
            "002",
            "description: second\ntests: test.py\ntimeout_ms: 250",
            "def test_b(): pass",
        );
        write_problem(root.path(), "001", "description: first\ntests: test.py", "def test_a(): pass");
        write_problem(root.path(), "003", "tests: test.py", "def test_c(): pass");
        write_problem(root.path(), "004", "description: empty\ntests: test.py", "  ");
        fs::write(root.path().join("README"), "not a problem").unwrap();

        let problems = collect_problems(root.path(), false).unwrap();
        let ids = problems.iter().map(|p| p.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["001", "002"]);
        assert_eq!(problems[1].timeout, Some(Duration::from_millis(250)));
        assert_eq!(problems[0].stub_code, "");
    }

    #[test]
    fn rejects_missing_directory() {
        assert!(collect_problems(Path::new("/definitely/not/here"), false).is_err());
    }
}
