use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, error, instrument, warn};

use super::{Sandbox, Toolchain, Verdict};
use crate::cgroup_manager::LimitedProcess;
use crate::configuration::Configuration;
use crate::constraints::{Constraints, Reservation, ResourcePool};

const OUTPUT_FILE: &str = "sandbox_output.txt";
const MAX_OUTPUT_BYTES: u64 = 4096;
const KILL_GRACE: Duration = Duration::from_secs(1);

enum Step {
    Exited { success: bool },
    TimedOut,
}

/// Runs candidates through a [`Toolchain`] in child processes.
///
/// Each execution gets its own scratch directory, removed afterwards, and its own CPUs
/// and RAM taken from a [`ResourcePool`]. On Linux the child is confined to a cgroup and
/// pinned with `taskset`; with
/// [`with_allow_uncontained`](Configuration::with_allow_uncontained) it falls back to a
/// plain child process when that is not possible.
#[derive(Debug)]
pub struct ProcessSandbox {
    toolchain: Toolchain,
    config: Configuration,
    pool: ResourcePool,
    scratch_root: PathBuf,
    warned_uncontained: AtomicBool,
}

impl ProcessSandbox {
    #[allow(missing_docs)]
    pub fn new(toolchain: Toolchain, config: Configuration, constraints: Constraints) -> Self {
        ProcessSandbox {
            toolchain,
            config,
            pool: ResourcePool::new(constraints),
            scratch_root: std::env::temp_dir(),
            warned_uncontained: AtomicBool::new(false),
        }
    }

    /// Create scratch directories under `dir` instead of the system temp directory.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_root = dir.into();
        self
    }

    fn create_workdir(&self) -> anyhow::Result<PathBuf> {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let dir = self.scratch_root.join(format!(
            "contest-sandbox-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create scratch dir {}", dir.display()))?;
        Ok(dir)
    }

    fn launch(
        &self,
        command: &[String],
        workdir: &Path,
        output: &File,
        reservation: &Reservation,
    ) -> anyhow::Result<LimitedProcess> {
        let (program, args) = command.split_first().context("empty command")?;
        let cpus = reservation.cpu_list();
        let mut pinned = vec!["-c".to_string(), cpus.clone(), program.clone()];
        pinned.extend_from_slice(args);

        let contained = LimitedProcess::launch(
            "taskset",
            &pinned,
            reservation.ram as i64,
            &cpus,
            workdir,
            output,
        );
        match contained {
            Ok(process) => Ok(process),
            Err(e) if self.config.allow_uncontained => {
                if !self.warned_uncontained.swap(true, Ordering::Relaxed) {
                    warn!("running sandboxed code uncontained: {e:#}");
                }
                LimitedProcess::launch_without_container(program, args, workdir, output)
            }
            Err(e) => Err(e.context("containment unavailable and uncontained runs are not allowed")),
        }
    }

    fn run_step(
        &self,
        command: &[String],
        workdir: &Path,
        output: &File,
        reservation: &Reservation,
        deadline: Instant,
    ) -> anyhow::Result<Step> {
        let command = self.toolchain.expand(command);
        let mut process = self.launch(&command, workdir, output, reservation)?;
        debug!(?command, contained = process.is_contained(), "sandbox step");
        match process.wait_until(deadline)? {
            Some(status) => Ok(Step::Exited {
                success: status.success(),
            }),
            None => {
                if let Err(e) = process.try_kill(KILL_GRACE) {
                    warn!("could not kill process after deadline: {e:#}");
                    process.kill_child();
                }
                Ok(Step::TimedOut)
            }
        }
    }

    fn try_execute(
        &self,
        workdir: &Path,
        code: &str,
        tests: &str,
        timeout: Duration,
    ) -> anyhow::Result<Verdict> {
        fs::write(workdir.join(&self.toolchain.source_file), code)
            .context("could not write source file")?;
        fs::write(
            workdir.join(&self.toolchain.test_file),
            self.toolchain.test_file_content(code, tests),
        )
        .context("could not write test file")?;
        let output_path = workdir.join(OUTPUT_FILE);
        let output = File::create(&output_path).context("could not create output file")?;

        // waiting for resources counts against the deadline, not against latency
        let deadline = Instant::now() + timeout;
        let Some(guard) = self.pool.acquire_until(deadline) else {
            warn!("no resources freed before the deadline");
            return Ok(Verdict::timeout(timeout));
        };
        let start = Instant::now();

        if let Some(check) = &self.toolchain.check {
            match self.run_step(check, workdir, &output, guard.reservation(), deadline)? {
                Step::TimedOut => return Ok(Verdict::timeout(timeout)),
                Step::Exited { success: false } => {
                    let elapsed = start.elapsed().as_secs_f64();
                    return Ok(Verdict::compile_error(elapsed, read_output(&output_path)));
                }
                Step::Exited { success: true } => {}
            }
        }

        let run = self.run_step(
            &self.toolchain.run,
            workdir,
            &output,
            guard.reservation(),
            deadline,
        )?;
        let verdict = match run {
            Step::TimedOut => Verdict::timeout(timeout),
            Step::Exited { success } => {
                let elapsed = start.elapsed().as_secs_f64();
                if success {
                    Verdict {
                        output: read_output(&output_path),
                        ..Verdict::pass(elapsed)
                    }
                } else {
                    Verdict::test_failure(elapsed, read_output(&output_path))
                }
            }
        };
        Ok(verdict)
    }
}

impl Sandbox for ProcessSandbox {
    #[instrument(skip_all, fields(timeout = ?timeout))]
    fn execute(&self, code: &str, tests: &str, timeout: Duration) -> Verdict {
        let workdir = match self.create_workdir() {
            Ok(dir) => dir,
            Err(e) => {
                error!("sandbox setup failed: {e:#}");
                return Verdict::test_failure(0.0, format!("sandbox error: {e:#}"));
            }
        };

        let verdict = match self.try_execute(&workdir, code, tests, timeout) {
            Ok(verdict) => verdict,
            Err(e) => {
                error!("sandbox execution failed: {e:#}");
                Verdict::test_failure(0.0, format!("sandbox error: {e:#}"))
            }
        };

        if self.config.debug_sandbox_output {
            debug!(output = %verdict.output, "sandbox output");
        }
        if let Err(e) = fs::remove_dir_all(&workdir) {
            warn!("could not remove {}: {e}", workdir.display());
        }
        verdict.enforce_deadline(timeout)
    }
}

fn read_output(path: &Path) -> String {
    let mut buf = Vec::new();
    if let Ok(file) = File::open(path) {
        let _ = file.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintsBuilder;

    fn sandbox(dir: &Path) -> ProcessSandbox {
        sandbox_with_cpus(dir, 2)
    }

    fn sandbox_with_cpus(dir: &Path, cpus: usize) -> ProcessSandbox {
        let constraints = ConstraintsBuilder::new()
            .with_max_total_ram(512)
            .with_ram_per_execution(128)
            .with_total_cpu_count(cpus)
            .build()
            .unwrap();
        let config = Configuration::new()
            .with_verbose(false)
            .with_allow_uncontained(true);
        ProcessSandbox::new(Toolchain::shell(), config, constraints).with_scratch_dir(dir)
    }

    #[test]
    fn passing_script() {
        let dir = tempfile::tempdir().unwrap();
        let verdict = sandbox(dir.path()).execute(
            "answer() { echo 42; }",
            "[ \"$(answer)\" = 42 ] || exit 1",
            Duration::from_secs(5),
        );
        assert!(verdict.passed, "{verdict:?}");
        assert!(!verdict.compile_error);
        assert!(verdict.elapsed_seconds < 5.0);
    }

    #[test]
    fn failing_test() {
        let dir = tempfile::tempdir().unwrap();
        let verdict = sandbox(dir.path()).execute(
            "answer() { echo 41; }",
            "[ \"$(answer)\" = 42 ] || exit 1",
            Duration::from_secs(5),
        );
        assert!(!verdict.passed);
        assert!(!verdict.compile_error);
        assert!(!verdict.timed_out);
    }

    #[test]
    fn syntax_error_is_a_compile_error() {
        let dir = tempfile::tempdir().unwrap();
        let verdict = sandbox(dir.path()).execute("if then fi (", "exit 0", Duration::from_secs(5));
        assert!(verdict.compile_error, "{verdict:?}");
        assert!(!verdict.passed);
    }

    #[test]
    fn deadline_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let start = Instant::now();
        let verdict = sandbox(dir.path()).execute("sleep 5", "exit 0", Duration::from_millis(300));
        assert!(verdict.timed_out);
        assert!(!verdict.passed);
        assert_eq!(verdict.elapsed_seconds, 0.3);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[cfg(target_os = "linux")]
    fn is_alive(pid: &str) -> bool {
        // a killed process may linger as a zombie until its parent reaps it
        match fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z" && state != "X"),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn nothing_survives_a_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let pids = tempfile::tempdir().unwrap();
        let pid_file = pids.path().join("pids");
        let code = format!(
            "echo $$ > {file}\nsleep 30 &\necho $! >> {file}\nwait",
            file = pid_file.display()
        );

        let verdict = sandbox(dir.path()).execute(&code, "exit 0", Duration::from_millis(500));
        assert!(verdict.timed_out, "{verdict:?}");
        assert_eq!(verdict.elapsed_seconds, 0.5);

        let written = fs::read_to_string(&pid_file).unwrap();
        let pids = written.split_whitespace().collect::<Vec<_>>();
        assert_eq!(pids.len(), 2, "{written}");

        let start = Instant::now();
        while pids.iter().any(|pid| is_alive(pid)) {
            assert!(
                start.elapsed() < Duration::from_secs(2),
                "still running: {pids:?}"
            );
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn waiting_for_resources_counts_against_the_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox_with_cpus(dir.path(), 1);
        let timeout = Duration::from_millis(500);

        let runs = std::thread::scope(|s| {
            let handles = (0..2)
                .map(|_| {
                    s.spawn(|| {
                        let start = Instant::now();
                        let verdict = sandbox.execute("sleep 5", "exit 0", timeout);
                        (verdict, start.elapsed())
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });

        for (verdict, wall) in runs {
            assert!(verdict.timed_out, "{verdict:?}");
            assert_eq!(verdict.elapsed_seconds, 0.5);
            assert!(wall < Duration::from_millis(950), "took {wall:?}");
        }
    }

    #[test]
    fn scratch_directories_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        sandbox(dir.path()).execute("true", "exit 0", Duration::from_secs(5));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
