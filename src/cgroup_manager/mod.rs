#[cfg(target_os = "linux")]
mod cgroup_manager_linux;

#[cfg(target_os = "linux")]
pub use cgroup_manager_linux::*;

#[cfg(not(target_os = "linux"))]
mod cgroup_manager_stub;

use std::fs::File;
use std::path::Path;
use std::process::{Child, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::Context;
#[cfg(not(target_os = "linux"))]
pub use cgroup_manager_stub::*;

/// Spawn `command` in `workdir`, stdout and stderr both going to `output`.
///
/// On Unix the child leads its own process group, so [`kill_process_group`] also reaches
/// whatever it spawned.
fn create_process(
    command: &str,
    args: &[String],
    workdir: &Path,
    output: &File,
) -> anyhow::Result<Child> {
    let stdout = output.try_clone().context("could not share output file")?;
    let stderr = output.try_clone().context("could not share output file")?;
    let mut process = std::process::Command::new(command);
    process
        .args(args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        process.process_group(0);
    }
    process
        .spawn()
        .with_context(|| format!("command '{command}' not found"))
}

/// SIGKILL the process group led by `child`, or only `child` when that fails.
fn kill_process_group(child: &mut Child) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let pgid = child.id() as libc::pid_t;
        if unsafe { libc::kill(-pgid, libc::SIGKILL) } == 0 {
            return Ok(());
        }
        tracing::debug!(
            "group kill failed, killing the child only: {}",
            std::io::Error::last_os_error()
        );
    }
    child.kill().context("could not kill process")
}

impl LimitedProcess {
    /// Kill the child and its process group directly, then reap it.
    ///
    /// Used when killing through the cgroup failed.
    pub fn kill_child(&mut self) {
        if let Err(e) = kill_process_group(&mut self.child) {
            tracing::warn!("could not kill process {}: {e:#}", self.child.id());
        }
        let _ = self.child.wait();
        self.release();
    }

    /// Poll the child until it exits or `deadline` passes.
    ///
    /// Returns `None` on deadline; the process is still running and must be killed by the caller.
    pub fn wait_until(&mut self, deadline: Instant) -> anyhow::Result<Option<ExitStatus>> {
        loop {
            if let Some(status) = self.child.try_wait().context("could not poll process")? {
                self.release();
                return Ok(Some(status));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(5).min(deadline - now));
        }
    }
}
