use std::fs::File;
use std::path::Path;
use std::process::Child;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use cgroups_rs::Cgroup;
use tracing::{error, warn};

use super::{create_process, kill_process_group};

fn get_current_user_id() -> anyhow::Result<String> {
    let output = std::process::Command::new("id")
        .arg("-u")
        .output()
        .context("Could not launch 'id -u'")?;
    let untrimed_id = std::str::from_utf8(&output.stdout).context("id is not a valid string")?;
    Ok(untrimed_id.trim().to_string())
}

fn get_cgroup_path(user_id: &str, group_name: &str) -> String {
    format!("user.slice/user-{user_id}.slice/user@{user_id}.service/{group_name}")
}

/// Create a cgroup at `path`.
///
/// * `max_memory` - Maximum available memory in Bytes. Non-positive means no restriction.
/// * `max_pids` - Maximum number of PIDS inside the cgroup at any time. Non-positive means no restriction.
/// * `cpus` - comma separated cpu ranges ("1-5,7", "1,3,4", ...). Empty string means no restriction.
///
/// Only cgroup v2 is supported: killing a whole v1 group is not possible.
fn create_cgroup(path: &str, max_memory: i64, max_pids: i64, cpus: &str) -> anyhow::Result<Cgroup> {
    let hierarchy = cgroups_rs::hierarchies::auto();
    if !hierarchy.v2() {
        anyhow::bail!("cgroup v1 hierarchy, containment needs cgroup v2");
    }
    let mut builder = cgroups_rs::cgroup_builder::CgroupBuilder::new(path);
    if max_memory > 0 {
        builder = builder.memory().memory_hard_limit(max_memory).done();
    }
    if max_pids > 0 {
        builder = builder
            .pid()
            .maximum_number_of_processes(cgroups_rs::MaxValue::Value(max_pids))
            .done();
    }
    if !cpus.is_empty() {
        builder = builder.cpu().cpus(cpus.to_string()).done();
    }
    builder.build(hierarchy).context("could not create cgroup")
}

fn wait_for_process_cleanup(cgroup: &Cgroup, pid: u64, max_duration: Duration) -> anyhow::Result<()> {
    let deadline = Instant::now() + max_duration;
    while cgroup.tasks().iter().any(|cpid| cpid.pid == pid) {
        if Instant::now() > deadline {
            anyhow::bail!("process {pid} still alive after {max_duration:?}");
        }
        std::thread::sleep(Duration::from_millis(10).min(max_duration / 10));
    }
    Ok(())
}

/// A child process, optionally confined to its own cgroup.
///
/// The process (and the cgroup) is killed and removed on drop if it is still around.
#[derive(Debug)]
pub struct LimitedProcess {
    pub child: Child,
    cgroup: Option<Cgroup>,
    cleaned_up: bool,
}

impl LimitedProcess {
    /// Launch `command` inside a fresh cgroup limited to `max_memory` bytes and `cpus`.
    pub fn launch(
        command: &str,
        args: &[String],
        max_memory: i64,
        cpus: &str,
        workdir: &Path,
        output: &File,
    ) -> anyhow::Result<LimitedProcess> {
        static COUNTER: AtomicU32 = AtomicU32::new(1);
        let user_id = get_current_user_id().context("could not get user id")?;
        let group_name = format!(
            "CONTEST_SANDBOX_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let path = get_cgroup_path(&user_id, &group_name);
        let group = create_cgroup(&path, max_memory, 100, cpus)?;

        let mut child = match create_process(command, args, workdir, output) {
            Ok(child) => child,
            Err(e) => {
                let _ = group.delete();
                return Err(e.context("could not create process in cgroup"));
            }
        };

        let pid = child.id() as u64;
        if let Err(e) = group.add_task_by_tgid(cgroups_rs::CgroupPid { pid }) {
            let _ = child.kill();
            let _ = child.wait();
            let _ = group.delete();
            return Err(e).context("could not add process to cgroup");
        }

        Ok(LimitedProcess {
            child,
            cgroup: Some(group),
            cleaned_up: false,
        })
    }

    /// Launch `command` with no isolation besides the deadline enforced by the caller.
    pub fn launch_without_container(
        command: &str,
        args: &[String],
        workdir: &Path,
        output: &File,
    ) -> anyhow::Result<LimitedProcess> {
        let child =
            create_process(command, args, workdir, output).context("could not create process")?;

        Ok(LimitedProcess {
            child,
            cgroup: None,
            cleaned_up: false,
        })
    }

    pub fn is_contained(&self) -> bool {
        self.cgroup.is_some()
    }

    pub fn try_kill(&mut self, max_duration: Duration) -> anyhow::Result<()> {
        match &self.cgroup {
            Some(cgroup) => {
                cgroup.kill().context("could not kill cgroup")?;
                wait_for_process_cleanup(cgroup, self.child.id() as u64, max_duration)
                    .context("process cleanup timed out")?;
            }
            None => kill_process_group(&mut self.child)?,
        }
        let _ = self.child.wait();
        self.release();
        Ok(())
    }

    /// Forget about a process that already exited and remove its cgroup.
    pub(super) fn release(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        if let Some(cgroup) = &self.cgroup {
            if let Err(e) = cgroup.delete() {
                warn!("Failed to remove cgroup. If this happens a lot, it may slow down the computer. {e}");
            }
        }
    }
}

impl Drop for LimitedProcess {
    fn drop(&mut self) {
        static CLEANUP_DURATION: Duration = Duration::from_millis(100);
        if !self.cleaned_up {
            if let Err(e) = self.try_kill(CLEANUP_DURATION) {
                error!("could not kill sandboxed process {}: {e:#}", self.child.id());
                self.kill_child();
            }
        }
    }
}
