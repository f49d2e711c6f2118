use std::{fs::File, path::Path, process::Child, time::Duration};

use anyhow::{self, bail, Context};
use tracing::error;

use super::{create_process, kill_process_group};

#[derive(Debug)]
pub struct LimitedProcess {
    pub child: Child,
    cleaned_up: bool,
}

impl LimitedProcess {
    pub fn launch(
        _command: &str,
        _args: &[String],
        _max_memory: i64,
        _cpus: &str,
        _workdir: &Path,
        _output: &File,
    ) -> anyhow::Result<LimitedProcess> {
        bail!("cgroups only available on linux")
    }

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
            cleaned_up: false,
        })
    }

    pub fn is_contained(&self) -> bool {
        false
    }

    pub fn try_kill(&mut self, _max_duration: Duration) -> anyhow::Result<()> {
        kill_process_group(&mut self.child)?;
        let _ = self.child.wait();
        self.cleaned_up = true;
        Ok(())
    }

    pub(super) fn release(&mut self) {
        self.cleaned_up = true;
    }
}

impl Drop for LimitedProcess {
    fn drop(&mut self) {
        if !self.cleaned_up {
            if let Err(e) = self.try_kill(Duration::from_secs(1)) {
                error!("could not kill sandboxed process {}: {e:#}", self.child.id());
            }
        }
    }
}
