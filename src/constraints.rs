//! Resource limits for sandboxed executions.
//!
//! This module provides tools to configure per-execution and global resource limits for
//! the [`ProcessSandbox`](crate::sandbox::ProcessSandbox). Constraints include memory
//! usage, CPU allocation and the default execution deadline.
//!
//! # Overview
//!
//! The main entry point is [`ConstraintsBuilder`], a chainable builder:
//!
//! - **Memory**: max total RAM shared by concurrent executions and RAM per execution
//! - **CPU**: total CPU count or an explicit CPU list, CPUs per execution
//! - **Timing**: default hard deadline for one execution, used when a problem does not set its own
//!
//! Once built, [`Constraints`] are turned into a [`ResourcePool`] by the sandbox. Every
//! execution borrows its CPUs and RAM from the pool and gives them back when it ends, so
//! the two developers' runs can happen in parallel without sharing CPUs.
//!
//! # Linux-Only
//!
//! Memory and CPU limits are enforced with cgroups v2 and `taskset`, which only exist on
//! Linux. Elsewhere only the deadline is enforced.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use constitution_contest::constraints::ConstraintsBuilder;
//!
//! let constraints = ConstraintsBuilder::new()
//!     .with_max_total_ram(4_000)
//!     .with_ram_per_execution(512)
//!     .with_cpu_list("0-3")
//!     .with_cpus_per_execution(1)
//!     .with_execution_timeout(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//! ```

use std::{
    collections::BTreeSet,
    env,
    sync::{Condvar, Mutex, PoisonError},
    time::{Duration, Instant},
};

use anyhow::{bail, Context};
use tracing::{trace, warn};

/// Deadline used when nothing else is configured.
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
enum AutoCpus {
    #[default]
    Auto,
    Count(usize),
    List(String),
}

/// A builder for sandbox resource limits.
///
/// By default memory is limited only by what the host has available, the CPU set is every
/// physical CPU of the host, each execution gets one CPU and the deadline is
/// [`DEFAULT_EXECUTION_TIMEOUT`].
#[derive(Debug, Default)]
pub struct ConstraintsBuilder {
    total_ram: Option<usize>,
    execution_ram: Option<usize>,
    cpus: AutoCpus,
    cpus_per_execution: Option<usize>,
    execution_timeout: Option<Duration>,
}

impl ConstraintsBuilder {
    /// Creates a builder with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder configured from environment variables.
    ///
    /// Read environment variables are:
    /// - `CONTEST_MAX_TOTAL_RAM` (usize): maximum total RAM in MB
    /// - `CONTEST_RAM_PER_EXECUTION` (usize): maximum RAM per execution in MB
    /// - `CONTEST_CPU_LIST` (string): comma-separated list or ranges of CPUs, e.g. "0-3,6"
    /// - `CONTEST_TOTAL_CPU_COUNT` (usize): total number of CPUs, overridden by `CONTEST_CPU_LIST`
    /// - `CONTEST_CPUS_PER_EXECUTION` (usize): number of CPUs per execution
    /// - `CONTEST_EXECUTION_TIMEOUT_MS` (u64): default execution deadline in milliseconds
    #[must_use]
    pub fn from_env() -> Self {
        fn parse_usize(var: &str) -> Option<usize> {
            env::var(var).ok()?.parse().ok()
        }

        let cpus = if let Ok(list) = env::var("CONTEST_CPU_LIST") {
            AutoCpus::List(list)
        } else if let Some(count) = parse_usize("CONTEST_TOTAL_CPU_COUNT") {
            AutoCpus::Count(count)
        } else {
            AutoCpus::Auto
        };

        ConstraintsBuilder {
            total_ram: parse_usize("CONTEST_MAX_TOTAL_RAM"),
            execution_ram: parse_usize("CONTEST_RAM_PER_EXECUTION"),
            cpus,
            cpus_per_execution: parse_usize("CONTEST_CPUS_PER_EXECUTION"),
            execution_timeout: env::var("CONTEST_EXECUTION_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis),
        }
    }

    /// Sets the maximum total RAM available across concurrent executions (in MB).
    #[must_use]
    pub fn with_max_total_ram(self, max: usize) -> Self {
        Self {
            total_ram: Some(max),
            ..self
        }
    }

    /// Sets the maximum RAM available to one execution (in MB).
    #[must_use]
    pub fn with_ram_per_execution(self, max: usize) -> Self {
        Self {
            execution_ram: Some(max),
            ..self
        }
    }

    /// Sets the CPUs available to executions, e.g. `"0-3,6,8"`.
    #[must_use]
    pub fn with_cpu_list(self, cpus: &str) -> Self {
        Self {
            cpus: AutoCpus::List(cpus.to_string()),
            ..self
        }
    }

    /// Sets the total number of CPUs. Ignored if `with_cpu_list` is also used.
    #[must_use]
    pub fn with_total_cpu_count(self, max: usize) -> Self {
        if let AutoCpus::List(_) = self.cpus {
            warn!("`with_total_cpu_count` is ignored if `with_cpu_list` is used!");
            self
        } else {
            Self {
                cpus: AutoCpus::Count(max),
                ..self
            }
        }
    }

    /// Sets the number of CPUs one execution may use. Default is one.
    #[must_use]
    pub fn with_cpus_per_execution(self, count: usize) -> Self {
        Self {
            cpus_per_execution: Some(count),
            ..self
        }
    }

    /// Sets the default hard deadline of one execution.
    #[must_use]
    pub fn with_execution_timeout(self, duration: Duration) -> Self {
        Self {
            execution_timeout: Some(duration),
            ..self
        }
    }

    /// Consumes the builder and returns the constructed [`Constraints`].
    ///
    /// # Errors
    ///
    /// Returns an error when the constraints are impossible to satisfy, e.g. total RAM lower
    /// than the RAM of one execution, or fewer CPUs than one execution needs.
    pub fn build(self) -> anyhow::Result<Constraints> {
        let mut sys = sysinfo::System::new();

        let total_ram = self.total_ram.map(|i| i * 1_000_000).unwrap_or_else(|| {
            sys.refresh_memory();
            sys.available_memory() as usize
        });

        if total_ram < self.execution_ram.unwrap_or(0) * 1_000_000 {
            bail!(
                "Execution RAM size ({}MB) is greater than total RAM ({}MB)",
                self.execution_ram.unwrap_or(0),
                total_ram / 1_000_000
            );
        }

        let cpus = match self.cpus {
            AutoCpus::Auto => (0..num_cpus::get_physical() as u16).collect::<BTreeSet<u16>>(),
            AutoCpus::Count(count) => (0..count as u16).collect(),
            AutoCpus::List(s) => {
                cpu_list_to_set(&s).map_err(|e| e.context("error parsing cpu list"))?
            }
        };
        let cpus_per_execution = self.cpus_per_execution.unwrap_or(1);
        if cpus_per_execution == 0 {
            bail!("an execution needs at least one CPU");
        }
        if cpus.len() < cpus_per_execution {
            bail!(
                "{} CPUs available but {cpus_per_execution} are needed per execution",
                cpus.len()
            );
        }

        let execution_ram = self
            .execution_ram
            .map(|i| i * 1_000_000)
            .unwrap_or_else(|| total_ram / (cpus.len() / cpus_per_execution));
        let execution_timeout = self.execution_timeout.unwrap_or(DEFAULT_EXECUTION_TIMEOUT);

        Ok(Constraints {
            total_ram,
            execution_ram,
            cpus,
            cpus_per_execution,
            execution_timeout,
        })
    }
}

fn cpu_list_to_set(s: &str) -> anyhow::Result<BTreeSet<u16>> {
    if s.is_empty() {
        bail!("Empty string");
    }
    let mut set = BTreeSet::new();
    for item in s.split(',') {
        let bounds = item
            .split('-')
            .map(|v| {
                v.trim()
                    .parse::<u16>()
                    .with_context(|| format!("could not parse {v}"))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        match bounds[..] {
            [cpu] => {
                set.insert(cpu);
            }
            [start, end] => {
                let range = if start <= end {
                    start..=end
                } else {
                    end..=start
                };
                set.extend(range);
            }
            _ => bail!(
                "each comma-separated item must be a number or a range (e.g. '0-3'), got '{item}'"
            ),
        }
    }
    Ok(set)
}

/// Obtained using [`ConstraintsBuilder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constraints {
    pub(crate) total_ram: usize,
    pub(crate) execution_ram: usize,
    pub(crate) cpus: BTreeSet<u16>,
    pub(crate) cpus_per_execution: usize,
    pub(crate) execution_timeout: Duration,
}

impl Constraints {
    /// create a ConstraintsBuilder
    pub fn builder() -> ConstraintsBuilder {
        ConstraintsBuilder::new()
    }

    /// Default deadline of one execution.
    pub fn execution_timeout(&self) -> Duration {
        self.execution_timeout
    }

    /// RAM given to one execution, in bytes.
    pub fn execution_ram(&self) -> usize {
        self.execution_ram
    }

    fn add(&mut self, res: Reservation) {
        self.total_ram += res.ram;
        self.cpus.extend(res.cpus);
    }

    fn try_take(&mut self) -> Option<Reservation> {
        if self.cpus.len() < self.cpus_per_execution || self.total_ram < self.execution_ram {
            return None;
        }
        let cpus = self
            .cpus
            .iter()
            .take(self.cpus_per_execution)
            .copied()
            .collect::<BTreeSet<_>>();
        self.cpus.retain(|cpu| !cpus.contains(cpu));
        self.total_ram -= self.execution_ram;
        Some(Reservation {
            ram: self.execution_ram,
            cpus,
        })
    }
}

/// CPUs and RAM held by one running execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reservation {
    /// In bytes.
    pub ram: usize,
    #[allow(missing_docs)]
    pub cpus: BTreeSet<u16>,
}

impl Reservation {
    /// CPU list in `taskset`/cgroup format: `"0,1,3"`.
    pub fn cpu_list(&self) -> String {
        self.cpus
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Shared pool of resources that concurrent executions draw from.
#[derive(Debug)]
pub struct ResourcePool {
    available: Mutex<Constraints>,
    released: Condvar,
}

impl ResourcePool {
    #[allow(missing_docs)]
    pub fn new(constraints: Constraints) -> ResourcePool {
        ResourcePool {
            available: Mutex::new(constraints),
            released: Condvar::new(),
        }
    }

    /// Block until one execution's worth of resources is free, then take it.
    ///
    /// The resources go back to the pool when the returned guard is dropped.
    pub fn acquire(&self) -> ReservationGuard<'_> {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(reservation) = available.try_take() {
                trace!(cpus = reservation.cpu_list(), "resources reserved");
                return ReservationGuard {
                    pool: self,
                    reservation,
                };
            }
            available = self
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Same as [`acquire`](Self::acquire), giving up at `deadline`.
    pub fn acquire_until(&self, deadline: Instant) -> Option<ReservationGuard<'_>> {
        let mut available = self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(reservation) = available.try_take() {
                trace!(cpus = reservation.cpu_list(), "resources reserved");
                return Some(ReservationGuard {
                    pool: self,
                    reservation,
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            available = self
                .released
                .wait_timeout(available, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn release(&self, reservation: Reservation) {
        self.available
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(reservation);
        self.released.notify_one();
    }
}

/// Gives its [`Reservation`] back to the pool on drop.
#[derive(Debug)]
pub struct ReservationGuard<'a> {
    pool: &'a ResourcePool,
    reservation: Reservation,
}

impl ReservationGuard<'_> {
    #[allow(missing_docs)]
    pub fn reservation(&self) -> &Reservation {
        &self.reservation
    }
}

impl Drop for ReservationGuard<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.reservation));
    }
}
