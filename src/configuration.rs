//! Config for the contest behaviors
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration values. All
//! values are optional, and case-insensitive. Set the value to `"true"` to enable a flag.
//!
//! - `CONTEST_VERBOSE`: Print round progress to stdout (default: `true`)
//! - `CONTEST_LOG`: Enable logging to a file (default: `false`)
//! - `CONTEST_ALLOW_UNCONTAINED`: Run sandboxed code without cgroup/`taskset` when they are unavailable (default: `false`)
//! - `CONTEST_SEQUENTIAL_DEVELOPERS`: Query developers one after the other instead of concurrently (default: `false`)
//! - `CONTEST_DEBUG_SANDBOX_OUTPUT`: Log the output of every sandboxed execution (default: `false`)

/// Configuration for contest behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) allow_uncontained: bool,
    pub(crate) sequential_developers: bool,
    pub(crate) debug_sandbox_output: bool,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Round progress is printed to stdout.
    /// - Logging to file is disabled.
    /// - Uncontained execution is not allowed.
    /// - Developers are queried concurrently.
    /// - Sandbox output is not logged.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            allow_uncontained: false,
            sequential_developers: false,
            debug_sandbox_output: false,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Any value other than `"true"` (including unset) falls back to the default of that flag,
    /// except for flags defaulting to `true`, which are disabled by any set value other than `"true"`.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        Self {
            verbose: get_env_flag("CONTEST_VERBOSE", true),
            log: get_env_flag("CONTEST_LOG", false),
            allow_uncontained: get_env_flag("CONTEST_ALLOW_UNCONTAINED", false),
            sequential_developers: get_env_flag("CONTEST_SEQUENTIAL_DEVELOPERS", false),
            debug_sandbox_output: get_env_flag("CONTEST_DEBUG_SANDBOX_OUTPUT", false),
        }
    }

    /// Enable or disable progress output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable uncontained fallback.
    ///
    /// When enabled and cgroups or `taskset` are missing, only the deadline is enforced.
    pub fn with_allow_uncontained(mut self, value: bool) -> Self {
        self.allow_uncontained = value;
        self
    }

    /// Query developers one after the other.
    pub fn with_sequential_developers(mut self, value: bool) -> Self {
        self.sequential_developers = value;
        self
    }

    /// Enable or disable logging of sandbox output (debug purposes only).
    pub fn with_debug_sandbox_output(mut self, value: bool) -> Self {
        self.debug_sandbox_output = value;
        self
    }

    /// Whether progress is printed to stdout.
    pub fn verbose_enabled(&self) -> bool {
        self.verbose
    }

    /// Whether a log file should be written.
    pub fn log_enabled(&self) -> bool {
        self.log
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_flags() {
        let config = Configuration::new()
            .with_verbose(false)
            .with_allow_uncontained(true)
            .with_sequential_developers(true);
        assert!(!config.verbose);
        assert!(config.allow_uncontained);
        assert!(config.sequential_developers);
        assert!(!config.log);
        assert_eq!(Configuration::default(), Configuration::new());
    }
}
