//! `[supervisor]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [supervisor]
//! base_dir = "~/pimon"          # Deployment root, created at startup
//! poll_interval = 900           # Seconds between poll cycles
//! stop_timeout = 10             # Seconds a terminated worker gets to exit
//! log_file = "/tmp/warden.log"  # Used unless -c/--console
//! remote_base = "https://github.com/owner"
//! restart_on = "materialized"   # or "changed"
//! launch_grace = 0              # Seconds; >0 checks the worker survived launch
//! exclude = [".git"]            # Directory names never deployed
//! git = "git"                   # git executable
//! ```

use crate::config::{ConfigDiagnostics, FieldPath};
use crate::controller::RestartGate;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Deployment root. Holds working copies, live directories and state.
    pub base_dir: PathBuf,

    /// Seconds between poll cycles.
    pub poll_interval: u64,

    /// Seconds a terminated worker gets to exit before warden moves on.
    pub stop_timeout: u64,

    /// Log file used unless logging to the console.
    pub log_file: PathBuf,

    /// Account URL; a unit without `remote` pulls from `<remote_base>/<name>`.
    pub remote_base: Option<String>,

    /// Restart gate after a successful sync.
    pub restart_on: RestartGate,

    /// Seconds after launch at which the worker must still be alive. 0 disables.
    pub launch_grace: u64,

    /// Directory names excluded from deployment.
    pub exclude: Vec<String>,

    /// git executable, name or path.
    pub git: PathBuf,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("~/pimon"),
            poll_interval: 900,
            stop_timeout: 10,
            log_file: PathBuf::from("/tmp/warden.log"),
            remote_base: None,
            restart_on: RestartGate::default(),
            launch_grace: 0,
            exclude: crate::deploy::DEFAULT_EXCLUDE
                .iter()
                .map(|s| s.to_string())
                .collect(),
            git: PathBuf::from("git"),
        }
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout)
    }

    pub fn launch_grace(&self) -> Duration {
        Duration::from_secs(self.launch_grace)
    }

    /// PID files and worker logs.
    pub fn state_dir(&self) -> PathBuf {
        self.base_dir.join(".warden")
    }

    /// # Checks
    /// - `poll_interval` is positive
    /// - `git` resolves to an executable
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.poll_interval == 0 {
            diag.error(
                FieldPath::new("supervisor.poll_interval"),
                "poll interval must be greater than 0",
            );
        }

        if self.stop_timeout == 0 {
            diag.warn(
                FieldPath::new("supervisor.stop_timeout"),
                "terminated workers are not waited for",
            );
        }

        if which::which(&self.git).is_err() {
            diag.error_with_hint(
                FieldPath::new("supervisor.git"),
                format!("`{}` not found", self.git.display()),
                "install git or set `git` to the executable's path",
            );
        }

        if self.exclude.iter().all(|name| name != ".git") {
            diag.warn(
                FieldPath::new("supervisor.exclude"),
                "`.git` is not excluded, repository metadata will be deployed",
            );
        }
    }
}
