//! Launch tokens and PID files: how warden recognises the workers it started.
//!
//! Every launch exports `WARDEN_UNIT=<unit>:<nonce>` into the worker's
//! environment. The variable survives `exec` and is inherited by the worker's
//! own children, so all processes of one unit carry it. The most recent
//! launch is also recorded in `<state_dir>/<unit>.pid` as `<pid> <token>`.

use crate::debug;
use anyhow::{Context, Result};
use std::{
    fmt, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

/// Environment variable carrying the launch token.
pub const TOKEN_ENV: &str = "WARDEN_UNIT";

/// Identity stamped on one launch of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchToken {
    unit: String,
    nonce: String,
}

impl LaunchToken {
    /// Fresh token for `unit`, unique per launch.
    pub fn new(unit: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Self {
            unit: unit.to_string(),
            nonce: format!("{:x}-{:x}", std::process::id(), nanos),
        }
    }

    /// Parse `<unit>:<nonce>`. The nonce never contains `:`, the unit may.
    pub fn parse(value: &str) -> Option<Self> {
        let (unit, nonce) = value.rsplit_once(':')?;
        if unit.is_empty() || nonce.is_empty() {
            return None;
        }
        Some(Self {
            unit: unit.to_string(),
            nonce: nonce.to_string(),
        })
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// `(key, value)` pair for the worker's environment.
    pub fn env(&self) -> (&'static str, String) {
        (TOKEN_ENV, self.to_string())
    }
}

impl fmt::Display for LaunchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit, self.nonce)
    }
}

/// Find the launch token in a process environment (`KEY=VALUE` entries).
pub fn token_in_env<S: AsRef<str>>(env: &[S]) -> Option<LaunchToken> {
    env.iter()
        .filter_map(|entry| entry.as_ref().split_once('='))
        .find(|(key, _)| *key == TOKEN_ENV)
        .and_then(|(_, value)| LaunchToken::parse(value))
}

/// Whether a process environment marks it as a worker of `unit`.
pub fn belongs_to<S: AsRef<str>>(env: &[S], unit: &str) -> bool {
    token_in_env(env).is_some_and(|token| token.unit() == unit)
}

// ============================================================================
// PID files
// ============================================================================

/// Location of `unit`'s PID file.
pub fn pid_file(state_dir: &Path, unit: &str) -> PathBuf {
    state_dir.join(format!("{unit}.pid"))
}

/// Record a launch.
pub fn write_pid_file(path: &Path, pid: u32, token: &LaunchToken) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{pid} {token}\n"))
        .with_context(|| format!("Failed to write pid file {}", path.display()))
}

/// Read a recorded launch. Missing or malformed files yield `None`.
pub fn read_pid_file(path: &Path) -> Option<(u32, LaunchToken)> {
    let content = fs::read_to_string(path).ok()?;
    let (pid, token) = content.trim().split_once(' ')?;
    Some((pid.parse().ok()?, LaunchToken::parse(token)?))
}

/// Forget a recorded launch. A file that is already gone is fine.
pub fn remove_pid_file(path: &Path) {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => {
            debug!("process"; "cannot remove pid file {}: {}", path.display(), e);
        }
        _ => {}
    }
}
