//! Managed unit: one named worker, its repository and its live deployment.

use std::fmt;
use std::path::PathBuf;

/// A worker whose code lives in a repository and whose live deployment and
/// running process warden maintains.
///
/// Built once from configuration, immutable afterwards. Identity is `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedUnit {
    /// Unique unit name (also the default repository name).
    pub name: String,
    /// Remote repository URI to clone/pull from.
    pub remote: String,
    /// Local clone used as the source of truth before deployment.
    pub working_copy: PathBuf,
    /// Directory the worker runs from.
    pub live_dir: PathBuf,
    /// Shell command line starting the worker, run from `live_dir`.
    pub launch: String,
}

impl fmt::Display for ManagedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Outcome of synchronizing one unit in a poll cycle. Never persisted.
#[derive(Debug, Clone, Copy)]
pub struct SyncResult<'a> {
    pub unit: &'a ManagedUnit,
    pub changed: bool,
}

#[cfg(test)]
pub(crate) fn test_unit(name: &str, root: &std::path::Path) -> ManagedUnit {
    ManagedUnit {
        name: name.to_string(),
        remote: root.join("remote").join(format!("{name}.git")).display().to_string(),
        working_copy: root.join("repos").join(name),
        live_dir: root.join("live").join(name),
        launch: format!("python3 {name}.py"),
    }
}
