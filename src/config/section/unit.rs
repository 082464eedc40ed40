//! `[[unit]]` sections: one per managed worker.
//!
//! # Example
//!
//! ```toml
//! [[unit]]
//! name = "datacollector"
//! remote = "https://github.com/owner/datacollector"  # Default: <remote_base>/<name>
//! working_copy = "repos/datacollector"               # Default: <base_dir>/repos/<name>
//! live_dir = "datacollector"                         # Default: <base_dir>/<name>
//! launch = "python3 datacollector.py"                # Default: python3 <name>.py
//! ```
//!
//! Relative `working_copy` and `live_dir` are resolved against `base_dir`.

use crate::config::{ConfigDiagnostics, FieldPath};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    /// Unique name, also the default repository and directory name.
    pub name: String,

    /// Repository URI.
    pub remote: Option<String>,

    /// Local clone.
    pub working_copy: Option<PathBuf>,

    /// Directory the worker runs from.
    pub live_dir: Option<PathBuf>,

    /// Shell command line starting the worker.
    pub launch: Option<String>,
}

impl UnitConfig {
    /// Remote URI, falling back to `<remote_base>/<name>`.
    pub fn remote(&self, remote_base: Option<&str>) -> Option<String> {
        self.remote.clone().or_else(|| {
            remote_base.map(|base| format!("{}/{}", base.trim_end_matches('/'), self.name))
        })
    }

    pub fn launch(&self) -> String {
        self.launch
            .clone()
            .unwrap_or_else(|| format!("python3 {}.py", self.name))
    }

    /// # Checks
    /// - `name` is non-empty and free of path separators
    /// - `launch` is not blank
    /// - a remote is known
    pub fn validate(&self, index: usize, remote_base: Option<&str>, diag: &mut ConfigDiagnostics) {
        let field = |name: &str| FieldPath::indexed("unit", index, name);

        if self.name.trim().is_empty() {
            diag.error(field("name"), "unit name must not be empty");
        } else if self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            diag.error_with_hint(
                field("name"),
                format!("unit name `{}` is not a plain directory name", self.name),
                "set `working_copy`/`live_dir` to place the unit elsewhere",
            );
        }

        if self.launch().trim().is_empty() {
            diag.error(field("launch"), "launch command must not be empty");
        }

        if self.remote(remote_base).is_none() {
            diag.error_with_hint(
                field("remote"),
                format!("no remote for unit `{}`", self.name),
                "set `remote` or `supervisor.remote_base`",
            );
        }
    }
}
