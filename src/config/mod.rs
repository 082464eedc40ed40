//! Supervisor configuration management for `warden.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── supervisor # [supervisor]
//! │   └── unit       # [[unit]]
//! ├── types/         # Utility types
//! │   ├── error      # ConfigError, ConfigDiagnostics
//! │   └── field      # FieldPath
//! └── mod.rs         # WardenConfig (this file)
//! ```
//!
//! The configuration is loaded once at startup; components receive the values
//! they need at construction time.

pub mod section;
pub mod types;

pub use section::{SupervisorConfig, UnitConfig};
pub use types::{ConfigDiagnostics, ConfigError, FieldPath};

use crate::cli::Cli;
use crate::core::ManagedUnit;
use crate::utils::path::normalize_path;
use crate::warn;
use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing warden.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WardenConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Directory of the config file; relative paths resolve against it
    #[serde(skip)]
    pub root: PathBuf,

    /// Supervisor-wide settings
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Managed units, in polling order
    #[serde(default, rename = "unit")]
    pub units: Vec<UnitConfig>,
}

impl WardenConfig {
    /// Load, normalize and validate the configuration named on the command line.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;
        let config_path = normalize_path(&cwd.join(&cli.config));

        let mut config = Self::from_path(&config_path)?;
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(cwd);

        config.config_path = config_path;
        config.finalize(&root, cli);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    ///
    /// Unknown fields are reported and ignored; warden runs unattended and
    /// never prompts.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })
        .map_err(ConfigError::Toml)?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        warn!("config"; "unknown fields in {}, ignoring: {}", path.display(), fields.join(", "));
    }

    // ========================================================================
    // cli overrides and path normalization
    // ========================================================================

    /// Apply command-line overrides, then make every path absolute.
    fn finalize(&mut self, root: &Path, cli: &Cli) {
        self.root = root.to_path_buf();

        Self::update_option(&mut self.supervisor.poll_interval, cli.poll_interval.as_ref());
        Self::update_option(&mut self.supervisor.base_dir, cli.base_dir.as_ref());

        self.normalize_paths(root);
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// `~` is expanded; relative supervisor paths resolve against the config
    /// directory, relative unit paths against `base_dir`.
    fn normalize_paths(&mut self, root: &Path) {
        let sup = &mut self.supervisor;
        sup.base_dir = expand_path(&sup.base_dir, root);
        sup.log_file = expand_path(&sup.log_file, root);

        let base = sup.base_dir.clone();
        for unit in &mut self.units {
            for path in [&mut unit.working_copy, &mut unit.live_dir].into_iter().flatten() {
                *path = expand_path(path, &base);
            }
        }
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Validate the whole configuration.
    ///
    /// Collects all validation errors and returns them at once.
    pub fn validate(&self) -> Result<()> {
        let mut diag = ConfigDiagnostics::new();

        if self.units.is_empty() {
            diag.error_with_hint(
                FieldPath::new("unit"),
                "no units configured",
                "add at least one [[unit]] section with a `name`",
            );
        }

        self.supervisor.validate(&mut diag);

        let remote_base = self.supervisor.remote_base.as_deref();
        let mut seen = FxHashSet::default();
        for (i, unit) in self.units.iter().enumerate() {
            unit.validate(i, remote_base, &mut diag);
            if !unit.name.is_empty() && !seen.insert(unit.name.as_str()) {
                diag.error(
                    FieldPath::indexed("unit", i, "name"),
                    format!("duplicate unit name `{}`", unit.name),
                );
            }
        }

        diag.print_warnings();
        diag.into_result()
            .map_err(|e| ConfigError::Diagnostics(e).into())
    }

    // ========================================================================
    // derived values
    // ========================================================================

    /// Managed units with every default filled in, in configured order.
    pub fn units(&self) -> Vec<ManagedUnit> {
        let sup = &self.supervisor;
        self.units
            .iter()
            .map(|unit| ManagedUnit {
                name: unit.name.clone(),
                remote: unit
                    .remote(sup.remote_base.as_deref())
                    .unwrap_or_default(),
                working_copy: unit
                    .working_copy
                    .clone()
                    .unwrap_or_else(|| sup.base_dir.join("repos").join(&unit.name)),
                live_dir: unit
                    .live_dir
                    .clone()
                    .unwrap_or_else(|| sup.base_dir.join(&unit.name)),
                launch: unit.launch(),
            })
            .collect()
    }

    /// PID files and worker logs.
    pub fn state_dir(&self) -> PathBuf {
        self.supervisor.state_dir()
    }
}

/// Expand `~` and resolve a relative path against `base`.
fn expand_path(path: &Path, base: &Path) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());
    if expanded.is_relative() {
        normalize_path(&base.join(expanded))
    } else {
        normalize_path(&expanded)
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config content.
/// Panics if there are unknown fields (to catch config typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> WardenConfig {
    let (parsed, ignored) = WardenConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::git_available;
    use clap::Parser;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("warden").chain(args.iter().copied())).unwrap()
    }

    fn error_fields(config: &WardenConfig) -> Vec<String> {
        let err = config.validate().unwrap_err();
        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::Diagnostics(diag)) => diag
                .errors()
                .iter()
                .map(|e| e.field.as_str().to_string())
                .collect(),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    const MINIMAL: &str = r#"
[supervisor]
base_dir = "/srv/pimon"
remote_base = "https://github.com/owner"

[[unit]]
name = "datacollector"
"#;

    #[test]
    fn test_from_str_invalid_toml() {
        assert!(WardenConfig::parse_with_ignored("[supervisor\npoll_interval = 1").is_err());
    }

    #[test]
    fn test_unit_defaults() {
        let config = test_parse_config(MINIMAL);
        let units = config.units();
        assert_eq!(units.len(), 1);

        let unit = &units[0];
        assert_eq!(unit.name, "datacollector");
        assert_eq!(unit.remote, "https://github.com/owner/datacollector");
        assert_eq!(unit.working_copy, PathBuf::from("/srv/pimon/repos/datacollector"));
        assert_eq!(unit.live_dir, PathBuf::from("/srv/pimon/datacollector"));
        assert_eq!(unit.launch, "python3 datacollector.py");
    }

    #[test]
    fn test_units_keep_configured_order() {
        let config = test_parse_config(
            "[supervisor]\nremote_base = \"r\"\n[[unit]]\nname = \"b\"\n[[unit]]\nname = \"a\"\n",
        );
        let names: Vec<_> = config.units().into_iter().map(|u| u.name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_unknown_fields_detected() {
        let content = format!("{MINIMAL}launch_as = \"root\"\n[extra]\nkey = 1\n");
        let (config, ignored) = WardenConfig::parse_with_ignored(&content).unwrap();

        assert_eq!(config.units.len(), 1);
        assert!(ignored.iter().any(|f| f.contains("launch_as")));
        assert!(ignored.iter().any(|f| f.contains("extra")));
    }

    #[test]
    fn test_finalize_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let mut config = test_parse_config(
            r#"
[supervisor]
base_dir = "deploy"
log_file = "logs/warden.log"
remote_base = "r"

[[unit]]
name = "a"
working_copy = "src/a"
live_dir = "/opt/a"
"#,
        );
        config.finalize(dir.path(), &cli(&[]));

        // Neither path exists yet, so nothing is canonicalized
        let root = dir.path().to_path_buf();
        assert_eq!(config.supervisor.base_dir, root.join("deploy"));
        assert_eq!(config.supervisor.log_file, root.join("logs").join("warden.log"));
        assert_eq!(config.state_dir(), root.join("deploy").join(".warden"));

        let unit = &config.units()[0];
        assert_eq!(unit.working_copy, root.join("deploy").join("src").join("a"));
        assert_eq!(unit.live_dir, PathBuf::from("/opt/a"));
    }

    #[test]
    fn test_finalize_expands_tilde() {
        let Some(home) = std::env::var_os("HOME") else {
            return;
        };
        let mut config = test_parse_config("[supervisor]\nbase_dir = \"~/pimon\"\n");
        config.finalize(Path::new("/etc"), &cli(&[]));
        assert_eq!(config.supervisor.base_dir, normalize_path(&PathBuf::from(home).join("pimon")));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = test_parse_config(MINIMAL);
        config.finalize(Path::new("/etc"), &cli(&["--poll-interval", "5", "--base-dir", "/tmp/w"]));

        assert_eq!(config.supervisor.poll_interval, 5);
        assert_eq!(config.supervisor.base_dir, normalize_path(Path::new("/tmp/w")));
        assert_eq!(config.units()[0].live_dir, normalize_path(Path::new("/tmp/w")).join("datacollector"));
    }

    #[test]
    fn test_validate_minimal() {
        if !git_available() {
            return;
        }
        assert!(test_parse_config(MINIMAL).validate().is_ok());
    }

    #[test]
    fn test_validate_no_units() {
        let config = test_parse_config("[supervisor]\nremote_base = \"r\"\n");
        assert!(error_fields(&config).contains(&"unit".to_string()));
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = test_parse_config(
            r#"
[supervisor]
poll_interval = 0
git = "/nonexistent/git"

[[unit]]
name = "a"
remote = "r"

[[unit]]
name = "a"
remote = "r"

[[unit]]
name = "b"
launch = ""
"#,
        );
        let fields = error_fields(&config);
        assert_eq!(
            fields,
            vec![
                "supervisor.poll_interval",
                "supervisor.git",
                "unit[1].name",
                "unit[2].launch",
                "unit[2].remote",
            ]
        );
    }

    #[test]
    fn test_load_from_file() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warden.toml");
        fs::write(&path, MINIMAL).unwrap();

        let config = WardenConfig::load(&cli(&["-C", path.to_str().unwrap()])).unwrap();
        assert_eq!(config.config_path, normalize_path(&path));
        assert_eq!(config.root, normalize_path(dir.path()));
        assert_eq!(config.units()[0].name, "datacollector");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        let err = WardenConfig::load(&cli(&["-C", path.to_str().unwrap()])).unwrap_err();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::Io(..))));
    }
}
