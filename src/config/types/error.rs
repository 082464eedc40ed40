//! Errors raised while loading `warden.toml`.
//!
//! Validation never stops at the first problem: every section reports into a
//! shared [`ConfigDiagnostics`], and the whole batch is returned at once.

use super::FieldPath;
use owo_colors::OwoColorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("malformed config file")]
    Toml(#[from] toml::de::Error),

    // No #[from]: the diagnostics print themselves, a source would repeat them
    #[error("{0}")]
    Diagnostics(ConfigDiagnostics),
}

/// One rejected setting.
#[derive(Debug, Clone)]
pub struct ConfigDiagnostic {
    /// e.g. `unit[0].launch`
    pub field: FieldPath,
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ConfigDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  {} {}: {}", "×".red(), self.field.as_str().cyan(), self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n      {} {}", "hint:".yellow(), hint)?;
        }
        Ok(())
    }
}

/// Errors and warnings collected over one validation pass.
#[derive(Debug, Default)]
pub struct ConfigDiagnostics {
    errors: Vec<ConfigDiagnostic>,
    /// Suspicious but usable settings.
    warnings: Vec<(FieldPath, String)>,
}

impl ConfigDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, field: FieldPath, message: impl Into<String>) {
        self.push(field, message.into(), None);
    }

    pub fn error_with_hint(
        &mut self,
        field: FieldPath,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.push(field, message.into(), Some(hint.into()));
    }

    fn push(&mut self, field: FieldPath, message: String, hint: Option<String>) {
        self.errors.push(ConfigDiagnostic { field, message, hint });
    }

    pub fn warn(&mut self, field: FieldPath, message: impl Into<String>) {
        self.warnings.push((field, message.into()));
    }

    /// Warnings go to the log; they never fail the load.
    pub fn print_warnings(&self) {
        for (field, message) in &self.warnings {
            crate::warn!("config"; "{}: {}", field.as_str(), message);
        }
    }

    pub fn errors(&self) -> &[ConfigDiagnostic] {
        &self.errors
    }

    #[cfg(test)]
    pub fn warnings(&self) -> &[(FieldPath, String)] {
        &self.warnings
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ConfigDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.errors.len();
        write!(
            f,
            "{} ({} problem{})",
            "invalid configuration".red().bold(),
            count,
            if count == 1 { "" } else { "s" }
        )?;
        for err in &self.errors {
            write!(f, "\n{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigDiagnostics {}
