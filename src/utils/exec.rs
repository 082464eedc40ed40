//! External command execution utilities.
//!
//! Provides a Builder-based API for running commands to completion with
//! output logging, and for spawning detached long-running workers.
//!
//! # Examples
//!
//! ```ignore
//! use crate::utils::exec::Cmd;
//!
//! // Simple command
//! Cmd::new("git").args(["status", "-s"]).run()?;
//!
//! // With working directory and a noise filter
//! Cmd::new("git")
//!     .args(["pull", "--ff-only"])
//!     .cwd(repo)
//!     .filter(&GIT_FILTER)
//!     .run()?;
//!
//! // Detached worker
//! let child = Cmd::new("sh").args(["-c", "python3 app.py"]).cwd(live).spawn_detached(None)?;
//! ```

use anyhow::{Context, Result};
use regex::Regex;
use std::{
    ffi::{OsStr, OsString},
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    process::{Child, Command, Output, Stdio},
    sync::OnceLock,
};

// ============================================================================
// Builder API
// ============================================================================

/// Command builder for external process execution.
#[derive(Default)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    filter: Option<&'static FilterRule>,
}

impl Cmd {
    /// Create a new command builder.
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            ..Default::default()
        }
    }

    /// Add a single argument.
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        let arg = arg.as_ref();
        if !arg.is_empty() {
            self.args.push(arg.to_owned());
        }
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            let arg = arg.as_ref();
            if !arg.is_empty() {
                self.args.push(arg.to_owned());
            }
        }
        self
    }

    /// Set working directory.
    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    /// Set environment variables for the subprocess.
    pub fn envs<K, V, I>(mut self, vars: I) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in vars {
            self.envs.push((k.as_ref().to_owned(), v.as_ref().to_owned()));
        }
        self
    }

    /// Set output filter for logging.
    pub fn filter(mut self, filter: &'static FilterRule) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Execute the command to completion and return output.
    ///
    /// A non-zero exit status is an error carrying the filtered stderr.
    pub fn run(self) -> Result<Output> {
        let filter = self.filter.unwrap_or(&EMPTY_FILTER);
        let name = self.program_name();
        let mut cmd = self.command();

        let output = cmd
            .output()
            .with_context(|| format!("Failed to execute `{name}`"))?;

        log_output(&name, &output, filter)?;
        Ok(output)
    }

    /// Spawn the command detached from warden and return immediately.
    ///
    /// The child gets its own process group (so a Ctrl+C aimed at warden does
    /// not reach it) and no stdin. Stdout and stderr are appended to `log`
    /// when given, discarded otherwise.
    pub fn spawn_detached(self, log: Option<&Path>) -> Result<Child> {
        let name = self.program_name();
        let mut cmd = self.command();
        cmd.stdin(Stdio::null());

        match log {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let out = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open worker log {}", path.display()))?;
                let err = out.try_clone()?;
                cmd.stdout(out).stderr(err);
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        cmd.spawn()
            .with_context(|| format!("Failed to spawn `{name}`"))
    }
}

// ============================================================================
// Macro helper
// ============================================================================

/// Create a command from a single program name.
///
/// This is a helper for the `exec!` macro.
#[inline]
pub fn cmd<S: AsRef<OsStr>>(program: S) -> Cmd {
    Cmd::new(program)
}

impl Cmd {
    /// Get the program name for error messages.
    fn program_name(&self) -> String {
        self.program.to_string_lossy().to_string()
    }

    /// Build the std command from the builder state.
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(self.envs.iter().cloned());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

// ============================================================================
// Macro (syntax sugar for simple cases)
// ============================================================================

/// Run an external command with arguments.
///
/// # Syntax
///
/// ```ignore
/// exec!("git"; "status", "-s")?;
///
/// // With working directory
/// exec!(root; "git"; "status")?;
///
/// // With filter and working directory
/// exec!(filter=&F; root; git; "pull", "--ff-only")?;
/// ```
#[macro_export]
macro_rules! exec {
    // filter + root + cmd
    (filter=$filter:expr; $root:expr; $cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::cmd($cmd)
            $(.arg($arg))*
            .cwd($root)
            .filter($filter)
            .run()
    };
    // filter + cmd
    (filter=$filter:expr; $cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::cmd($cmd)
            $(.arg($arg))*
            .filter($filter)
            .run()
    };
    // root + cmd
    ($root:expr; $cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::cmd($cmd)
            $(.arg($arg))*
            .cwd($root)
            .run()
    };
    // cmd only
    ($cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::cmd($cmd)
            $(.arg($arg))*
            .run()
    };
}

// ============================================================================
// Output Filtering
// ============================================================================

/// Filter rule for command output logging.
///
/// Used to reduce noise by skipping known warnings or irrelevant messages.
pub struct FilterRule {
    /// Prefixes to skip when logging output.
    pub skip_prefixes: &'static [&'static str],
}

impl FilterRule {
    /// Create a new filter rule.
    pub const fn new(skip_prefixes: &'static [&'static str]) -> Self {
        Self { skip_prefixes }
    }

    /// Check if a line should be skipped.
    fn should_skip(&self, line: &str) -> bool {
        line.is_empty() || self.skip_prefixes.iter().any(|p| line.starts_with(p))
    }

    /// Log output lines that pass the filter.
    pub fn log(&self, name: &str, output: &str) {
        let lines: Vec<_> = output
            .lines()
            .filter(|line| {
                let plain = strip_ansi(line);
                let trimmed = plain.trim();
                !trimmed.is_empty() && !self.should_skip(trimmed)
            })
            .collect();

        if !lines.is_empty() {
            crate::debug!(name; "{}", lines.join("\n"));
        }
    }
}

/// Empty filter (no skipping).
pub const EMPTY_FILTER: FilterRule = FilterRule::new(&[]);

// ============================================================================
// Helpers
// ============================================================================

/// Strip ANSI escape codes from string.
pub(crate) fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    match RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").ok()) {
        Some(re) => re.replace_all(s, ""),
        None => std::borrow::Cow::Borrowed(s),
    }
}

/// Log command output, returning error on failure.
fn log_output(name: &str, output: &Output, filter: &'static FilterRule) -> Result<()> {
    if !output.status.success() {
        anyhow::bail!(format_error(name, output, filter));
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    filter.log(name, stderr.trim());
    Ok(())
}

/// Format error message for failed command.
fn format_error(name: &str, output: &Output, filter: &'static FilterRule) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let error_msg = filter
        .skip_prefixes
        .iter()
        .fold(stderr.trim(), |s, p| s.trim_start_matches(p).trim_start());

    let mut msg = format!("Command `{name}` failed with {}", output.status);
    if !error_msg.is_empty() {
        msg.push_str(": ");
        msg.push_str(error_msg);
    }

    let stdout_trimmed = stdout.trim();
    if !stdout_trimmed.is_empty() {
        msg.push_str("\nStdout:\n");
        msg.push_str(stdout_trimmed);
    }
    msg
}

// ============================================================================
// Tests
// ============================================================================
