//! The OS process table: enumeration via sysinfo, signals via nix.

use crate::utils::exec::Cmd;
use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::{Pid as NixPid, getpgid};
use rustc_hash::FxHashMap;
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Child,
    thread,
    time::{Duration, Instant},
};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// Interval between liveness checks while waiting for a process to exit.
const EXIT_POLL: Duration = Duration::from_millis(100);

/// Snapshot of one live process.
#[derive(Debug, Clone, Default)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Executable path, if readable.
    pub exe: Option<PathBuf>,
    /// Command line, empty if unreadable.
    pub cmd: Vec<String>,
    /// Environment as `KEY=VALUE`, empty if unreadable.
    pub env: Vec<String>,
}

/// Everything needed to start one worker.
#[derive(Debug, Clone)]
pub struct LaunchSpec<'a> {
    /// Shell command line.
    pub command: &'a str,
    /// Working directory.
    pub cwd: &'a Path,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// File receiving stdout and stderr.
    pub log: Option<PathBuf>,
}

/// Process collaborator of the lifecycle manager.
pub trait ProcessTable {
    /// All live processes that could be listed.
    fn list(&mut self) -> Vec<ProcessInfo>;

    /// Ask `pid` to terminate. A process that is already gone is not an error.
    fn terminate(&mut self, pid: u32) -> Result<()>;

    /// Wait up to `timeout` for `pid` to exit. Returns whether it exited.
    fn wait_for_exit(&mut self, pid: u32, timeout: Duration) -> bool;

    /// Start a detached worker and return its pid without waiting for it.
    fn spawn_detached(&mut self, spec: &LaunchSpec<'_>) -> Result<u32>;

    /// Whether `pid` is still running.
    fn is_alive(&mut self, pid: u32) -> bool;
}

/// The real process table of this host.
///
/// Workers spawned here are kept as [`Child`] handles only so they can be
/// reaped once terminated; they are never supervised.
pub struct SystemProcessTable {
    system: System,
    children: FxHashMap<u32, Child>,
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            children: FxHashMap::default(),
        }
    }

    /// Reap `pid` if it is one of our exited children. Returns true if reaped.
    fn reap(&mut self, pid: u32) -> bool {
        let Some(child) = self.children.get_mut(&pid) else {
            return false;
        };
        match child.try_wait() {
            Ok(Some(_)) | Err(_) => {
                self.children.remove(&pid);
                true
            }
            Ok(None) => false,
        }
    }

    /// Drop handles of children that exited on their own.
    fn reap_all(&mut self) {
        self.children
            .retain(|_, child| matches!(child.try_wait(), Ok(None)));
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SystemProcessTable {
    fn list(&mut self) -> Vec<ProcessInfo> {
        self.reap_all();
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new()
                .with_exe(UpdateKind::Always)
                .with_cmd(UpdateKind::Always)
                .with_environ(UpdateKind::Always),
        );

        let own = Pid::from_u32(std::process::id());
        self.system
            .processes()
            .iter()
            .filter(|(pid, process)| **pid != own && process.thread_kind().is_none())
            .map(|(pid, process)| ProcessInfo {
                pid: pid.as_u32(),
                exe: process.exe().map(Path::to_path_buf),
                cmd: process.cmd().iter().map(lossy).collect(),
                env: process.environ().iter().map(lossy).collect(),
            })
            .collect()
    }

    fn terminate(&mut self, pid: u32) -> Result<()> {
        let target = nix_pid(pid)?;
        // Workers lead their own process group; signal the whole group so a
        // shell wrapper does not leave its child behind
        let result = match getpgid(Some(target)) {
            Ok(group) if group == target => killpg(group, Signal::SIGTERM),
            _ => kill(target, Signal::SIGTERM),
        };
        match result {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to signal pid {pid}")),
        }
    }

    fn wait_for_exit(&mut self, pid: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_alive(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(EXIT_POLL);
        }
    }

    fn spawn_detached(&mut self, spec: &LaunchSpec<'_>) -> Result<u32> {
        let child = Cmd::new("sh")
            .args(["-c", spec.command])
            .cwd(spec.cwd)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .spawn_detached(spec.log.as_deref())?;
        let pid = child.id();
        self.children.insert(pid, child);
        Ok(pid)
    }

    fn is_alive(&mut self, pid: u32) -> bool {
        if self.reap(pid) {
            return false;
        }
        let Ok(pid) = nix_pid(pid) else {
            return false;
        };
        // Signal 0 probes existence; EPERM means alive but not ours
        match kill(pid, None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

fn nix_pid(pid: u32) -> Result<NixPid> {
    let raw = i32::try_from(pid).with_context(|| format!("pid {pid} out of range"))?;
    Ok(NixPid::from_raw(raw))
}

fn lossy<S: AsRef<OsStr>>(s: &S) -> String {
    s.as_ref().to_string_lossy().into_owned()
}
