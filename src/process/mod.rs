//! Process lifecycle: find a unit's running workers, stop them, start one
//! fresh instance from the live directory.
//!
//! # Identification
//!
//! The pid recorded in the unit's PID file is checked first. Enumeration then
//! catches every process whose environment carries the unit's launch token
//! (see [`token`]). Command lines are never matched against the unit name.
//!
//! # Restart sequence
//!
//! ```text
//! list processes ─→ workers of unit ─→ SIGTERM each ─→ wait (stop timeout)
//!                                                          │
//!                     launch detached ←────────────────────┘
//!                            │
//!                     launch policy (fire-and-forget | grace period probe)
//! ```

mod table;
pub mod token;

pub use table::{LaunchSpec, ProcessInfo, ProcessTable, SystemProcessTable};

use crate::core::ManagedUnit;
use crate::{debug, error, log, warn};
use anyhow::{Result, bail};
use std::{
    path::PathBuf,
    thread,
    time::Duration,
};
use token::LaunchToken;

/// Default time a terminated worker gets to exit.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// What happens right after a worker was spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchPolicy {
    /// Return immediately, no verification.
    #[default]
    FireAndForget,
    /// Check after the given delay that the worker is still running.
    GracePeriod(Duration),
}

impl LaunchPolicy {
    /// `0` disables the probe.
    pub fn from_grace(grace: Duration) -> Self {
        if grace.is_zero() {
            Self::FireAndForget
        } else {
            Self::GracePeriod(grace)
        }
    }
}

/// Outcome of one [`ProcessManager::restart_unit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestartReport {
    /// Workers that were signalled.
    pub terminated: usize,
    /// Pid of the new worker, `None` if the launch failed.
    pub launched: Option<u32>,
}

/// Restarts units' workers through a [`ProcessTable`].
pub struct ProcessManager<P: ProcessTable> {
    table: P,
    state_dir: PathBuf,
    stop_timeout: Duration,
    policy: LaunchPolicy,
}

impl<P: ProcessTable> ProcessManager<P> {
    /// `state_dir` holds PID files and worker logs.
    pub fn new(table: P, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            table,
            state_dir: state_dir.into(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            policy: LaunchPolicy::default(),
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_policy(mut self, policy: LaunchPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[cfg(test)]
    pub fn table(&self) -> &P {
        &self.table
    }

    /// Stop every running worker of `unit` and launch a new one.
    ///
    /// Never fails: discovery and termination problems are logged and do not
    /// prevent the launch, a failed launch is logged and reported as
    /// `launched: None`.
    pub fn restart_unit(&mut self, unit: &ManagedUnit) -> RestartReport {
        let terminated = self.stop_unit(unit);

        let launched = match self.launch(unit) {
            Ok(pid) => Some(pid),
            Err(e) => {
                error!("process"; "unable to start {}: {:#}", unit.name, e);
                None
            }
        };

        RestartReport { terminated, launched }
    }

    /// Terminate all workers of `unit`. Returns how many were signalled.
    pub fn stop_unit(&mut self, unit: &ManagedUnit) -> usize {
        let pid_file = token::pid_file(&self.state_dir, &unit.name);
        let recorded = token::read_pid_file(&pid_file).map(|(pid, _)| pid);
        let workers = self.find_workers(unit, recorded);

        let mut terminated = 0;
        for worker in &workers {
            log!("process"; "found {} worker {} ({}) with pid {}, stopping it",
                unit.name, describe_cmd(worker), describe_exe(worker), worker.pid);

            if let Err(e) = self.table.terminate(worker.pid) {
                error!("process"; "unable to stop pid {} of {}: {:#}", worker.pid, unit.name, e);
                continue;
            }
            terminated += 1;

            if !self.table.wait_for_exit(worker.pid, self.stop_timeout) {
                warn!("process"; "pid {} of {} did not exit within {}s, moving on",
                    worker.pid, unit.name, self.stop_timeout.as_secs());
            }
        }

        token::remove_pid_file(&pid_file);
        terminated
    }

    /// Running workers of `unit`: the recorded pid first, then every other
    /// process carrying the unit's launch token.
    ///
    /// The recorded pid is trusted when its environment cannot be read (empty),
    /// but not when it carries someone else's token.
    fn find_workers(&mut self, unit: &ManagedUnit, recorded: Option<u32>) -> Vec<ProcessInfo> {
        let procs = self.table.list();
        let mut workers = Vec::new();

        if let Some(pid) = recorded {
            match procs.iter().find(|p| p.pid == pid) {
                Some(p) if p.env.is_empty() || token::belongs_to(&p.env, &unit.name) => {
                    workers.push(p.clone());
                }
                Some(_) => debug!("process"; "recorded pid {} of {} was reused, ignoring it", pid, unit.name),
                None => debug!("process"; "recorded pid {} of {} is gone", pid, unit.name),
            }
        }

        workers.extend(
            procs
                .into_iter()
                .filter(|p| Some(p.pid) != recorded && token::belongs_to(&p.env, &unit.name)),
        );
        workers
    }

    /// Spawn one worker for `unit` and record it.
    fn launch(&mut self, unit: &ManagedUnit) -> Result<u32> {
        let token = LaunchToken::new(&unit.name);
        let (key, value) = token.env();
        let spec = LaunchSpec {
            command: &unit.launch,
            cwd: &unit.live_dir,
            env: vec![(key.to_string(), value)],
            log: Some(self.worker_log(&unit.name)),
        };

        log!("process"; "start {}: `{}` in {}", unit.name, unit.launch, unit.live_dir.display());
        let pid = self.table.spawn_detached(&spec)?;

        let pid_file = token::pid_file(&self.state_dir, &unit.name);
        if let Err(e) = token::write_pid_file(&pid_file, pid, &token) {
            warn!("process"; "{:#}", e);
        }

        if let LaunchPolicy::GracePeriod(grace) = self.policy {
            thread::sleep(grace);
            if !self.table.is_alive(pid) {
                token::remove_pid_file(&pid_file);
                bail!("pid {} exited within {}ms of launch", pid, grace.as_millis());
            }
            debug!("process"; "{} still running after {}ms", unit.name, grace.as_millis());
        }

        log!("process"; "started {} with pid {}", unit.name, pid);
        Ok(pid)
    }

    fn worker_log(&self, unit: &str) -> PathBuf {
        self.state_dir.join(format!("{unit}.log"))
    }

    #[cfg(test)]
    pub fn state_dir(&self) -> &std::path::Path {
        &self.state_dir
    }
}

fn describe_cmd(p: &ProcessInfo) -> String {
    if p.cmd.is_empty() {
        "<unknown>".to_string()
    } else {
        p.cmd.join(" ")
    }
}

fn describe_exe(p: &ProcessInfo) -> String {
    p.exe
        .as_ref()
        .map_or_else(|| "<unknown>".to_string(), |e| e.display().to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::test_unit;
    use rustc_hash::FxHashSet;
    use tempfile::TempDir;

    /// In-memory process table: spawned processes live until terminated.
    #[derive(Default)]
    pub(crate) struct FakeTable {
        pub procs: Vec<ProcessInfo>,
        pub spawned: Vec<(String, PathBuf)>,
        pub terminated: Vec<u32>,
        /// Pids ignoring SIGTERM.
        pub stubborn: FxHashSet<u32>,
        /// Pids whose termination fails.
        pub protected: FxHashSet<u32>,
        /// Number of upcoming spawns that fail.
        pub fail_spawns: usize,
        /// Spawned processes die immediately.
        pub crash_on_start: bool,
        pub next_pid: u32,
    }

    impl FakeTable {
        pub fn with_process(mut self, pid: u32, env: &[&str]) -> Self {
            self.procs.push(ProcessInfo {
                pid,
                exe: Some(PathBuf::from("/usr/bin/python3")),
                cmd: vec!["python3".into(), "worker.py".into()],
                env: env.iter().map(|s| s.to_string()).collect(),
            });
            self
        }
    }

    impl ProcessTable for FakeTable {
        fn list(&mut self) -> Vec<ProcessInfo> {
            self.procs.clone()
        }

        fn terminate(&mut self, pid: u32) -> Result<()> {
            if self.protected.contains(&pid) {
                bail!("operation not permitted");
            }
            self.terminated.push(pid);
            if !self.stubborn.contains(&pid) {
                self.procs.retain(|p| p.pid != pid);
            }
            Ok(())
        }

        fn wait_for_exit(&mut self, pid: u32, _timeout: Duration) -> bool {
            !self.procs.iter().any(|p| p.pid == pid)
        }

        fn spawn_detached(&mut self, spec: &LaunchSpec<'_>) -> Result<u32> {
            if self.fail_spawns > 0 {
                self.fail_spawns -= 1;
                bail!("No such file or directory");
            }
            self.next_pid += 1;
            let pid = 10_000 + self.next_pid;
            self.spawned
                .push((spec.command.to_string(), spec.cwd.to_path_buf()));
            if !self.crash_on_start {
                self.procs.push(ProcessInfo {
                    pid,
                    exe: None,
                    cmd: vec!["sh".into(), "-c".into(), spec.command.to_string()],
                    env: spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect(),
                });
            }
            Ok(pid)
        }

        fn is_alive(&mut self, pid: u32) -> bool {
            self.procs.iter().any(|p| p.pid == pid)
        }
    }

    fn manager(dir: &TempDir, table: FakeTable) -> ProcessManager<FakeTable> {
        ProcessManager::new(table, dir.path().join("state"))
    }

    #[test]
    fn test_restart_without_running_worker_launches_once() {
        let dir = TempDir::new().unwrap();
        let unit = test_unit("worker", dir.path());
        let mut pm = manager(&dir, FakeTable::default());

        let report = pm.restart_unit(&unit);
        assert_eq!(report.terminated, 0);
        assert!(report.launched.is_some());
        assert_eq!(pm.table.spawned.len(), 1);
        assert!(pm.table.terminated.is_empty());
        assert_eq!(pm.table.spawned[0], ("python3 worker.py".to_string(), unit.live_dir.clone()));
    }

    #[test]
    fn test_restart_replaces_previous_launch() {
        let dir = TempDir::new().unwrap();
        let unit = test_unit("worker", dir.path());
        let mut pm = manager(&dir, FakeTable::default());

        let first = pm.restart_unit(&unit).launched.unwrap();
        let second = pm.restart_unit(&unit);

        assert_eq!(second.terminated, 1);
        assert_eq!(pm.table.terminated, vec![first]);
        let alive: Vec<_> = pm.table.procs.iter().map(|p| p.pid).collect();
        assert_eq!(alive, vec![second.launched.unwrap()]);
    }

    #[test]
    fn test_restart_kills_all_matching_workers() {
        let dir = TempDir::new().unwrap();
        let unit = test_unit("worker", dir.path());
        let table = FakeTable::default()
            .with_process(101, &["WARDEN_UNIT=worker:a"])
            .with_process(102, &["WARDEN_UNIT=worker:b"])
            .with_process(103, &["WARDEN_UNIT=other:c"])
            .with_process(104, &["PATH=/bin"]);
        let mut pm = manager(&dir, table);

        let report = pm.restart_unit(&unit);
        assert_eq!(report.terminated, 2);
        assert_eq!(pm.table.terminated, vec![101, 102]);
        assert!(pm.table.procs.iter().any(|p| p.pid == 103));
        assert!(pm.table.procs.iter().any(|p| p.pid == 104));
    }

    #[test]
    fn test_name_substring_is_not_a_match() {
        let dir = TempDir::new().unwrap();
        let unit = test_unit("collector", dir.path());
        // Command line mentions the unit name but carries no token
        let mut table = FakeTable::default().with_process(200, &[]);
        table.procs[0].cmd = vec!["python3".into(), "collector.py".into()];
        let mut pm = manager(&dir, table);

        assert_eq!(pm.restart_unit(&unit).terminated, 0);
        assert!(pm.table.terminated.is_empty());
    }

    /// Pretend `pid` was the last launch of `worker`.
    fn record(pm: &ProcessManager<FakeTable>, pid: u32) {
        let path = token::pid_file(pm.state_dir(), "worker");
        token::write_pid_file(&path, pid, &LaunchToken::new("worker")).unwrap();
    }

    #[test]
    fn test_recorded_pid_with_unreadable_env_is_stopped() {
        let dir = TempDir::new().unwrap();
        let unit = test_unit("worker", dir.path());
        let mut pm = manager(&dir, FakeTable::default().with_process(500, &[]));
        record(&pm, 500);

        let report = pm.restart_unit(&unit);
        assert_eq!(report.terminated, 1);
        assert_eq!(pm.table.terminated, vec![500]);
        let alive: Vec<_> = pm.table.procs.iter().map(|p| p.pid).collect();
        assert_eq!(alive, vec![report.launched.unwrap()]);
    }

    #[test]
    fn test_recorded_pid_is_not_stopped_twice() {
        let dir = TempDir::new().unwrap();
        let unit = test_unit("worker", dir.path());
        let table = FakeTable::default()
            .with_process(501, &["WARDEN_UNIT=worker:a"])
            .with_process(502, &["WARDEN_UNIT=worker:b"]);
        let mut pm = manager(&dir, table);
        record(&pm, 502);

        assert_eq!(pm.restart_unit(&unit).terminated, 2);
        assert_eq!(pm.table.terminated, vec![502, 501]);
    }

    #[test]
    fn test_reused_recorded_pid_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let unit = test_unit("worker", dir.path());
        let mut pm = manager(&dir, FakeTable::default().with_process(503, &["WARDEN_UNIT=other:x"]));
        record(&pm, 503);

        assert_eq!(pm.restart_unit(&unit).terminated, 0);
        assert!(pm.table.terminated.is_empty());
    }

    #[test]
    fn test_stale_pid_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let unit = test_unit("worker", dir.path());
        let mut pm = manager(&dir, FakeTable::default());
        record(&pm, 504);

        let report = pm.restart_unit(&unit);
        assert_eq!(report.terminated, 0);
        let (pid, _) = token::read_pid_file(&token::pid_file(pm.state_dir(), "worker")).unwrap();
        assert_eq!(Some(pid), report.launched);
    }

    #[test]
    fn test_stubborn_worker_does_not_block_launch() {
        let dir = TempDir::new().unwrap();
        let unit = test_unit("worker", dir.path());
        let mut table = FakeTable::default().with_process(300, &["WARDEN_UNIT=worker:x"]);
        table.stubborn.insert(300);
        let mut pm = manager(&dir, table);

        let report = pm.restart_unit(&unit);
        assert_eq!(report.terminated, 1);
        assert!(report.launched.is_some());
    }

    #[test]
    fn test_termination_failure_does_not_block_launch() {
        let dir = TempDir::new().unwrap();
        let unit = test_unit("worker", dir.path());
        let mut table = FakeTable::default().with_process(400, &["WARDEN_UNIT=worker:x"]);
        table.protected.insert(400);
        let mut pm = manager(&dir, table);

        let report = pm.restart_unit(&unit);
        assert_eq!(report.terminated, 0);
        assert!(report.launched.is_some());
    }

    #[test]
    fn test_launch_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let unit = test_unit("worker", dir.path());
        let mut pm = manager(
            &dir,
            FakeTable {
                fail_spawns: 1,
                ..Default::default()
            },
        );

        let report = pm.restart_unit(&unit);
        assert_eq!(report.launched, None);
        assert!(!token::pid_file(pm.state_dir(), "worker").exists());
    }

    #[test]
    fn test_launch_records_pid_file() {
        let dir = TempDir::new().unwrap();
        let unit = test_unit("worker", dir.path());
        let mut pm = manager(&dir, FakeTable::default());

        let pid = pm.restart_unit(&unit).launched.unwrap();
        let (recorded, token) =
            token::read_pid_file(&token::pid_file(pm.state_dir(), "worker")).unwrap();
        assert_eq!(recorded, pid);
        assert_eq!(token.unit(), "worker");
    }

    #[test]
    fn test_grace_period_detects_crash() {
        let dir = TempDir::new().unwrap();
        let unit = test_unit("worker", dir.path());
        let table = FakeTable {
            crash_on_start: true,
            ..Default::default()
        };
        let mut pm = manager(&dir, table)
            .with_policy(LaunchPolicy::GracePeriod(Duration::from_millis(1)));

        assert_eq!(pm.restart_unit(&unit).launched, None);
        assert_eq!(pm.table.spawned.len(), 1);
    }

    #[test]
    fn test_fire_and_forget_ignores_crash() {
        let dir = TempDir::new().unwrap();
        let unit = test_unit("worker", dir.path());
        let table = FakeTable {
            crash_on_start: true,
            ..Default::default()
        };
        let mut pm = manager(&dir, table);

        assert!(pm.restart_unit(&unit).launched.is_some());
    }

    #[test]
    fn test_launch_policy_from_grace() {
        assert_eq!(LaunchPolicy::from_grace(Duration::ZERO), LaunchPolicy::FireAndForget);
        assert_eq!(
            LaunchPolicy::from_grace(Duration::from_secs(2)),
            LaunchPolicy::GracePeriod(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_restart_real_process() {
        let dir = TempDir::new().unwrap();
        let mut unit = test_unit("sleeper", dir.path());
        std::fs::create_dir_all(&unit.live_dir).unwrap();
        unit.launch = "exec sleep 30".to_string();

        let mut pm = ProcessManager::new(SystemProcessTable::new(), dir.path().join("state"))
            .with_stop_timeout(Duration::from_secs(5));

        let first = pm.restart_unit(&unit).launched.unwrap();
        thread::sleep(Duration::from_millis(200));
        let second = pm.restart_unit(&unit);
        assert_eq!(second.terminated, 1);

        let second_pid = second.launched.unwrap();
        assert_ne!(first, second_pid);
        assert!(!pm.table.is_alive(first));
        assert!(pm.table.is_alive(second_pid));

        thread::sleep(Duration::from_millis(200));
        assert_eq!(pm.stop_unit(&unit), 1);
        assert!(!pm.table.is_alive(second_pid));
    }
}
