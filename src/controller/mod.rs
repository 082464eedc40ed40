//! The supervisor's control loop.
//!
//! ```text
//! Startup ──→ restart every unit (configured order)
//!    │
//!    ▼
//! Poll ──→ for each unit: sync ─→ materialize (if changed) ─→ restart (gate)
//!  ▲   │
//!  └───┘ ticker.wait(poll interval)
//! ```
//!
//! There is no normal exit. [`Controller::run`] returns only when the ticker
//! reports shutdown, and then with an error.

mod ticker;

pub use ticker::{SleepTicker, Ticker};

use crate::core::ManagedUnit;
use crate::deploy::Materializer;
use crate::process::{ProcessManager, ProcessTable, RestartReport};
use crate::sync::{Synchronizer, Vcs};
use crate::{debug, log, warn};
use anyhow::Result;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::time::Duration;

/// When a synced unit gets restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartGate {
    /// Only if at least one file was deployed.
    #[default]
    Materialized,
    /// Whenever the repository moved, even without deployable changes.
    Changed,
}

impl RestartGate {
    fn allows(self, changed: bool, materialized: usize) -> bool {
        match self {
            Self::Materialized => materialized > 0,
            Self::Changed => changed,
        }
    }
}

/// Abnormal end of the control loop.
#[derive(Debug, thiserror::Error)]
#[error("supervisor stopped after {cycles} poll cycle(s)")]
pub struct Shutdown {
    pub cycles: u64,
}

/// What one poll cycle did to one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub name: String,
    pub changed: bool,
    pub materialized: usize,
    /// `None` when the unit was left running.
    pub restart: Option<RestartReport>,
}

pub struct Controller<V: Vcs, P: ProcessTable> {
    units: Vec<ManagedUnit>,
    synchronizer: Synchronizer<V>,
    materializer: Materializer,
    processes: ProcessManager<P>,
    gate: RestartGate,
    poll_interval: Duration,
    /// Units whose last launch failed.
    down: FxHashSet<String>,
    cycles: u64,
}

impl<V: Vcs, P: ProcessTable> Controller<V, P> {
    pub fn new(
        units: Vec<ManagedUnit>,
        synchronizer: Synchronizer<V>,
        materializer: Materializer,
        processes: ProcessManager<P>,
    ) -> Self {
        Self {
            units,
            synchronizer,
            materializer,
            processes,
            gate: RestartGate::default(),
            poll_interval: Duration::from_secs(900),
            down: FxHashSet::default(),
            cycles: 0,
        }
    }

    pub fn with_gate(mut self, gate: RestartGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Startup, then poll cycles until `ticker` stops the loop.
    ///
    /// Never returns `Ok`.
    pub fn run(&mut self, ticker: &mut impl Ticker) -> Result<()> {
        self.startup();
        loop {
            self.poll_once();
            if !ticker.wait(self.poll_interval) {
                log!("warden"; "stopping after {} poll cycle(s)", self.cycles);
                return Err(Shutdown { cycles: self.cycles }.into());
            }
        }
    }

    /// Restart every unit so each runs exactly one instance of the deployed code.
    pub fn startup(&mut self) {
        log!("warden"; "starting {} unit(s)", self.units.len());
        for i in 0..self.units.len() {
            self.restart(i);
        }
    }

    /// One pass over all units in configured order.
    pub fn poll_once(&mut self) -> Vec<UnitOutcome> {
        self.cycles += 1;
        debug!("warden"; "poll cycle {}", self.cycles);

        (0..self.units.len()).map(|i| self.poll_unit(i)).collect()
    }

    fn poll_unit(&mut self, index: usize) -> UnitOutcome {
        let unit = &self.units[index];
        let changed = self.synchronizer.sync_unit(unit);
        let materialized = if changed {
            self.materializer.materialize(unit)
        } else {
            0
        };

        let retry = self.down.contains(&unit.name);
        let restart = if self.gate.allows(changed, materialized) {
            log!("warden"; "restarting {} ({} file(s) deployed)", unit.name, materialized);
            Some(self.restart(index))
        } else if retry {
            log!("warden"; "retrying launch of {}", unit.name);
            Some(self.restart(index))
        } else {
            if changed {
                debug!("warden"; "{} changed without deployable files, not restarting", unit.name);
            }
            None
        };

        UnitOutcome {
            name: self.units[index].name.clone(),
            changed,
            materialized,
            restart,
        }
    }

    fn restart(&mut self, index: usize) -> RestartReport {
        let unit = &self.units[index];
        let report = self.processes.restart_unit(unit);
        if let Some(pid) = report.launched {
            debug!("warden"; "{}: stopped {} worker(s), now pid {}", unit.name, report.terminated, pid);
            self.down.remove(&unit.name);
        } else {
            warn!("warden"; "{} is down, next attempt in {}s", unit.name, self.poll_interval.as_secs());
            self.down.insert(unit.name.clone());
        }
        report
    }

    /// Whether `unit`'s last launch failed.
    #[cfg(test)]
    pub fn is_down(&self, unit: &str) -> bool {
        self.down.contains(unit)
    }
}
