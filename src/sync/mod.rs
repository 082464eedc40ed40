//! Repository synchronization: keep each unit's working copy at the latest
//! remote revision and report whether it moved.
//!
//! ```text
//! working copy missing        → clone          → changed
//! working copy not a repo     → remove + clone → changed
//! working copy present        → pull           → changed unless up to date
//! any failure                 → log            → unchanged (retried next poll)
//! ```

mod git;

pub use git::GitCli;

use crate::core::{ManagedUnit, SyncResult};
use crate::{debug, error, log, warn};
use anyhow::{Context, Result};
use std::{fs, os::unix::fs::PermissionsExt, path::Path};

/// Result of a pull, classified by whether `HEAD` moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Nothing new upstream.
    UpToDate,
    /// `HEAD` moved (fast-forward, new commits or forced update).
    Updated {
        from: Option<String>,
        to: Option<String>,
    },
}

/// Version-control primitive used by the synchronizer.
pub trait Vcs {
    /// Clone `remote` into `dest` (which must not exist).
    fn clone_repo(&self, remote: &str, dest: &Path) -> Result<()>;

    /// Fetch from `remote` and bring the working copy at `repo` up to date.
    fn pull(&self, repo: &Path, remote: &str) -> Result<PullOutcome>;

    /// Whether `path` holds a usable repository.
    fn is_repo(&self, path: &Path) -> bool;
}

/// Owns the clone/pull policy for managed units.
pub struct Synchronizer<V: Vcs> {
    vcs: V,
}

impl<V: Vcs> Synchronizer<V> {
    pub fn new(vcs: V) -> Self {
        Self { vcs }
    }

    /// Synchronize one unit's working copy.
    ///
    /// Returns `true` when the content at the working copy changed during this
    /// call. Failures are logged and reported as "unchanged".
    pub fn sync_unit(&self, unit: &ManagedUnit) -> bool {
        self.sync(unit).changed
    }

    /// Same as [`Self::sync_unit`], returning the transient [`SyncResult`].
    pub fn sync<'a>(&self, unit: &'a ManagedUnit) -> SyncResult<'a> {
        let changed = match self.try_sync(unit) {
            Ok(changed) => changed,
            Err(e) => {
                error!("sync"; "unable to update {}: {:#}", unit.name, e);
                false
            }
        };
        SyncResult { unit, changed }
    }

    fn try_sync(&self, unit: &ManagedUnit) -> Result<bool> {
        let path = &unit.working_copy;

        if path.exists() && !self.vcs.is_repo(path) {
            warn!("sync"; "{} is not a usable repository, recloning", path.display());
            remove_tree(path)?;
        }

        if !path.exists() {
            debug!("sync"; "{} missing, cloning {}", path.display(), unit.remote);
            self.vcs
                .clone_repo(&unit.remote, path)
                .with_context(|| format!("clone of {} failed", unit.remote))?;
            log!("sync"; "cloned {} into {}", unit.remote, path.display());
            return Ok(true);
        }

        debug!("sync"; "pulling {} from {}", unit.name, unit.remote);
        match self.vcs.pull(path, &unit.remote)? {
            PullOutcome::UpToDate => {
                debug!("sync"; "{} is up to date", unit.name);
                Ok(false)
            }
            PullOutcome::Updated { from, to } => {
                let rev = |id: &Option<String>| id.as_deref().map_or("none", git::short).to_string();
                log!("sync"; "changes found for {} ({} -> {})", unit.name, rev(&from), rev(&to));
                Ok(true)
            }
        }
    }
}

/// Remove whatever occupies a working copy path.
///
/// Directory trees get owner-only `rwx` on every entry first: git marks pack
/// files read-only, and a read-only directory blocks deleting its entries.
fn remove_tree(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)
        .with_context(|| format!("Failed to inspect {}", path.display()))?;
    if !meta.is_dir() {
        return fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()));
    }

    for entry in jwalk::WalkDir::new(path).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_symlink() {
            fs::set_permissions(entry.path(), fs::Permissions::from_mode(0o700)).ok();
        }
    }
    fs::remove_dir_all(path).with_context(|| format!("Failed to remove {}", path.display()))
}
