//! Deployment materialization: mirror a synced working copy into the unit's
//! live directory.
//!
//! Additive and overwrite-only. A file is copied when the target is missing
//! or its content differs; nothing on the target side is ever deleted, and
//! version-control metadata directories are never walked.

use crate::core::ManagedUnit;
use crate::freshness::{compute_file_hash, files_identical};
use crate::{debug, log, warn};
use anyhow::{Context, Result};
use jwalk::WalkDir;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Directory names excluded from deployment by default.
pub const DEFAULT_EXCLUDE: &[&str] = &[".git"];

/// Copies new or changed files from working copies to live directories.
#[derive(Debug, Clone)]
pub struct Materializer {
    exclude: Arc<[String]>,
}

impl Default for Materializer {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDE.iter().map(|s| s.to_string()))
    }
}

impl Materializer {
    /// Create a materializer skipping directories with any of these names.
    pub fn new<I, S>(exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exclude: exclude.into_iter().map(Into::into).collect(),
        }
    }

    /// Copy every new or changed file of `unit`'s working copy into its live
    /// directory. Returns the number of files copied; `0` means nothing to
    /// redeploy.
    pub fn materialize(&self, unit: &ManagedUnit) -> usize {
        let source = &unit.working_copy;
        if !source.is_dir() {
            warn!("deploy"; "working copy {} of {} does not exist", source.display(), unit.name);
            return 0;
        }

        let mut checked = 0;
        let mut updated = 0;

        for file in self.files(source) {
            checked += 1;
            let Ok(rel) = file.strip_prefix(source) else {
                continue;
            };
            let target = unit.live_dir.join(rel);
            debug!("deploy"; "check {} against {}", file.display(), target.display());

            if target.exists() && files_identical(&file, &target) {
                continue;
            }

            match copy_file(&file, &target) {
                Ok(()) => {
                    log!("deploy"; "update file {} to {}", rel.display(), target.display());
                    debug!("deploy"; "{} content {}", rel.display(),
                        compute_file_hash(&target).map_or_else(|| "unreadable".to_string(), |h| h.to_string()));
                    updated += 1;
                }
                Err(e) => warn!("deploy"; "skipping {}: {:#}", rel.display(), e),
            }
        }

        log!("deploy"; "{}: checked {} files, updated {} files", unit.name, checked, updated);
        updated
    }

    /// Regular files under `root`, excluded directories pruned, sorted.
    fn files(&self, root: &Path) -> Vec<PathBuf> {
        let exclude = Arc::clone(&self.exclude);

        WalkDir::new(root)
            .skip_hidden(false)
            .sort(true)
            .process_read_dir(move |_, _, _, children| {
                children.retain(|entry| match entry {
                    Ok(e) => {
                        !(e.file_type().is_dir()
                            && exclude.iter().any(|name| e.file_name().to_str() == Some(name.as_str())))
                    }
                    Err(_) => true,
                });
            })
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(e) => Some(e),
                Err(err) => {
                    warn!("deploy"; "cannot read entry: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path())
            .collect()
    }
}

/// Copy `source` over `target`, creating parent directories.
///
/// `fs::copy` carries the permission bits along, so executables stay executable.
fn copy_file(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::copy(source, target)
        .with_context(|| format!("Failed to copy {} to {}", source.display(), target.display()))?;
    Ok(())
}
