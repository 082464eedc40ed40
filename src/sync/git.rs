//! `git`-backed version control: the executable for network operations,
//! gix for opening repositories and reading `HEAD`.

use super::{PullOutcome, Vcs};
use crate::exec;
use crate::utils::exec::FilterRule;
use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Progress chatter git prints on stderr even with `--quiet`.
static GIT_FILTER: FilterRule = FilterRule::new(&["From ", "hint:", "* branch", "+ ", "remote:"]);

/// Version control through the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    git: PathBuf,
}

impl GitCli {
    pub fn new(git: impl Into<PathBuf>) -> Self {
        Self { git: git.into() }
    }

    /// Resolve a revision to a full object id with `git rev-parse`.
    fn rev_parse(&self, repo: &Path, rev: &str) -> Result<String> {
        let output = exec!(filter=&GIT_FILTER; repo; &self.git; "rev-parse", "--verify", "--quiet", rev)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Whether `ancestor` is reachable from `descendant`.
    fn is_ancestor(&self, repo: &Path, ancestor: &str, descendant: &str) -> bool {
        exec!(filter=&GIT_FILTER; repo; &self.git; "merge-base", "--is-ancestor", ancestor, descendant)
            .is_ok()
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl Vcs for GitCli {
    fn clone_repo(&self, remote: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        exec!(filter=&GIT_FILTER; &self.git; "clone", "--quiet", remote, dest)?;
        Ok(())
    }

    fn pull(&self, repo: &Path, remote: &str) -> Result<PullOutcome> {
        let before = head_id(repo)?;

        exec!(filter=&GIT_FILTER; repo; &self.git; "fetch", "--quiet", remote)?;
        let fetched = self.rev_parse(repo, "FETCH_HEAD")?;

        if before.as_deref() == Some(fetched.as_str()) {
            return Ok(PullOutcome::UpToDate);
        }

        match &before {
            // Upstream rewrote history: follow it, the working copy is a mirror
            Some(old) if !self.is_ancestor(repo, old, &fetched) => {
                crate::warn!("sync"; "history of {} was rewritten upstream, resetting to {}", repo.display(), short(&fetched));
                exec!(filter=&GIT_FILTER; repo; &self.git; "reset", "--hard", "--quiet", &fetched)?;
            }
            _ => {
                exec!(filter=&GIT_FILTER; repo; &self.git; "merge", "--ff-only", "--quiet", &fetched)?;
            }
        }

        let after = head_id(repo)?;
        if after == before {
            Ok(PullOutcome::UpToDate)
        } else {
            Ok(PullOutcome::Updated { from: before, to: after })
        }
    }

    fn is_repo(&self, path: &Path) -> bool {
        open_repo(path).is_ok()
    }
}

/// Open an existing git repository (no upward discovery).
pub fn open_repo(root: &Path) -> Result<gix::Repository> {
    gix::open(root).with_context(|| format!("Not a git repository: {}", root.display()))
}

/// Current `HEAD` commit id, `None` for a repository without commits.
pub fn head_id(root: &Path) -> Result<Option<String>> {
    let repo = open_repo(root)?;
    Ok(repo.head_id().ok().map(|id| id.detach().to_string()))
}

/// Abbreviated object id for log lines.
pub fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
