//! Test fixtures: local bare repositories driven through the `git` executable.

use crate::utils::exec::Cmd;
use std::{
    fs,
    path::{Path, PathBuf},
    process::Output,
    sync::OnceLock,
};

/// Whether a usable `git` executable is installed.
///
/// Git-backed tests return early without it.
pub fn git_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| Cmd::new("git").arg("--version").run().is_ok())
}

fn git(dir: &Path, args: &[&str]) -> Output {
    Cmd::new("git")
        .args([
            "-c",
            "user.name=warden-test",
            "-c",
            "user.email=warden@test.invalid",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .cwd(dir)
        .run()
        .unwrap()
}

/// A bare repository on disk plus a scratch clone used to author commits.
pub struct Upstream {
    url: String,
    scratch: PathBuf,
}

impl Upstream {
    /// Create `<root>/upstream.git` (branch `main`) and its scratch checkout.
    pub fn new(root: &Path) -> Self {
        let bare = root.join("upstream.git");
        let scratch = root.join("scratch");
        fs::create_dir_all(&bare).unwrap();
        fs::create_dir_all(&scratch).unwrap();

        git(&bare, &["init", "--quiet", "--bare"]);
        git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&scratch, &["init", "--quiet"]);
        git(&scratch, &["checkout", "--quiet", "-b", "main"]);

        let url = bare.display().to_string();
        Self { url, scratch }
    }

    /// Remote URI to hand to clone/pull.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Write `rel` with `content`, commit and push.
    pub fn commit_file(&self, rel: &str, content: &str) {
        let path = self.scratch.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        git(&self.scratch, &["add", "-A"]);
        git(&self.scratch, &["commit", "--quiet", "-m", &format!("update {rel}")]);
        self.push(false);
    }

    /// Commit without any content change and push.
    pub fn commit_empty(&self) {
        git(&self.scratch, &["commit", "--quiet", "--allow-empty", "-m", "empty"]);
        self.push(false);
    }

    /// Drop the last commit, commit `rel` instead and force-push.
    pub fn rewind_and_commit(&self, rel: &str, content: &str) {
        git(&self.scratch, &["reset", "--quiet", "--hard", "HEAD~1"]);
        fs::write(self.scratch.join(rel), content).unwrap();
        git(&self.scratch, &["add", "-A"]);
        git(&self.scratch, &["commit", "--quiet", "-m", &format!("rewrite {rel}")]);
        self.push(true);
    }

    /// Content of `rel` as committed in the scratch checkout.
    pub fn source(&self, rel: &str) -> PathBuf {
        self.scratch.join(rel)
    }

    fn push(&self, force: bool) {
        let url = self.url.clone();
        let mut args = vec!["push", "--quiet"];
        if force {
            args.push("--force");
        }
        args.extend([url.as_str(), "HEAD:refs/heads/main"]);
        git(&self.scratch, &args);
    }
}
