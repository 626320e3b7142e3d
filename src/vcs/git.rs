// src/vcs/git.rs

//! [`VersionControl`] over the `git` command line.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info, warn};

use super::VersionControl;
use crate::config::GitSection;

const COMMITTER_NAME: &str = "savesync";
const COMMITTER_EMAIL: &str = "savesync@local";

/// Replace every occurrence of `token` in `text` with `***`.
pub fn redact(text: &str, token: Option<&str>) -> String {
    match token {
        Some(token) if !token.is_empty() => text.replace(token, "***"),
        _ => text.to_string(),
    }
}

/// Embed `username:token@` into an HTTPS remote. Other schemes and empty
/// tokens pass through unchanged.
pub fn embed_credentials(url: &str, username: Option<&str>, token: Option<&str>) -> String {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return url.to_string();
    };
    let Some(rest) = url.strip_prefix("https://") else {
        return url.to_string();
    };
    match username.filter(|u| !u.is_empty()) {
        Some(user) => format!("https://{user}:{token}@{rest}"),
        None => {
            warn!("token configured without username; authentication may fail");
            format!("https://{token}@{rest}")
        }
    }
}

#[derive(Debug)]
struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Git working tree used as the sync mirror.
///
/// Every public operation takes an internal lock, so calls coming from the
/// pull and push workers never run git concurrently in the same tree.
#[derive(Debug)]
pub struct GitClient {
    repo_dir: PathBuf,
    remote: String,
    branch: String,
    token: Option<String>,
    username: Option<String>,
    lock: Mutex<()>,
}

impl GitClient {
    pub fn new(
        repo_dir: impl Into<PathBuf>,
        remote: impl Into<String>,
        branch: impl Into<String>,
        token: Option<String>,
        username: Option<String>,
    ) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            remote: remote.into(),
            branch: branch.into(),
            token: token.filter(|t| !t.is_empty()),
            username: username.filter(|u| !u.is_empty()),
            lock: Mutex::new(()),
        }
    }

    pub fn from_config(git: &GitSection) -> Self {
        Self::new(
            git.repository_dir.clone(),
            git.remote.clone(),
            git.branch.clone(),
            Some(git.token.clone()),
            Some(git.username.clone()),
        )
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn redact(&self, text: &str) -> String {
        redact(text, self.token.as_deref())
    }

    fn remote_url(&self) -> String {
        embed_credentials(&self.remote, self.username.as_deref(), self.token.as_deref())
    }

    fn git(&self, args: &[&str]) -> GitOutput {
        let cwd = self.repo_dir.as_path();
        let shown = self.redact(&args.join(" "));
        let result = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GCM_INTERACTIVE", "Never")
            .env("GIT_ASKPASS", "echo")
            .output();

        match result {
            Ok(output) => {
                let out = GitOutput {
                    success: output.status.success(),
                    stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                };
                debug!(
                    cwd = ?cwd,
                    cmd = %shown,
                    code = output.status.code().unwrap_or(-1),
                    "git"
                );
                out
            }
            Err(err) => {
                warn!(cwd = ?cwd, cmd = %shown, error = %err, "failed to spawn git");
                GitOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: err.to_string(),
                }
            }
        }
    }

    fn fail(&self, step: &str, out: &GitOutput) {
        warn!(
            repo = ?self.repo_dir,
            step,
            error = %self.redact(&out.stderr),
            "git step failed"
        );
    }

    fn is_dir_empty(path: &Path) -> bool {
        match fs::read_dir(path) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => !path.exists(),
        }
    }

    fn set_identity(&self) {
        self.git(&["config", "user.name", COMMITTER_NAME]);
        self.git(&["config", "user.email", COMMITTER_EMAIL]);
        self.git(&["config", "credential.helper", ""]);
    }

    fn has_changes(&self) -> bool {
        let out = self.git(&["status", "--porcelain"]);
        out.success && !out.stdout.is_empty()
    }
}

impl VersionControl for GitClient {
    fn has_remote(&self) -> bool {
        !self.remote.is_empty()
    }

    fn ensure_ready(&self) -> bool {
        let _guard = self.guard();

        if let Err(err) = fs::create_dir_all(&self.repo_dir) {
            warn!(repo = ?self.repo_dir, error = %err, "cannot create mirror directory");
            return false;
        }

        if !self.repo_dir.join(".git").exists() {
            if self.has_remote() {
                if !Self::is_dir_empty(&self.repo_dir) {
                    warn!(
                        repo = ?self.repo_dir,
                        "mirror directory is not empty and not a git repository; refusing to clone"
                    );
                    return false;
                }
                let url = self.remote_url();
                let out = self.git(&["clone", "--quiet", &url, "."]);
                if !out.success {
                    self.fail("clone", &out);
                    return false;
                }
                info!(repo = ?self.repo_dir, branch = %self.branch, "mirror cloned");
            } else {
                let out = self.git(&["init", "--quiet"]);
                if !out.success {
                    self.fail("init", &out);
                    return false;
                }
                info!(repo = ?self.repo_dir, "local mirror initialised");
            }
        }

        if self.has_remote() {
            let url = self.remote_url();
            // set-url keeps the origin/* tracking refs a fresh clone brought in.
            let out = if self.git(&["remote", "get-url", "origin"]).success {
                self.git(&["remote", "set-url", "origin", &url])
            } else {
                self.git(&["remote", "add", "origin", &url])
            };
            if !out.success {
                self.fail("remote setup", &out);
            }
        }

        let tracking = format!("origin/{}", self.branch);
        let out = if self.git(&["rev-parse", "--verify", "--quiet", &self.branch]).success {
            self.git(&["checkout", &self.branch])
        } else if self.has_remote()
            && self.git(&["rev-parse", "--verify", "--quiet", &tracking]).success
        {
            self.git(&["checkout", "-B", &self.branch, &tracking])
        } else {
            self.git(&["checkout", "-b", &self.branch])
        };
        if !out.success {
            self.fail("checkout", &out);
        }

        self.set_identity();
        info!(repo = ?self.repo_dir, branch = %self.branch, "mirror ready");
        true
    }

    fn pull_latest(&self) -> bool {
        let _guard = self.guard();
        if !self.has_remote() {
            debug!(repo = ?self.repo_dir, "no remote configured; skipping pull");
            return false;
        }

        let out = self.git(&["fetch", "origin", &self.branch, "--quiet"]);
        if !out.success {
            self.fail("fetch", &out);
            return false;
        }
        let target = format!("origin/{}", self.branch);
        let out = self.git(&["reset", "--hard", &target]);
        if !out.success {
            self.fail("reset", &out);
            return false;
        }
        let out = self.git(&["clean", "-fdx"]);
        if !out.success {
            self.fail("clean", &out);
        }

        info!(repo = ?self.repo_dir, branch = %self.branch, "pulled latest");
        true
    }

    fn stage_all(&self) -> bool {
        let _guard = self.guard();
        let out = self.git(&["add", "-A"]);
        if !out.success {
            self.fail("add", &out);
            return false;
        }
        true
    }

    fn commit(&self, message: &str) -> bool {
        let _guard = self.guard();
        if !self.has_changes() {
            debug!(repo = ?self.repo_dir, "nothing to commit");
            return false;
        }
        self.set_identity();
        let out = self.git(&["commit", "--quiet", "-m", message]);
        if !out.success {
            self.fail("commit", &out);
            return false;
        }
        info!(repo = ?self.repo_dir, message, "committed");
        true
    }

    fn push(&self) -> bool {
        let _guard = self.guard();
        if !self.has_remote() {
            debug!(repo = ?self.repo_dir, "no remote configured; skipping push");
            return false;
        }

        let upstream = format!("origin/{}", self.branch);
        self.git(&["branch", "--set-upstream-to", &upstream, &self.branch]);
        let out = self.git(&["push", "--force-with-lease", "origin", &self.branch]);
        if !out.success {
            self.fail("push", &out);
            return false;
        }
        info!(repo = ?self.repo_dir, branch = %self.branch, "pushed");
        true
    }
}

