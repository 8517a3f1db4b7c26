//! Synchronizing one master clone with its remote.
//!
//! ## `update(force_reset)`
//!
//! 1. `git status --porcelain`; any output → `git reset --hard HEAD`.
//! 2. `force_reset`: detect branch (fallback `main`), `git fetch origin`,
//!    `git reset --hard origin/<branch>`. No pull, no further recovery.
//! 3. otherwise `git pull`. A divergent-branch failure is recovered with the
//!    step 2 sequence; every other failure is returned with git's stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::GitSyncError;

/// Branch used when `rev-parse --abbrev-ref HEAD` fails or is detached.
pub const FALLBACK_BRANCH: &str = "main";

/// stderr fragments git prints when `pull` refuses to reconcile history.
pub const DIVERGENCE_MARKERS: [&str; 2] = ["divergent branches", "Need to specify how to reconcile"];

pub fn is_divergence(stderr: &str) -> bool {
    DIVERGENCE_MARKERS.iter().any(|m| stderr.contains(m))
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Git operations the orchestrator needs against one master clone.
pub trait RepoUpdater: Send + Sync {
    /// Fetch, then compare `HEAD` with the remote tip of the current branch.
    fn has_changes(&self) -> Result<bool, GitSyncError>;

    fn update(&self, force_reset: bool) -> Result<(), GitSyncError>;

    fn fetch(&self) -> Result<(), GitSyncError>;

    fn remote_branch_exists(&self, branch: &str) -> Result<bool, GitSyncError>;

    /// Switch the working tree to `branch` and pull it.
    fn checkout_branch(&self, branch: &str) -> Result<(), GitSyncError>;
}

/// Hands out updaters per clone and performs initial clones.
pub trait GitProvider: Send + Sync {
    fn updater(&self, repo_path: &Path) -> Box<dyn RepoUpdater>;

    fn clone_repo(&self, url: &str, branch: &str, dest: &Path) -> Result<(), GitSyncError>;
}

/// [`GitProvider`] backed by the `git` binary.
#[derive(Clone)]
pub struct GitCli {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl GitCli {
    pub fn new(runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }
}

impl GitProvider for GitCli {
    fn updater(&self, repo_path: &Path) -> Box<dyn RepoUpdater> {
        Box::new(GitSyncUpdater::new(repo_path, self.runner.clone(), self.timeout))
    }

    fn clone_repo(&self, url: &str, branch: &str, dest: &Path) -> Result<(), GitSyncError> {
        let mut spec = git_spec(
            vec![
                "clone".to_string(),
                "--branch".to_string(),
                branch.to_string(),
                url.to_string(),
                dest.to_string_lossy().into_owned(),
            ],
            self.timeout,
        );
        if let Some(parent) = dest.parent() {
            spec = spec.current_dir(parent);
        }
        tracing::info!(url, branch, dest = %dest.display(), "cloning golden repo");
        let output = self
            .runner
            .run(&spec)
            .map_err(|source| GitSyncError::Command {
                repo: dest.to_path_buf(),
                source,
            })?;
        check(&spec, dest, output).map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// GitSyncUpdater
// ---------------------------------------------------------------------------

pub struct GitSyncUpdater {
    repo_path: PathBuf,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl GitSyncUpdater {
    pub fn new(repo_path: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            repo_path: repo_path.into(),
            runner,
            timeout,
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Current branch via `rev-parse --abbrev-ref HEAD`. Any failure, a
    /// timeout, or a detached `HEAD` yields [`FALLBACK_BRANCH`].
    pub fn detect_branch(&self) -> String {
        match self.run(&["rev-parse", "--abbrev-ref", "HEAD"]) {
            Ok(output) if output.success() => {
                let branch = output.stdout.trim();
                if branch.is_empty() || branch == "HEAD" {
                    tracing::warn!(repo = %self.repo_path.display(), "detached or empty HEAD; assuming {FALLBACK_BRANCH}");
                    FALLBACK_BRANCH.to_string()
                } else {
                    branch.to_string()
                }
            }
            Ok(output) => {
                tracing::warn!(
                    repo = %self.repo_path.display(),
                    stderr = %output.stderr.trim(),
                    "branch detection failed; assuming {FALLBACK_BRANCH}",
                );
                FALLBACK_BRANCH.to_string()
            }
            Err(err) => {
                tracing::warn!(repo = %self.repo_path.display(), error = %err, "branch detection failed; assuming {FALLBACK_BRANCH}");
                FALLBACK_BRANCH.to_string()
            }
        }
    }

    /// Hard-reset to `HEAD` if the working tree has local modifications.
    ///
    /// A failing `status` is only logged: the sync that follows surfaces real
    /// repository problems with better errors.
    fn reset_local_modifications(&self) -> Result<(), GitSyncError> {
        match self.run(&["status", "--porcelain"]) {
            Ok(output) if output.success() => {
                if output.stdout.trim().is_empty() {
                    return Ok(());
                }
                tracing::warn!(repo = %self.repo_path.display(), "local modifications found; resetting to HEAD");
                self.run_checked(&["reset", "--hard", "HEAD"]).map(|_| ())
            }
            Ok(output) => {
                tracing::warn!(repo = %self.repo_path.display(), stderr = %output.stderr.trim(), "git status failed");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(repo = %self.repo_path.display(), error = %err, "git status failed");
                Ok(())
            }
        }
    }

    /// `fetch origin` + `reset --hard origin/<branch>`.
    fn fetch_and_reset(&self) -> Result<(), GitSyncError> {
        let branch = self.detect_branch();
        self.run_checked(&["fetch", "origin"])?;
        let target = format!("origin/{branch}");
        self.run_checked(&["reset", "--hard", &target])?;
        tracing::info!(repo = %self.repo_path.display(), target = %target, "hard reset to remote");
        Ok(())
    }

    fn pull_with_recovery(&self) -> Result<(), GitSyncError> {
        match self.run_checked(&["pull"]) {
            Ok(_) => Ok(()),
            Err(err) if err.stderr().is_some_and(is_divergence) => {
                tracing::warn!(repo = %self.repo_path.display(), "divergent branches on pull; recovering with fetch + hard reset");
                self.fetch_and_reset()
            }
            Err(err) => Err(err),
        }
    }

    fn rev_parse(&self, rev: &str) -> Result<String, GitSyncError> {
        let output = self.run_checked(&["rev-parse", rev])?;
        Ok(output.stdout.trim().to_string())
    }

    fn run(&self, args: &[&str]) -> Result<CommandOutput, GitSyncError> {
        let spec = self.spec(args);
        self.runner.run(&spec).map_err(|source| GitSyncError::Command {
            repo: self.repo_path.clone(),
            source,
        })
    }

    fn run_checked(&self, args: &[&str]) -> Result<CommandOutput, GitSyncError> {
        let spec = self.spec(args);
        let output = self.runner.run(&spec).map_err(|source| GitSyncError::Command {
            repo: self.repo_path.clone(),
            source,
        })?;
        check(&spec, &self.repo_path, output)
    }

    fn spec(&self, args: &[&str]) -> CommandSpec {
        git_spec(args.iter().map(|a| a.to_string()).collect(), self.timeout).current_dir(&self.repo_path)
    }
}

impl RepoUpdater for GitSyncUpdater {
    fn has_changes(&self) -> Result<bool, GitSyncError> {
        self.fetch()?;
        let branch = self.detect_branch();
        let local = self.rev_parse("HEAD")?;
        let remote = self.rev_parse(&format!("origin/{branch}"))?;
        let changed = local != remote;
        tracing::debug!(repo = %self.repo_path.display(), %local, %remote, changed, "checked for upstream changes");
        Ok(changed)
    }

    fn update(&self, force_reset: bool) -> Result<(), GitSyncError> {
        self.reset_local_modifications()?;
        if force_reset {
            return self.fetch_and_reset();
        }
        self.pull_with_recovery()
    }

    fn fetch(&self) -> Result<(), GitSyncError> {
        self.run_checked(&["fetch", "origin"]).map(|_| ())
    }

    fn remote_branch_exists(&self, branch: &str) -> Result<bool, GitSyncError> {
        let reference = format!("refs/remotes/origin/{branch}");
        let output = self.run(&["rev-parse", "--verify", "--quiet", &reference])?;
        Ok(output.success())
    }

    fn checkout_branch(&self, branch: &str) -> Result<(), GitSyncError> {
        self.reset_local_modifications()?;
        self.run_checked(&["checkout", branch])?;
        self.pull_with_recovery()
    }
}

fn git_spec(args: Vec<String>, timeout: Duration) -> CommandSpec {
    // Never block on a credential prompt.
    CommandSpec::new("git", args, timeout).env("GIT_TERMINAL_PROMPT", "0")
}

fn check(spec: &CommandSpec, repo: &Path, output: CommandOutput) -> Result<CommandOutput, GitSyncError> {
    if output.success() {
        return Ok(output);
    }
    Err(GitSyncError::Failed {
        command: spec.display(),
        repo: repo.to_path_buf(),
        exit_code: output.exit_code,
        stderr: output.stderr.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingRunner, TEST_TIMEOUT};

    fn updater(runner: &Arc<RecordingRunner>) -> GitSyncUpdater {
        GitSyncUpdater::new("/golden/my-repo", runner.clone(), TEST_TIMEOUT)
    }

    #[test]
    fn divergence_markers_are_recognized() {
        assert!(is_divergence("hint: You have divergent branches and need to specify how to reconcile them."));
        assert!(is_divergence("fatal: Need to specify how to reconcile divergent branches."));
        assert!(!is_divergence("fatal: Authentication failed"));
    }

    #[test]
    fn commands_run_in_repo_without_prompting() {
        let runner = Arc::new(RecordingRunner::new());
        updater(&runner).fetch().unwrap();
        let call = &runner.calls()[0];
        assert_eq!(call.cwd.as_deref(), Some(Path::new("/golden/my-repo")));
        assert!(call.env.contains(&("GIT_TERMINAL_PROMPT".into(), "0".into())));
    }

    #[test]
    fn detached_head_falls_back_to_main() {
        let runner = Arc::new(RecordingRunner::new());
        runner.on(&["git", "rev-parse", "--abbrev-ref"], CommandOutput::ok("HEAD\n"));
        assert_eq!(updater(&runner).detect_branch(), "main");
    }

    #[test]
    fn clean_tree_skips_head_reset() {
        let runner = Arc::new(RecordingRunner::new());
        updater(&runner).update(false).unwrap();
        assert_eq!(runner.command_lines(), vec!["git status --porcelain", "git pull"]);
    }

    #[test]
    fn has_changes_compares_head_with_remote_tip() {
        let runner = Arc::new(RecordingRunner::new());
        runner
            .on(&["git", "rev-parse", "--abbrev-ref"], CommandOutput::ok("develop\n"))
            .on(&["git", "rev-parse", "HEAD"], CommandOutput::ok("aaa\n"))
            .on(&["git", "rev-parse", "origin/develop"], CommandOutput::ok("bbb\n"));
        assert!(updater(&runner).has_changes().unwrap());

        runner.on(&["git", "rev-parse", "origin/develop"], CommandOutput::ok("aaa\n"));
        assert!(!updater(&runner).has_changes().unwrap());
    }

    #[test]
    fn remote_branch_exists_uses_exit_code() {
        let runner = Arc::new(RecordingRunner::new());
        runner.on(
            &["git", "rev-parse", "--verify", "--quiet", "refs/remotes/origin/ghost"],
            CommandOutput::failed(1, ""),
        );
        let updater = updater(&runner);
        assert!(!updater.remote_branch_exists("ghost").unwrap());
        assert!(updater.remote_branch_exists("main").unwrap());
    }

    #[test]
    fn checkout_failure_carries_stderr() {
        let runner = Arc::new(RecordingRunner::new());
        runner.on(
            &["git", "checkout"],
            CommandOutput::failed(1, "error: pathspec 'nope' did not match"),
        );
        let err = updater(&runner).checkout_branch("nope").unwrap_err();
        assert_eq!(err.stderr(), Some("error: pathspec 'nope' did not match"));
        assert_eq!(runner.count(&["git", "pull"]), 0);
    }

    #[test]
    fn clone_runs_from_parent_directory() {
        let runner = Arc::new(RecordingRunner::new());
        let git = GitCli::new(runner.clone(), TEST_TIMEOUT);
        git.clone_repo("https://example.com/r.git", "main", Path::new("/golden/r"))
            .unwrap();
        let call = &runner.calls()[0];
        assert_eq!(call.display(), "git clone --branch main https://example.com/r.git /golden/r");
        assert_eq!(call.cwd.as_deref(), Some(Path::new("/golden")));
    }
}
