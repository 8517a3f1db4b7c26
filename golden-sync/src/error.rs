//! Error types for golden-sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use golden_core::error::MetadataError;

/// Failure to run an external program.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The program outlived its timeout and was killed.
    #[error("`{command}` timed out after {}s", timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },

    /// Waiting on or reading from the child failed.
    #[error("I/O error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Write-lock file errors. Contention is not an error; it is a `false` return.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lock JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A git operation against a master clone failed.
#[derive(Debug, Error)]
pub enum GitSyncError {
    /// git ran and exited non-zero. `stderr` is kept verbatim.
    #[error("`{command}` failed (exit code {exit_code:?}) in {repo}: {stderr}")]
    Failed {
        command: String,
        repo: PathBuf,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// git could not be run or timed out.
    #[error("git command failed in {repo}: {source}")]
    Command {
        repo: PathBuf,
        #[source]
        source: CommandError,
    },
}

impl GitSyncError {
    /// The captured stderr, when git actually ran.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            GitSyncError::Failed { stderr, .. } => Some(stderr),
            GitSyncError::Command { .. } => None,
        }
    }
}

/// Snapshot creation, promotion, or restoration failed.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("alias pointer JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Command(#[from] CommandError),

    /// The copy or path-fixup tool exited non-zero.
    #[error("`{command}` failed (exit code {exit_code:?}): {stderr}")]
    ToolFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("master clone missing at {path}")]
    MasterMissing { path: PathBuf },

    #[error("no snapshots under {path}")]
    NoSnapshots { path: PathBuf },
}

/// The external indexer failed.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("`{command}` failed (exit code {exit_code:?}) in {repo}: {stderr}")]
    Failed {
        command: String,
        repo: PathBuf,
        exit_code: Option<i32>,
        stderr: String,
    },
}

/// Everything a refresh, branch change, or registration can surface.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Another writer holds the alias. Never retried internally.
    #[error("golden repo '{alias}' {reason}")]
    LockConflict { alias: String, reason: String },

    #[error("git sync failed: {0}")]
    GitSync(#[from] GitSyncError),

    /// Validation failure: the requested branch is absent on the remote.
    #[error("branch '{branch}' does not exist on the remote of '{alias}'")]
    BranchNotFound { alias: String, branch: String },

    #[error("golden repo '{alias}' is not registered")]
    RepoNotFound { alias: String },

    #[error("golden repo '{alias}' is local:// and has no remote to sync")]
    LocalRepo { alias: String },

    #[error("indexing failed: {0}")]
    Index(#[from] IndexError),

    #[error("snapshot failed: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("write lock error: {0}")]
    Lock(#[from] LockError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job error: {0}")]
    Job(String),
}

impl OrchestratorError {
    /// Validation-class failures: the request itself is wrong, not its execution.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OrchestratorError::BranchNotFound { .. }
                | OrchestratorError::RepoNotFound { .. }
                | OrchestratorError::LocalRepo { .. }
                | OrchestratorError::Metadata(MetadataError::DuplicateAlias { .. })
                | OrchestratorError::Metadata(MetadataError::BaseNameConflict { .. })
                | OrchestratorError::Metadata(MetadataError::InvalidAlias { .. })
        )
    }

    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, OrchestratorError::LockConflict { .. })
    }
}

pub(crate) fn lock_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> LockError {
    LockError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn snapshot_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> OrchestratorError {
    OrchestratorError::Io {
        path: path.into(),
        source,
    }
}
