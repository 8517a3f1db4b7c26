//! Optional collaborators the orchestrator hands work to.
//!
//! Each is injected as `Option<Arc<dyn …>>`; an absent collaborator turns the
//! corresponding step into a no-op.

use std::path::{Path, PathBuf};

use golden_core::RepoAlias;

use crate::error::OrchestratorError;

/// Receives every freshly promoted snapshot for retention pruning.
/// Fire-and-forget: failures stay inside the implementation.
pub trait CleanupScheduler: Send + Sync {
    fn schedule_cleanup(&self, alias: &RepoAlias, new_snapshot: &Path);
}

/// Background work the orchestrator can request but does not perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// Write the description artifact for a repo that lacks one.
    GenerateDescription { alias: RepoAlias, repo_path: PathBuf },
}

pub trait WorkQueue: Send + Sync {
    fn submit_work(&self, item: WorkItem) -> Result<(), OrchestratorError>;
}

pub type JobId = String;

/// A unit of blocking work; `Ok` carries a one-line summary.
pub type Job = Box<dyn FnOnce() -> Result<String, OrchestratorError> + Send + 'static>;

/// Runs jobs asynchronously and hands back an id to poll.
pub trait JobSubmitter: Send + Sync {
    fn submit_job(&self, name: &str, job: Job) -> Result<JobId, OrchestratorError>;
}
