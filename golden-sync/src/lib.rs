//! # golden-sync
//!
//! Keeps golden repos synchronized, indexed, snapshotted, and promoted.
//!
//! - [`write_lock`]: cross-process per-alias write lock
//! - [`git_sync`]: master clone synchronization with divergence recovery
//! - [`snapshot`] / [`alias`]: CoW snapshots and atomic alias pointers
//! - [`orchestrator`]: refresh, branch change, registration
//! - [`reconcile`]: startup restoration of missing masters
//! - [`pipeline`]: the entrypoint shared by CLI and daemon

pub mod alias;
pub mod cleanup;
pub mod collaborators;
pub mod command;
pub mod error;
pub mod git_sync;
pub mod indexer;
pub mod orchestrator;
pub mod pipeline;
pub mod reconcile;
pub mod snapshot;
pub mod testing;
pub mod write_lock;

pub use alias::{AliasManager, AliasPointer};
pub use cleanup::RetentionCleanup;
pub use collaborators::{CleanupScheduler, Job, JobId, JobSubmitter, WorkItem, WorkQueue};
pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
pub use error::{
    CommandError, GitSyncError, IndexError, LockError, OrchestratorError, SnapshotError,
};
pub use git_sync::{GitCli, GitProvider, GitSyncUpdater, RepoUpdater};
pub use indexer::{CidxIndexer, Indexer};
pub use orchestrator::{BranchChange, RefreshOrchestrator, RefreshOutcome};
pub use pipeline::{RefreshScope, RepoRefresh};
pub use reconcile::{ReconcileFailure, ReconcileReport};
pub use snapshot::{Snapshot, SnapshotManager, SnapshotStore};
pub use write_lock::{LockInfo, ProcessProbe, SystemProcessProbe, WriteLockManager};
