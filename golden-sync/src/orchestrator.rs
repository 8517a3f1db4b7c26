//! Refresh, branch change, and registration of golden repos.
//!
//! Every mutation of a golden repo (master clone, snapshots, alias pointer)
//! happens while holding that alias's write lock. The lock is taken through
//! [`LockGuard`], whose `Drop` releases it on every exit path.
//!
//! ## `execute_refresh(alias, force_reset)`
//!
//! ```text
//! lock ─► force_reset? ── yes ─► update(true) ──────────────┐
//!              │                                             ▼
//!              no ─► has_changes? ─ yes ─► update(false) ─► index ─► snapshot ─► promote ─► cleanup
//!                        │                                   ▲
//!                        no ─► pointer target exists? ─ no ──┘
//!                                  │
//!                                  yes ─► Unchanged
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use golden_core::{
    FileMetadataStore, GoldenConfig, GoldenLayout, GoldenRepo, MetadataError, MetadataStore,
    RepoAlias,
};

use crate::cleanup::RetentionCleanup;
use crate::collaborators::{CleanupScheduler, JobId, JobSubmitter};
use crate::command::{CommandRunner, SystemCommandRunner};
use crate::error::{io_err, OrchestratorError};
use crate::git_sync::{GitCli, GitProvider};
use crate::indexer::{CidxIndexer, Indexer};
use crate::snapshot::{SnapshotManager, SnapshotStore};
use crate::write_lock::WriteLockManager;

pub const OWNER_REFRESH: &str = "refresh";
pub const OWNER_BRANCH_CHANGE: &str = "branch_change";
pub const OWNER_REGISTRATION: &str = "registration";
pub const OWNER_REMOVAL: &str = "removal";

static LOCK_SEQ: AtomicU64 = AtomicU64::new(0);

/// `refresh-4242-7`: activity, pid, and a per-process sequence number, so a
/// guard never releases a lock that replaced its own after expiry.
fn lock_owner(activity: &str) -> String {
    let seq = LOCK_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{activity}-{}-{seq}", std::process::id())
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new snapshot was built and the alias now points at it.
    Promoted { snapshot: PathBuf },
    /// No upstream changes and the current target is intact.
    Unchanged { target: PathBuf },
}

impl fmt::Display for RefreshOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshOutcome::Promoted { snapshot } => write!(f, "promoted {}", snapshot.display()),
            RefreshOutcome::Unchanged { target } => write!(f, "unchanged, serving {}", target.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchChange {
    /// Target equals the current default branch; nothing was touched.
    AlreadyOnBranch { branch: String },
    Switched {
        from: String,
        to: String,
        snapshot: PathBuf,
    },
}

impl fmt::Display for BranchChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchChange::AlreadyOnBranch { branch } => write!(f, "already on '{branch}'"),
            BranchChange::Switched { from, to, snapshot } => {
                write!(f, "switched '{from}' → '{to}', promoted {}", snapshot.display())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Lock guard
// ---------------------------------------------------------------------------

struct LockGuard<'a> {
    locks: &'a WriteLockManager,
    alias: &'a RepoAlias,
    owner: String,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        match self.locks.release(self.alias.as_str(), &self.owner) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(alias = %self.alias, owner = %self.owner, "write lock was taken over before release");
            }
            Err(err) => {
                tracing::error!(alias = %self.alias, owner = %self.owner, error = %err, "failed to release write lock");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RefreshOrchestrator
// ---------------------------------------------------------------------------

pub struct RefreshOrchestrator {
    pub(crate) layout: GoldenLayout,
    pub(crate) metadata: Arc<dyn MetadataStore>,
    pub(crate) locks: WriteLockManager,
    pub(crate) git: Arc<dyn GitProvider>,
    pub(crate) indexer: Arc<dyn Indexer>,
    pub(crate) snapshots: Arc<dyn SnapshotManager>,
    cleanup: Option<Arc<dyn CleanupScheduler>>,
    jobs: Option<Arc<dyn JobSubmitter>>,
    lock_ttl_seconds: u64,
}

impl RefreshOrchestrator {
    pub fn new(
        layout: GoldenLayout,
        metadata: Arc<dyn MetadataStore>,
        git: Arc<dyn GitProvider>,
        indexer: Arc<dyn Indexer>,
        snapshots: Arc<dyn SnapshotManager>,
    ) -> Self {
        Self {
            locks: WriteLockManager::new(layout.locks_dir()),
            layout,
            metadata,
            git,
            indexer,
            snapshots,
            cleanup: None,
            jobs: None,
            lock_ttl_seconds: crate::write_lock::DEFAULT_LOCK_TTL_SECONDS,
        }
    }

    /// Real git, `cp`, and indexer processes, wired from `config`.
    pub fn from_config(config: &GoldenConfig) -> Self {
        Self::from_config_with_runner(config, Arc::new(SystemCommandRunner))
    }

    pub fn from_config_with_runner(config: &GoldenConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let layout = config.layout();
        let snapshots: Arc<dyn SnapshotManager> = Arc::new(SnapshotStore::new(
            layout.clone(),
            runner.clone(),
            config.copy_timeout(),
            config.indexer.clone(),
            config.index_timeout(),
        ));
        let cleanup = RetentionCleanup::new(snapshots.clone(), config.snapshot_retention);
        Self::new(
            layout,
            Arc::new(FileMetadataStore::new(&config.golden_repos_dir)),
            Arc::new(GitCli::new(runner.clone(), config.git_timeout())),
            Arc::new(CidxIndexer::new(runner, config.indexer.clone(), config.index_timeout())),
            snapshots,
        )
        .with_cleanup(Arc::new(cleanup))
        .with_lock_ttl(config.lock_ttl_seconds)
    }

    pub fn with_cleanup(mut self, cleanup: Arc<dyn CleanupScheduler>) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    pub fn with_job_submitter(mut self, jobs: Arc<dyn JobSubmitter>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn with_lock_ttl(mut self, ttl_seconds: u64) -> Self {
        self.lock_ttl_seconds = ttl_seconds;
        self
    }

    pub fn with_lock_manager(mut self, locks: WriteLockManager) -> Self {
        self.locks = locks;
        self
    }

    pub fn layout(&self) -> &GoldenLayout {
        &self.layout
    }

    pub fn locks(&self) -> &WriteLockManager {
        &self.locks
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn snapshots(&self) -> &Arc<dyn SnapshotManager> {
        &self.snapshots
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    /// Sync, index, snapshot, and promote one golden repo.
    pub fn execute_refresh(
        &self,
        alias: &RepoAlias,
        force_reset: bool,
    ) -> Result<RefreshOutcome, OrchestratorError> {
        let repo = self.require_remote_repo(alias)?;
        let _guard = self.lock(alias, OWNER_REFRESH)?;
        tracing::info!(alias = %alias, force_reset, "refresh started");

        let updater = self.git.updater(&repo.clone_path);
        if force_reset {
            updater.update(true)?;
        } else if updater.has_changes()? {
            updater.update(false)?;
        } else if let Some(target) = self.intact_target(alias)? {
            tracing::info!(alias = %alias, target = %target.display(), "no upstream changes");
            return Ok(RefreshOutcome::Unchanged { target });
        }

        let snapshot = self.publish(&repo)?;
        tracing::info!(alias = %alias, snapshot = %snapshot.display(), "refresh complete");
        Ok(RefreshOutcome::Promoted { snapshot })
    }

    /// Hand a refresh to the job submitter, with `force_reset` captured now.
    ///
    /// Without a submitter the refresh runs inline and no job id is returned.
    pub fn submit_refresh(
        self: &Arc<Self>,
        alias: &RepoAlias,
        force_reset: bool,
    ) -> Result<Option<JobId>, OrchestratorError> {
        self.require_remote_repo(alias)?;
        let Some(jobs) = self.jobs.clone() else {
            self.execute_refresh(alias, force_reset)?;
            return Ok(None);
        };

        let this = Arc::clone(self);
        let owned = alias.clone();
        let job_id = jobs.submit_job(
            &format!("refresh:{alias}"),
            Box::new(move || {
                this.execute_refresh(&owned, force_reset)
                    .map(|outcome| outcome.to_string())
            }),
        )?;
        tracing::info!(alias = %alias, force_reset, job_id = %job_id, "refresh submitted");
        Ok(Some(job_id))
    }

    // -----------------------------------------------------------------------
    // Branch change
    // -----------------------------------------------------------------------

    /// Switch the golden repo to `target_branch` and publish it.
    ///
    /// Order: fetch/validate → checkout/pull → index → snapshot → promote,
    /// then persist the branch and drop branch-keyed tracking records.
    pub fn change_branch(
        &self,
        alias: &RepoAlias,
        target_branch: &str,
    ) -> Result<BranchChange, OrchestratorError> {
        let repo = self.require_repo(alias)?;
        if repo.default_branch == target_branch {
            return Ok(BranchChange::AlreadyOnBranch {
                branch: target_branch.to_string(),
            });
        }
        if repo.is_local() {
            return Err(OrchestratorError::LocalRepo {
                alias: alias.to_string(),
            });
        }

        let _guard = self.lock(alias, OWNER_BRANCH_CHANGE)?;
        tracing::info!(alias = %alias, from = %repo.default_branch, to = target_branch, "branch change started");

        let updater = self.git.updater(&repo.clone_path);
        updater.fetch()?;
        if !updater.remote_branch_exists(target_branch)? {
            return Err(OrchestratorError::BranchNotFound {
                alias: alias.to_string(),
                branch: target_branch.to_string(),
            });
        }
        updater.checkout_branch(target_branch)?;

        let snapshot = self.publish(&repo)?;

        self.metadata.update_default_branch(alias, target_branch)?;
        if let Err(err) = self.metadata.invalidate_description_refresh_tracking(alias) {
            tracing::warn!(alias = %alias, error = %err, "failed to invalidate description tracking");
        }
        if let Err(err) = self.metadata.invalidate_dependency_map_tracking(alias) {
            tracing::warn!(alias = %alias, error = %err, "failed to invalidate dependency map tracking");
        }

        tracing::info!(alias = %alias, branch = target_branch, "branch change complete");
        Ok(BranchChange::Switched {
            from: repo.default_branch,
            to: target_branch.to_string(),
            snapshot,
        })
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Clone (or, for `local://`, create) the master, publish a first
    /// snapshot, then persist the registry entry.
    pub fn add_golden_repo(
        &self,
        alias: &RepoAlias,
        repo_url: &str,
        default_branch: &str,
    ) -> Result<GoldenRepo, OrchestratorError> {
        alias.validate()?;
        if self.metadata.get_repo(alias)?.is_some() {
            return Err(MetadataError::DuplicateAlias {
                alias: alias.to_string(),
            }
            .into());
        }
        let clone_path = self.layout.default_master_path(alias);
        self.ensure_base_name_free(alias, &clone_path)?;
        let _guard = self.lock(alias, OWNER_REGISTRATION)?;

        let repo = GoldenRepo {
            alias: alias.clone(),
            repo_url: repo_url.to_string(),
            default_branch: default_branch.to_string(),
            clone_path,
            created_at: Utc::now(),
        };

        if repo.is_local() {
            std::fs::create_dir_all(&repo.clone_path).map_err(|e| io_err(&repo.clone_path, e))?;
        } else {
            self.git.clone_repo(repo_url, default_branch, &repo.clone_path)?;
        }

        self.publish(&repo)?;
        self.metadata.save_repo(&repo)?;
        tracing::info!(alias = %alias, url = repo_url, "golden repo added");
        Ok(repo)
    }

    /// Drop the registry entry, tracking records, alias pointer, and master
    /// clone. Snapshots are left for cleanup.
    pub fn remove_golden_repo(&self, alias: &RepoAlias) -> Result<(), OrchestratorError> {
        let repo = self.require_repo(alias)?;
        let _guard = self.lock(alias, OWNER_REMOVAL)?;

        self.metadata.remove_repo(alias)?;
        self.snapshots.remove_alias(alias)?;
        match std::fs::remove_dir_all(&repo.clone_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&repo.clone_path, e)),
        }
        tracing::info!(alias = %alias, "golden repo removed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    pub(crate) fn require_repo(&self, alias: &RepoAlias) -> Result<GoldenRepo, OrchestratorError> {
        self.metadata
            .get_repo(alias)?
            .ok_or_else(|| OrchestratorError::RepoNotFound {
                alias: alias.to_string(),
            })
    }

    /// Locks are per alias, so two aliases sharing a master clone or a
    /// `.versioned/` directory could write it concurrently.
    fn ensure_base_name_free(&self, alias: &RepoAlias, clone_path: &Path) -> Result<(), OrchestratorError> {
        let conflict = self.metadata.list_repos()?.into_iter().find(|existing| {
            existing.alias.base_name() == alias.base_name() || existing.clone_path == clone_path
        });
        match conflict {
            Some(existing) => Err(MetadataError::BaseNameConflict {
                alias: alias.to_string(),
                existing: existing.alias.to_string(),
                base_name: alias.base_name().to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }

    fn require_remote_repo(&self, alias: &RepoAlias) -> Result<GoldenRepo, OrchestratorError> {
        let repo = self.require_repo(alias)?;
        if repo.is_local() {
            return Err(OrchestratorError::LocalRepo {
                alias: alias.to_string(),
            });
        }
        Ok(repo)
    }

    fn lock<'a>(&'a self, alias: &'a RepoAlias, activity: &str) -> Result<LockGuard<'a>, OrchestratorError> {
        if self.locks.is_locked(alias.as_str())? {
            return Err(OrchestratorError::LockConflict {
                alias: alias.to_string(),
                reason: "is already being indexed or refreshed".to_string(),
            });
        }
        let owner = lock_owner(activity);
        if !self.locks.acquire(alias.as_str(), &owner, self.lock_ttl_seconds)? {
            return Err(OrchestratorError::LockConflict {
                alias: alias.to_string(),
                reason: "could not acquire write lock".to_string(),
            });
        }
        Ok(LockGuard {
            locks: &self.locks,
            alias,
            owner,
        })
    }

    /// The promoted snapshot, if the pointer exists and its target is on disk.
    fn intact_target(&self, alias: &RepoAlias) -> Result<Option<PathBuf>, OrchestratorError> {
        Ok(self
            .snapshots
            .current_target(alias)?
            .filter(|target| target.is_dir()))
    }

    /// index → snapshot → promote → cleanup. Caller holds the lock.
    fn publish(&self, repo: &GoldenRepo) -> Result<PathBuf, OrchestratorError> {
        self.indexer.index(&repo.clone_path)?;
        let snapshot = self.snapshots.snapshot(repo)?;
        self.snapshots.promote(&repo.alias, &snapshot)?;
        if let Some(cleanup) = &self.cleanup {
            cleanup.schedule_cleanup(&repo.alias, &snapshot);
        }
        Ok(snapshot)
    }
}

impl fmt::Debug for RefreshOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshOrchestrator")
            .field("root", &self.layout.root())
            .field("lock_ttl_seconds", &self.lock_ttl_seconds)
            .field("cleanup", &self.cleanup.is_some())
            .field("jobs", &self.jobs.is_some())
            .finish()
    }
}

