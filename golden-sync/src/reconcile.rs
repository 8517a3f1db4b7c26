//! One-shot startup repair: restore missing master clones from snapshots.
//!
//! Runs without per-alias locks, so it must complete before any refresh
//! traffic starts. Guarded by a marker file; once the marker exists every
//! later call returns immediately.

use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use golden_core::{GoldenRepo, RepoAlias};

use crate::collaborators::{WorkItem, WorkQueue};
use crate::error::OrchestratorError;
use crate::orchestrator::RefreshOrchestrator;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// The marker was already present; nothing was inspected.
    pub already_complete: bool,
    pub restored: Vec<RepoAlias>,
    /// No master and no snapshot to restore from.
    pub orphaned: Vec<RepoAlias>,
    pub failed: Vec<ReconcileFailure>,
    /// Master is back on disk (and listed in `restored`) but the indexer's
    /// `fix-config` step failed.
    pub config_fix_failed: Vec<ReconcileFailure>,
    pub descriptions_queued: Vec<RepoAlias>,
    /// Set when the pass aborted before visiting every repo.
    pub aborted: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileFailure {
    pub alias: RepoAlias,
    pub error: String,
}

impl RefreshOrchestrator {
    /// Restore every missing master that has snapshots, optionally queue
    /// description generation, and write the marker. Never fails.
    pub fn reconcile_golden_repos(&self, work_queue: Option<&dyn WorkQueue>) -> ReconcileReport {
        let marker = self.layout.reconciliation_marker();
        if marker.exists() {
            tracing::debug!(marker = %marker.display(), "reconciliation already complete");
            return ReconcileReport {
                already_complete: true,
                ..ReconcileReport::default()
            };
        }

        let mut report = ReconcileReport::default();
        if let Err(err) = self.reconcile_all(work_queue, &mut report) {
            tracing::error!(error = %err, "reconciliation aborted");
            report.aborted = Some(err.to_string());
        }

        write_marker(&marker);
        tracing::info!(
            restored = report.restored.len(),
            orphaned = report.orphaned.len(),
            failed = report.failed.len(),
            config_fix_failed = report.config_fix_failed.len(),
            queued = report.descriptions_queued.len(),
            "reconciliation finished",
        );
        report
    }

    fn reconcile_all(
        &self,
        work_queue: Option<&dyn WorkQueue>,
        report: &mut ReconcileReport,
    ) -> Result<(), OrchestratorError> {
        let repos = self.metadata.list_repos()?;

        for repo in repos.iter().filter(|r| !r.is_local()) {
            if repo.clone_path.exists() {
                continue;
            }
            match self.restore_one(repo) {
                Ok(true) => report.restored.push(repo.alias.clone()),
                Ok(false) => {
                    tracing::warn!(alias = %repo.alias, "master missing and no snapshots to restore from");
                    report.orphaned.push(repo.alias.clone());
                }
                // The rename into place is the last filesystem step, so a
                // master on disk means only the config fix went wrong.
                Err(err) if repo.clone_path.exists() => {
                    tracing::warn!(alias = %repo.alias, error = %err, "master restored but config fix failed");
                    report.restored.push(repo.alias.clone());
                    report.config_fix_failed.push(ReconcileFailure {
                        alias: repo.alias.clone(),
                        error: err.to_string(),
                    });
                }
                Err(err) => {
                    tracing::error!(alias = %repo.alias, error = %err, "failed to restore master");
                    report.failed.push(ReconcileFailure {
                        alias: repo.alias.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        let Some(queue) = work_queue else {
            return Ok(());
        };
        for repo in &repos {
            if !repo.clone_path.exists() || self.layout.description_path(&repo.alias).exists() {
                continue;
            }
            let item = WorkItem::GenerateDescription {
                alias: repo.alias.clone(),
                repo_path: repo.clone_path.clone(),
            };
            match queue.submit_work(item) {
                Ok(()) => report.descriptions_queued.push(repo.alias.clone()),
                Err(err) => {
                    tracing::warn!(alias = %repo.alias, error = %err, "failed to queue description generation");
                }
            }
        }
        Ok(())
    }

    /// `Ok(false)` when there is nothing to restore from.
    fn restore_one(&self, repo: &GoldenRepo) -> Result<bool, OrchestratorError> {
        if self.snapshots.list_snapshots(&repo.alias)?.is_empty() {
            return Ok(false);
        }
        let master = self.snapshots.restore_master(repo)?;
        tracing::info!(alias = %repo.alias, master = %master.display(), "master restored");
        Ok(true)
    }
}

fn write_marker(marker: &Path) {
    if let Some(parent) = marker.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(err) = std::fs::write(marker, format!("{}\n", Utc::now().to_rfc3339())) {
        tracing::error!(marker = %marker.display(), error = %err, "failed to write reconciliation marker");
    }
}
