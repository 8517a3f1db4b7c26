//! Retention-based pruning of old snapshots.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use golden_core::RepoAlias;

use crate::collaborators::CleanupScheduler;
use crate::snapshot::SnapshotManager;

/// Keeps the newest `keep` snapshots of an alias, plus the new snapshot and
/// whatever the alias pointer targets, and deletes the rest.
#[derive(Clone)]
pub struct RetentionCleanup {
    snapshots: Arc<dyn SnapshotManager>,
    keep: usize,
}

impl RetentionCleanup {
    pub fn new(snapshots: Arc<dyn SnapshotManager>, keep: usize) -> Self {
        Self { snapshots, keep }
    }

    /// Delete every snapshot outside the retention window. Returns the
    /// removed paths; individual failures are logged and skipped.
    pub fn prune(&self, alias: &RepoAlias, new_snapshot: &Path) -> Vec<PathBuf> {
        let snapshots = match self.snapshots.list_snapshots(alias) {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(alias = %alias, error = %err, "cannot list snapshots for cleanup");
                return Vec::new();
            }
        };

        let mut protected: HashSet<PathBuf> = HashSet::new();
        protected.insert(new_snapshot.to_path_buf());
        match self.snapshots.current_target(alias) {
            Ok(Some(target)) => {
                protected.insert(target);
            }
            Ok(None) => {}
            Err(err) => {
                // Without the pointer we cannot tell what readers use.
                tracing::warn!(alias = %alias, error = %err, "cannot read alias pointer; skipping cleanup");
                return Vec::new();
            }
        }

        let cutoff = snapshots.len().saturating_sub(self.keep);
        let mut removed = Vec::new();
        for snapshot in snapshots.into_iter().take(cutoff) {
            if protected.contains(&snapshot.path) {
                continue;
            }
            match std::fs::remove_dir_all(&snapshot.path) {
                Ok(()) => {
                    tracing::info!(alias = %alias, snapshot = %snapshot.path.display(), "pruned snapshot");
                    removed.push(snapshot.path);
                }
                Err(err) => {
                    tracing::warn!(alias = %alias, snapshot = %snapshot.path.display(), error = %err, "failed to prune snapshot");
                }
            }
        }
        removed
    }
}

impl CleanupScheduler for RetentionCleanup {
    fn schedule_cleanup(&self, alias: &RepoAlias, new_snapshot: &Path) {
        self.prune(alias, new_snapshot);
    }
}
