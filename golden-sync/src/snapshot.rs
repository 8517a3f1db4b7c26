//! Versioned copy-on-write snapshots of master clones.
//!
//! ```text
//! <golden_repos_dir>/.versioned/<base_name>/
//!   .staging-v_1767600000/    being copied; never referenced
//!   v_1767600000/             immutable once renamed into place
//! ```
//!
//! Snapshots are produced with `cp --reflink=auto -a`, which clones blocks
//! where the filesystem supports it and copies otherwise.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use golden_core::{GoldenLayout, GoldenRepo, IndexerConfig, RepoAlias};

use crate::alias::AliasManager;
use crate::command::{CommandRunner, CommandSpec};
use crate::error::{snapshot_io_err, SnapshotError};

const SNAPSHOT_PREFIX: &str = "v_";
const STAGING_PREFIX: &str = ".staging-";

/// One `v_<unix_ts>` directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Snapshot {
    pub timestamp: u64,
    pub path: PathBuf,
}

/// `v_1500000` → `Some(1500000)`. Anything else → `None`.
pub fn parse_snapshot_name(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(SNAPSHOT_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub trait SnapshotManager: Send + Sync {
    /// Copy the master clone of `repo` into a new snapshot directory.
    fn snapshot(&self, repo: &GoldenRepo) -> Result<PathBuf, SnapshotError>;

    /// Atomically point the alias at `snapshot`.
    fn promote(&self, alias: &RepoAlias, snapshot: &Path) -> Result<(), SnapshotError>;

    /// Rebuild a missing master clone from the newest snapshot.
    fn restore_master(&self, repo: &GoldenRepo) -> Result<PathBuf, SnapshotError>;

    /// Snapshots in ascending timestamp order.
    fn list_snapshots(&self, alias: &RepoAlias) -> Result<Vec<Snapshot>, SnapshotError>;

    /// Where the alias pointer currently points, if anywhere.
    fn current_target(&self, alias: &RepoAlias) -> Result<Option<PathBuf>, SnapshotError>;

    /// Drop the alias pointer. Snapshots stay on disk.
    fn remove_alias(&self, alias: &RepoAlias) -> Result<bool, SnapshotError>;
}

#[derive(Clone)]
pub struct SnapshotStore {
    layout: GoldenLayout,
    aliases: AliasManager,
    runner: Arc<dyn CommandRunner>,
    copy_timeout: Duration,
    indexer: IndexerConfig,
    fix_config_timeout: Duration,
}

impl SnapshotStore {
    pub fn new(
        layout: GoldenLayout,
        runner: Arc<dyn CommandRunner>,
        copy_timeout: Duration,
        indexer: IndexerConfig,
        fix_config_timeout: Duration,
    ) -> Self {
        Self {
            aliases: AliasManager::new(layout.clone()),
            layout,
            runner,
            copy_timeout,
            indexer,
            fix_config_timeout,
        }
    }

    pub fn aliases(&self) -> &AliasManager {
        &self.aliases
    }

    pub fn latest_snapshot(&self, alias: &RepoAlias) -> Result<Option<Snapshot>, SnapshotError> {
        Ok(self.list_snapshots(alias)?.pop())
    }

    fn cow_copy(&self, src: &Path, dst: &Path) -> Result<(), SnapshotError> {
        let spec = CommandSpec::new(
            "cp",
            [
                "--reflink=auto".to_string(),
                "-a".to_string(),
                src.to_string_lossy().into_owned(),
                dst.to_string_lossy().into_owned(),
            ],
            self.copy_timeout,
        );
        let output = self.runner.run(&spec)?;
        if !output.success() {
            return Err(SnapshotError::ToolFailed {
                command: spec.display(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    fn fix_config(&self, master: &Path) -> Result<(), SnapshotError> {
        let spec = CommandSpec::new(
            self.indexer.program.clone(),
            self.indexer.fix_config_args.clone(),
            self.fix_config_timeout,
        )
        .current_dir(master);
        let output = self.runner.run(&spec)?;
        if !output.success() {
            return Err(SnapshotError::ToolFailed {
                command: spec.display(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl SnapshotManager for SnapshotStore {
    fn snapshot(&self, repo: &GoldenRepo) -> Result<PathBuf, SnapshotError> {
        let master = &repo.clone_path;
        if !master.is_dir() {
            return Err(SnapshotError::MasterMissing { path: master.clone() });
        }
        let versioned = self.layout.versioned_dir(&repo.alias);
        std::fs::create_dir_all(&versioned).map_err(|e| snapshot_io_err(&versioned, e))?;

        let mut ts = unix_now();
        let (staging, target) = loop {
            let name = format!("{SNAPSHOT_PREFIX}{ts}");
            let target = versioned.join(&name);
            let staging = versioned.join(format!("{STAGING_PREFIX}{name}"));
            if !target.exists() && !staging.exists() {
                break (staging, target);
            }
            ts += 1;
        };

        if let Err(err) = self.cow_copy(master, &staging) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(err);
        }
        if let Err(e) = std::fs::rename(&staging, &target) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(snapshot_io_err(&target, e));
        }
        tracing::info!(alias = %repo.alias, snapshot = %target.display(), "snapshot created");
        Ok(target)
    }

    fn promote(&self, alias: &RepoAlias, snapshot: &Path) -> Result<(), SnapshotError> {
        self.aliases.swap_alias(alias, snapshot).map(|_| ())
    }

    fn restore_master(&self, repo: &GoldenRepo) -> Result<PathBuf, SnapshotError> {
        let latest = self
            .latest_snapshot(&repo.alias)?
            .ok_or_else(|| SnapshotError::NoSnapshots {
                path: self.layout.versioned_dir(&repo.alias),
            })?;
        let master = repo.clone_path.clone();
        let parent = master.parent().unwrap_or(self.layout.root());
        std::fs::create_dir_all(parent).map_err(|e| snapshot_io_err(parent, e))?;

        // Copy beside the master, then rename: a half-copied tree never
        // appears at the master path.
        let name = master
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| repo.alias.base_name().to_string());
        let staging = parent.join(format!(".{name}.restoring"));
        let _ = std::fs::remove_dir_all(&staging);

        if let Err(err) = self.cow_copy(&latest.path, &staging) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(err);
        }
        if let Err(e) = std::fs::rename(&staging, &master) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(snapshot_io_err(&master, e));
        }
        tracing::info!(
            alias = %repo.alias,
            from = %latest.path.display(),
            master = %master.display(),
            "master restored from snapshot",
        );

        self.fix_config(&master)?;
        Ok(master)
    }

    fn list_snapshots(&self, alias: &RepoAlias) -> Result<Vec<Snapshot>, SnapshotError> {
        let dir = self.layout.versioned_dir(alias);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(snapshot_io_err(&dir, e)),
        };

        let mut snapshots: Vec<Snapshot> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| {
                let timestamp = parse_snapshot_name(&e.file_name().to_string_lossy())?;
                Some(Snapshot {
                    timestamp,
                    path: e.path(),
                })
            })
            .collect();
        snapshots.sort_by_key(|s| s.timestamp);
        Ok(snapshots)
    }

    fn current_target(&self, alias: &RepoAlias) -> Result<Option<PathBuf>, SnapshotError> {
        Ok(self.aliases.read_alias(alias)?.map(|p| p.target_path))
    }

    fn remove_alias(&self, alias: &RepoAlias) -> Result<bool, SnapshotError> {
        self.aliases.remove_alias(alias)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
