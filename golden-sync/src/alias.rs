//! Alias pointers: the single record readers resolve to find the current
//! snapshot of a golden repo.
//!
//! ## `swap_alias`: write protocol
//!
//! 1. Serialize `{alias, target_path, updated_at}`.
//! 2. Write to `aliases/<alias>.json.tmp` (same directory → same filesystem).
//! 3. Rename over `aliases/<alias>.json` (atomic on POSIX).
//!
//! A reader therefore sees either the previous pointer or the new one. If the
//! rename fails the tmp file is removed and the previous pointer survives.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use golden_core::{GoldenLayout, RepoAlias};

use crate::error::{snapshot_io_err, SnapshotError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasPointer {
    pub alias: RepoAlias,
    pub target_path: PathBuf,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AliasManager {
    layout: GoldenLayout,
}

impl AliasManager {
    pub fn new(layout: GoldenLayout) -> Self {
        Self { layout }
    }

    pub fn pointer_path(&self, alias: &RepoAlias) -> PathBuf {
        self.layout.alias_pointer_path(alias)
    }

    /// `None` when the alias has never been promoted.
    pub fn read_alias(&self, alias: &RepoAlias) -> Result<Option<AliasPointer>, SnapshotError> {
        let path = self.pointer_path(alias);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(snapshot_io_err(&path, e)),
        }
    }

    /// Atomically point `alias` at `target`.
    pub fn swap_alias(&self, alias: &RepoAlias, target: &Path) -> Result<AliasPointer, SnapshotError> {
        let path = self.pointer_path(alias);
        let tmp = path.with_file_name(format!("{}.json.tmp", alias.as_str()));
        let pointer = AliasPointer {
            alias: alias.clone(),
            target_path: target.to_path_buf(),
            updated_at: Utc::now(),
        };
        write_atomic(&path, &tmp, &serde_json::to_string_pretty(&pointer)?)?;
        tracing::info!(alias = %alias, target = %target.display(), "alias swapped");
        Ok(pointer)
    }

    /// Delete the pointer. Returns `false` if there was none.
    pub fn remove_alias(&self, alias: &RepoAlias) -> Result<bool, SnapshotError> {
        let path = self.pointer_path(alias);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(snapshot_io_err(&path, e)),
        }
    }
}

fn write_atomic(path: &Path, tmp: &Path, contents: &str) -> Result<(), SnapshotError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| snapshot_io_err(parent, e))?;
    }
    std::fs::write(tmp, contents).map_err(|e| snapshot_io_err(tmp, e))?;
    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(snapshot_io_err(path, e));
    }
    Ok(())
}
