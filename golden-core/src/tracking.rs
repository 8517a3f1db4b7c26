//! Analysis tracking records.
//!
//! Description refreshes and dependency-map builds remember which commit and
//! branch they last analysed, at
//! `<root>/.tracking/<kind>/<alias>.json`. A branch change makes those
//! analyses meaningless, so invalidation simply deletes the record; the next
//! consumer sees "never analysed" and starts over.
//!
//! Writes use the same atomic `.tmp` + rename pattern as the registry.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, MetadataError};
use crate::layout::GoldenLayout;
use crate::types::RepoAlias;

/// Which analysis a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingKind {
    DescriptionRefresh,
    DependencyMap,
}

impl TrackingKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            TrackingKind::DescriptionRefresh => "description_refresh",
            TrackingKind::DependencyMap => "dependency_map",
        }
    }
}

/// On-disk tracking payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingRecord {
    #[serde(default)]
    pub last_commit: Option<String>,
    #[serde(default)]
    pub last_branch: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// `<root>/.tracking/<kind>/<alias>.json`
pub fn record_path_at(root: &Path, kind: TrackingKind, alias: &RepoAlias) -> PathBuf {
    GoldenLayout::new(root)
        .tracking_dir(kind.dir_name())
        .join(format!("{}.json", alias.0))
}

/// Load a tracking record; `None` if it was never written or was invalidated.
pub fn load_at(
    root: &Path,
    kind: TrackingKind,
    alias: &RepoAlias,
) -> Result<Option<TrackingRecord>, MetadataError> {
    let path = record_path_at(root, kind, alias);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Save a tracking record atomically.
pub fn record_at(
    root: &Path,
    kind: TrackingKind,
    alias: &RepoAlias,
    record: &TrackingRecord,
) -> Result<(), MetadataError> {
    let path = record_path_at(root, kind, alias);
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid tracking record path"),
        ));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(record)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Drop the record for `alias`. Returns `true` if something was deleted.
pub fn invalidate_at(
    root: &Path,
    kind: TrackingKind,
    alias: &RepoAlias,
) -> Result<bool, MetadataError> {
    let path = record_path_at(root, kind, alias);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            tracing::debug!(alias = %alias, kind = kind.dir_name(), "invalidated tracking record");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(&path, e)),
    }
}
