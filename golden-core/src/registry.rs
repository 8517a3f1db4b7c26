//! Per-repo YAML registry.
//!
//! # Storage layout
//!
//! ```text
//! <golden_repos_dir>/
//!   .registry/              (mode 0700, created on first save)
//!     <alias>.yaml          (one file per golden repo: mode 0600)
//! ```
//!
//! Every function takes the golden repos root explicitly; callers resolve it
//! through [`crate::config`].

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{io_err, MetadataError};
use crate::layout::GoldenLayout;
use crate::types::{GoldenRepo, RepoAlias};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<root>/.registry/`: creates the directory (mode `0700`) if absent.
pub fn registry_dir_at(root: &Path) -> Result<PathBuf, MetadataError> {
    let dir = GoldenLayout::new(root).registry_dir();
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// `<root>/.registry/<alias>.yaml`: pure, no I/O.
pub fn repo_path_at(root: &Path, alias: &RepoAlias) -> PathBuf {
    GoldenLayout::new(root).registry_path(alias)
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load a single golden repo entry.
///
/// Returns `MetadataError::RepoNotFound` if absent,
/// `MetadataError::Parse` (with path + line context) if malformed YAML.
pub fn load_repo_at(root: &Path, alias: &RepoAlias) -> Result<GoldenRepo, MetadataError> {
    let path = repo_path_at(root, alias);
    if !path.exists() {
        return Err(MetadataError::RepoNotFound {
            alias: alias.0.clone(),
        });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| MetadataError::Parse { path, source: e })
}

/// Walk `<root>/.registry/*.yaml` and return every registered repo sorted by alias.
///
/// A malformed entry fails the whole listing; the error carries its path.
pub fn list_repos_at(root: &Path) -> Result<Vec<GoldenRepo>, MetadataError> {
    let dir = GoldenLayout::new(root).registry_dir();
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut entries: Vec<_> = std::fs::read_dir(&dir)
        .map_err(|e| io_err(&dir, e))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut repos = Vec::new();
    for entry in entries {
        let fname = entry.file_name();
        if !fname.to_string_lossy().ends_with(".yaml") {
            continue;
        }
        let path = entry.path();
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let repo: GoldenRepo = serde_yaml::from_str(&contents)
            .map_err(|e| MetadataError::Parse { path: path.clone(), source: e })?;
        repos.push(repo);
    }
    repos.sort_by(|a, b| a.alias.cmp(&b.alias));
    Ok(repos)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save a golden repo entry.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
/// `.tmp` is always in the same directory as the target (same filesystem: no EXDEV).
pub fn save_repo_at(root: &Path, repo: &GoldenRepo) -> Result<(), MetadataError> {
    registry_dir_at(root)?;
    let path = repo_path_at(root, &repo.alias);
    let tmp_path = path.with_file_name(format!("{}.yaml.tmp", repo.alias.0));

    let yaml = serde_yaml::to_string(repo)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    if let Err(e) = std::fs::rename(&tmp_path, &path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(&path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 4. Register / remove
// ---------------------------------------------------------------------------

/// Register a new golden repo. `clone_path` defaults to `<root>/<base_name>`.
///
/// Unlike a plain save this refuses to overwrite an existing alias, or to
/// add one whose master clone or `.versioned/` directory another alias owns.
pub fn register_at(
    root: &Path,
    alias: RepoAlias,
    repo_url: impl Into<String>,
    default_branch: impl Into<String>,
    clone_path: Option<PathBuf>,
) -> Result<GoldenRepo, MetadataError> {
    alias.validate()?;
    if repo_path_at(root, &alias).exists() {
        return Err(MetadataError::DuplicateAlias { alias: alias.0 });
    }

    let clone_path = clone_path.unwrap_or_else(|| GoldenLayout::new(root).default_master_path(&alias));
    if let Some(existing) = list_repos_at(root)?
        .into_iter()
        .find(|r| r.alias.base_name() == alias.base_name() || r.clone_path == clone_path)
    {
        return Err(MetadataError::BaseNameConflict {
            base_name: alias.base_name().to_string(),
            alias: alias.0,
            existing: existing.alias.0,
        });
    }

    let repo = GoldenRepo {
        alias,
        repo_url: repo_url.into(),
        default_branch: default_branch.into(),
        clone_path,
        created_at: Utc::now(),
    };
    save_repo_at(root, &repo)?;
    tracing::info!(alias = %repo.alias, url = %repo.repo_url, "registered golden repo");
    Ok(repo)
}

/// Delete a registry entry. Returns `false` if it did not exist.
pub fn remove_repo_at(root: &Path, alias: &RepoAlias) -> Result<bool, MetadataError> {
    let path = repo_path_at(root, alias);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(&path, e)),
    }
}

/// Persist a new default branch; every other field is left untouched.
pub fn update_default_branch_at(
    root: &Path,
    alias: &RepoAlias,
    branch: &str,
) -> Result<GoldenRepo, MetadataError> {
    let mut repo = load_repo_at(root, alias)?;
    repo.default_branch = branch.to_string();
    save_repo_at(root, &repo)?;
    Ok(repo)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), MetadataError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), MetadataError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), MetadataError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), MetadataError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
