//! The metadata store consumed by the orchestrator.
//!
//! [`MetadataStore`] is the seam; [`FileMetadataStore`] backs it with the YAML
//! registry and JSON tracking records under the golden repos root.

use std::path::{Path, PathBuf};

use crate::error::MetadataError;
use crate::registry;
use crate::tracking::{self, TrackingKind};
use crate::types::{GoldenRepo, RepoAlias};

pub trait MetadataStore: Send + Sync {
    fn get_repo(&self, alias: &RepoAlias) -> Result<Option<GoldenRepo>, MetadataError>;

    fn list_repos(&self) -> Result<Vec<GoldenRepo>, MetadataError>;

    fn save_repo(&self, repo: &GoldenRepo) -> Result<(), MetadataError>;

    fn remove_repo(&self, alias: &RepoAlias) -> Result<bool, MetadataError>;

    fn update_default_branch(&self, alias: &RepoAlias, branch: &str) -> Result<(), MetadataError>;

    fn invalidate_description_refresh_tracking(&self, alias: &RepoAlias) -> Result<(), MetadataError>;

    fn invalidate_dependency_map_tracking(&self, alias: &RepoAlias) -> Result<(), MetadataError>;
}

/// Filesystem-backed store rooted at a golden repos directory.
#[derive(Debug, Clone)]
pub struct FileMetadataStore {
    root: PathBuf,
}

impl FileMetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl MetadataStore for FileMetadataStore {
    fn get_repo(&self, alias: &RepoAlias) -> Result<Option<GoldenRepo>, MetadataError> {
        match registry::load_repo_at(&self.root, alias) {
            Ok(repo) => Ok(Some(repo)),
            Err(MetadataError::RepoNotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn list_repos(&self) -> Result<Vec<GoldenRepo>, MetadataError> {
        registry::list_repos_at(&self.root)
    }

    fn save_repo(&self, repo: &GoldenRepo) -> Result<(), MetadataError> {
        registry::save_repo_at(&self.root, repo)
    }

    fn remove_repo(&self, alias: &RepoAlias) -> Result<bool, MetadataError> {
        let removed = registry::remove_repo_at(&self.root, alias)?;
        tracking::invalidate_at(&self.root, TrackingKind::DescriptionRefresh, alias)?;
        tracking::invalidate_at(&self.root, TrackingKind::DependencyMap, alias)?;
        Ok(removed)
    }

    fn update_default_branch(&self, alias: &RepoAlias, branch: &str) -> Result<(), MetadataError> {
        registry::update_default_branch_at(&self.root, alias, branch).map(|_| ())
    }

    fn invalidate_description_refresh_tracking(&self, alias: &RepoAlias) -> Result<(), MetadataError> {
        tracking::invalidate_at(&self.root, TrackingKind::DescriptionRefresh, alias).map(|_| ())
    }

    fn invalidate_dependency_map_tracking(&self, alias: &RepoAlias) -> Result<(), MetadataError> {
        tracking::invalidate_at(&self.root, TrackingKind::DependencyMap, alias).map(|_| ())
    }
}
