//! Runtime configuration.
//!
//! Resolution order for the golden repos directory:
//! 1. explicit override (CLI `--root`)
//! 2. `GOLDEN_REPOS_DIR` environment variable
//! 3. `golden_repos_dir` in `<home>/.golden/config.toml`
//! 4. `<home>/.golden/golden-repos`
//!
//! A missing `config.toml` yields defaults for every other field.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, MetadataError};
use crate::layout::{GoldenLayout, DEFAULT_DESCRIPTIONS_DIR};

pub const ROOT_ENV_VAR: &str = "GOLDEN_REPOS_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenConfig {
    /// Root of the golden repos tree. Empty until resolved by [`load_at`].
    #[serde(default)]
    pub golden_repos_dir: PathBuf,
    #[serde(default = "default_lock_ttl_seconds")]
    pub lock_ttl_seconds: u64,
    #[serde(default = "default_git_timeout_secs")]
    pub git_timeout_secs: u64,
    #[serde(default = "default_copy_timeout_secs")]
    pub copy_timeout_secs: u64,
    #[serde(default = "default_index_timeout_secs")]
    pub index_timeout_secs: u64,
    /// Periodic refresh interval for the daemon; `0` disables the scheduler.
    #[serde(default)]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_snapshot_retention")]
    pub snapshot_retention: usize,
    #[serde(default = "default_registry_cache_ttl_secs")]
    pub registry_cache_ttl_secs: u64,
    #[serde(default = "default_descriptions_dir")]
    pub descriptions_dir: String,
    #[serde(default)]
    pub indexer: IndexerConfig,
}

/// External indexer invocation (`cidx index --fts`, `cidx fix-config --force`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    #[serde(default = "default_indexer_program")]
    pub program: String,
    /// Must never include a destructive clear flag.
    #[serde(default = "default_index_args")]
    pub index_args: Vec<String>,
    #[serde(default = "default_fix_config_args")]
    pub fix_config_args: Vec<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            program: default_indexer_program(),
            index_args: default_index_args(),
            fix_config_args: default_fix_config_args(),
        }
    }
}

impl Default for GoldenConfig {
    fn default() -> Self {
        Self {
            golden_repos_dir: PathBuf::new(),
            lock_ttl_seconds: default_lock_ttl_seconds(),
            git_timeout_secs: default_git_timeout_secs(),
            copy_timeout_secs: default_copy_timeout_secs(),
            index_timeout_secs: default_index_timeout_secs(),
            refresh_interval_secs: 0,
            snapshot_retention: default_snapshot_retention(),
            registry_cache_ttl_secs: default_registry_cache_ttl_secs(),
            descriptions_dir: default_descriptions_dir(),
            indexer: IndexerConfig::default(),
        }
    }
}

impl GoldenConfig {
    /// Defaults rooted at an explicit directory. Used by tests and embedders.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            golden_repos_dir: root.into(),
            ..Self::default()
        }
    }

    pub fn layout(&self) -> GoldenLayout {
        GoldenLayout::new(&self.golden_repos_dir).with_descriptions_dir(&self.descriptions_dir)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    pub fn copy_timeout(&self) -> Duration {
        Duration::from_secs(self.copy_timeout_secs)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index_timeout_secs)
    }

    pub fn registry_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.registry_cache_ttl_secs)
    }
}

/// `<home>/.golden/config.toml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".golden").join("config.toml")
}

/// Load configuration rooted at `home`, applying `root_override` and the
/// `GOLDEN_REPOS_DIR` environment variable.
pub fn load_at(home: &Path, root_override: Option<PathBuf>) -> Result<GoldenConfig, MetadataError> {
    let path = config_path_at(home);
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        toml::from_str::<GoldenConfig>(&contents)
            .map_err(|source| MetadataError::Config { path: path.clone(), source })?
    } else {
        GoldenConfig::default()
    };

    let env_root = std::env::var_os(ROOT_ENV_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    if let Some(root) = root_override.or(env_root) {
        config.golden_repos_dir = root;
    } else if config.golden_repos_dir.as_os_str().is_empty() {
        config.golden_repos_dir = home.join(".golden").join("golden-repos");
    }

    tracing::debug!(
        root = %config.golden_repos_dir.display(),
        config = %path.display(),
        "resolved golden config",
    );
    Ok(config)
}

/// `load_at` convenience wrapper: derives home from `dirs::home_dir()`.
pub fn load(root_override: Option<PathBuf>) -> Result<GoldenConfig, MetadataError> {
    let home = dirs::home_dir().ok_or(MetadataError::HomeNotFound)?;
    load_at(&home, root_override)
}

fn default_lock_ttl_seconds() -> u64 {
    3600
}

fn default_git_timeout_secs() -> u64 {
    300
}

fn default_copy_timeout_secs() -> u64 {
    1800
}

fn default_index_timeout_secs() -> u64 {
    3600
}

fn default_snapshot_retention() -> usize {
    3
}

fn default_registry_cache_ttl_secs() -> u64 {
    30
}

fn default_descriptions_dir() -> String {
    DEFAULT_DESCRIPTIONS_DIR.to_string()
}

fn default_indexer_program() -> String {
    "cidx".to_string()
}

fn default_index_args() -> Vec<String> {
    vec!["index".to_string(), "--fts".to_string()]
}

fn default_fix_config_args() -> Vec<String> {
    vec!["fix-config".to_string(), "--force".to_string()]
}
