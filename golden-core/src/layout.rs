//! On-disk layout of a golden repos directory.
//!
//! ```text
//! <golden_repos_dir>/
//!   <alias>/                          master clone
//!   .versioned/<alias>/v_<unix_ts>/   immutable snapshots
//!   .locks/<alias>.lock               write locks (JSON)
//!   aliases/<alias>.json              alias pointers
//!   .registry/<alias>.yaml            registry entries (mode 0600)
//!   .tracking/<kind>/<alias>.json     analysis tracking records
//!   cidx-meta/<alias>.md              description artifacts
//!   .run/daemon.sock                  daemon control socket
//!   .reconciliation_complete_v1       startup reconciliation marker
//! ```
//!
//! Versioned directories and description artifacts use the alias with the
//! `-global` suffix stripped (see [`RepoAlias::base_name`]).

use std::path::{Path, PathBuf};

use crate::types::RepoAlias;

pub const LOCKS_DIR: &str = ".locks";
pub const VERSIONED_DIR: &str = ".versioned";
pub const ALIASES_DIR: &str = "aliases";
pub const REGISTRY_DIR: &str = ".registry";
pub const TRACKING_DIR: &str = ".tracking";
pub const RUN_DIR: &str = ".run";
pub const DEFAULT_DESCRIPTIONS_DIR: &str = "cidx-meta";
pub const RECONCILIATION_MARKER: &str = ".reconciliation_complete_v1";

/// Path resolver rooted at a golden repos directory. Pure; performs no I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoldenLayout {
    root: PathBuf,
    descriptions_dir: String,
}

impl GoldenLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            descriptions_dir: DEFAULT_DESCRIPTIONS_DIR.to_string(),
        }
    }

    pub fn with_descriptions_dir(mut self, dir: impl Into<String>) -> Self {
        self.descriptions_dir = dir.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Default master clone location for a newly registered alias.
    pub fn default_master_path(&self, alias: &RepoAlias) -> PathBuf {
        self.root.join(alias.base_name())
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join(LOCKS_DIR)
    }

    pub fn lock_path(&self, alias: &str) -> PathBuf {
        self.locks_dir().join(format!("{alias}.lock"))
    }

    pub fn versioned_root(&self) -> PathBuf {
        self.root.join(VERSIONED_DIR)
    }

    /// `.versioned/<base_name>/`
    pub fn versioned_dir(&self, alias: &RepoAlias) -> PathBuf {
        self.versioned_root().join(alias.base_name())
    }

    pub fn aliases_dir(&self) -> PathBuf {
        self.root.join(ALIASES_DIR)
    }

    pub fn alias_pointer_path(&self, alias: &RepoAlias) -> PathBuf {
        self.aliases_dir().join(format!("{}.json", alias.0))
    }

    pub fn registry_dir(&self) -> PathBuf {
        self.root.join(REGISTRY_DIR)
    }

    pub fn registry_path(&self, alias: &RepoAlias) -> PathBuf {
        self.registry_dir().join(format!("{}.yaml", alias.0))
    }

    pub fn tracking_dir(&self, kind: &str) -> PathBuf {
        self.root.join(TRACKING_DIR).join(kind)
    }

    pub fn descriptions_dir(&self) -> PathBuf {
        self.root.join(&self.descriptions_dir)
    }

    /// `cidx-meta/<base_name>.md`
    pub fn description_path(&self, alias: &RepoAlias) -> PathBuf {
        self.descriptions_dir()
            .join(format!("{}.md", alias.base_name()))
    }

    pub fn run_dir(&self) -> PathBuf {
        self.root.join(RUN_DIR)
    }

    pub fn reconciliation_marker(&self) -> PathBuf {
        self.root.join(RECONCILIATION_MARKER)
    }
}
