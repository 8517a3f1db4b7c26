//! Domain types for the golden repository registry.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! All types are serializable/deserializable via serde + serde_yaml.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MetadataError;

/// URL scheme marking a repo that has no remote. Such repos are never synced
/// or reconciled.
pub const LOCAL_SCHEME: &str = "local://";

/// Environment suffix carried by globally-published aliases (`my-repo-global`).
pub const GLOBAL_SUFFIX: &str = "-global";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed alias for a golden repo entry in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoAlias(pub String);

impl RepoAlias {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The alias with its environment suffix stripped.
    ///
    /// Versioned snapshot directories and description artifacts are keyed by
    /// this name, so `my-repo-global` and `my-repo` share `.versioned/my-repo/`.
    pub fn base_name(&self) -> &str {
        self.0.strip_suffix(GLOBAL_SUFFIX).unwrap_or(&self.0)
    }

    /// Aliases name files and directories, so they must be a single plain
    /// path component.
    pub fn validate(&self) -> Result<(), MetadataError> {
        let reason = if self.0.is_empty() {
            "alias is empty"
        } else if self.0.contains(['/', '\\']) {
            "alias contains a path separator"
        } else if self.0.starts_with('.') {
            "alias starts with '.'"
        } else if self.base_name().is_empty() {
            "alias has no name before the suffix"
        } else {
            return Ok(());
        };
        Err(MetadataError::InvalidAlias {
            alias: self.0.clone(),
            reason,
        })
    }
}

impl fmt::Display for RepoAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RepoAlias {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RepoAlias {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl AsRef<str> for RepoAlias {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A centrally-managed git clone served to search clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenRepo {
    pub alias: RepoAlias,
    /// Remote URL, or `local://<name>` for repos without a remote.
    pub repo_url: String,
    pub default_branch: String,
    /// Absolute path to the master working tree.
    pub clone_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl GoldenRepo {
    /// True for `local://` repos, which are excluded from sync and reconciliation.
    pub fn is_local(&self) -> bool {
        self.repo_url.starts_with(LOCAL_SCHEME)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
