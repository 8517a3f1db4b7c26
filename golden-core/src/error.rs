//! Error types for golden-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from registry, tracking, and config operations.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Underlying I/O failure, annotated with the path being touched.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse registry entry at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Tracking record JSON error.
    #[error("tracking JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed `config.toml`.
    #[error("failed to parse config at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// No registry entry for the alias.
    #[error("golden repo '{alias}' is not registered")]
    RepoNotFound { alias: String },

    /// Alias is empty or would escape its directory.
    #[error("invalid alias '{alias}': {reason}")]
    InvalidAlias { alias: String, reason: &'static str },

    /// Registration attempted for an alias that already exists.
    #[error("golden repo '{alias}' is already registered")]
    DuplicateAlias { alias: String },

    /// Another registered alias already owns the same master clone and
    /// `.versioned/` directory (`x` vs `x-global`).
    #[error("golden repo '{alias}' shares base name '{base_name}' with registered repo '{existing}'")]
    BaseNameConflict {
        alias: String,
        existing: String,
        base_name: String,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or GOLDEN_REPOS_DIR")]
    HomeNotFound,
}

/// Convenience constructor for [`MetadataError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> MetadataError {
    MetadataError::Io {
        path: path.into(),
        source,
    }
}
