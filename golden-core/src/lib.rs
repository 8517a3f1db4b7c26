//! golden-core: domain types, registry persistence, configuration, errors.
//!
//! - [`types`]: newtypes and domain structs
//! - [`error`]: [`MetadataError`]
//! - [`config`]: [`GoldenConfig`] loading
//! - [`layout`]: on-disk paths under the golden repos root
//! - [`registry`]: per-repo YAML entries
//! - [`tracking`]: analysis tracking records
//! - [`metadata`]: the [`MetadataStore`] seam and its file-backed impl

pub mod config;
pub mod error;
pub mod layout;
pub mod metadata;
pub mod registry;
pub mod tracking;
pub mod types;

pub use config::{GoldenConfig, IndexerConfig};
pub use error::MetadataError;
pub use layout::GoldenLayout;
pub use metadata::{FileMetadataStore, MetadataStore};
pub use types::{GoldenRepo, RepoAlias, GLOBAL_SUFFIX, LOCAL_SCHEME};
