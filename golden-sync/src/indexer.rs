//! The external indexer run against a master clone before it is snapshotted.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use golden_core::IndexerConfig;

use crate::command::{CommandRunner, CommandSpec};
use crate::error::IndexError;

pub trait Indexer: Send + Sync {
    /// Incrementally (re)index the tree at `repo_path`.
    fn index(&self, repo_path: &Path) -> Result<(), IndexError>;
}

/// Runs `<program> <index_args>` (by default `cidx index --fts`) with the
/// clone as working directory. The arguments never include a clear flag:
/// stale vectors are purged downstream, not by wiping the store here.
#[derive(Clone)]
pub struct CidxIndexer {
    runner: Arc<dyn CommandRunner>,
    config: IndexerConfig,
    timeout: Duration,
}

impl CidxIndexer {
    pub fn new(runner: Arc<dyn CommandRunner>, config: IndexerConfig, timeout: Duration) -> Self {
        Self {
            runner,
            config,
            timeout,
        }
    }
}

impl Indexer for CidxIndexer {
    fn index(&self, repo_path: &Path) -> Result<(), IndexError> {
        let spec = CommandSpec::new(
            self.config.program.clone(),
            self.config.index_args.clone(),
            self.timeout,
        )
        .current_dir(repo_path);
        tracing::info!(repo = %repo_path.display(), command = %spec.display(), "indexing");
        let output = self.runner.run(&spec)?;
        if !output.success() {
            return Err(IndexError::Failed {
                command: spec.display(),
                repo: repo_path.to_path_buf(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}
