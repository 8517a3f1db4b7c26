//! Shared refresh pipeline entrypoint used by the CLI and the daemon.

use golden_core::RepoAlias;

use crate::error::OrchestratorError;
use crate::orchestrator::{RefreshOrchestrator, RefreshOutcome};

/// Scope for a refresh pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshScope {
    /// Refresh every registered repo that has a remote.
    All,
    /// Refresh a single alias.
    Repo(RepoAlias),
}

/// Per-repo result of a pipeline run.
#[derive(Debug)]
pub struct RepoRefresh {
    pub alias: RepoAlias,
    pub outcome: Result<RefreshOutcome, OrchestratorError>,
}

/// Run the refresh pipeline for a scope.
///
/// `All` visits each non-`local://` repo in alias order and keeps going past
/// individual failures; only failing to list the registry aborts the run.
/// `Repo` returns its single failure directly.
pub fn run(
    orchestrator: &RefreshOrchestrator,
    scope: RefreshScope,
    force_reset: bool,
) -> Result<Vec<RepoRefresh>, OrchestratorError> {
    match scope {
        RefreshScope::Repo(alias) => {
            let outcome = orchestrator.execute_refresh(&alias, force_reset)?;
            Ok(vec![RepoRefresh {
                alias,
                outcome: Ok(outcome),
            }])
        }
        RefreshScope::All => {
            let repos = orchestrator.metadata().list_repos()?;
            let results = repos
                .into_iter()
                .filter(|repo| !repo.is_local())
                .map(|repo| {
                    let outcome = orchestrator.execute_refresh(&repo.alias, force_reset);
                    if let Err(err) = &outcome {
                        tracing::error!(alias = %repo.alias, error = %err, "refresh failed");
                    }
                    RepoRefresh {
                        alias: repo.alias,
                        outcome,
                    }
                })
                .collect();
            Ok(results)
        }
    }
}
