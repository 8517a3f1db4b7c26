pub mod branch;
pub mod daemon;
pub mod lock;
pub mod reconcile;
pub mod refresh;
pub mod repo;
pub mod status;

use anyhow::Result;
use golden_core::GoldenConfig;
use golden_sync::RefreshOrchestrator;

/// An orchestrator driving real git, copy, and indexer processes.
pub(crate) fn orchestrator(config: &GoldenConfig) -> RefreshOrchestrator {
    RefreshOrchestrator::from_config(config)
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    use anyhow::Context;
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON")?
    );
    Ok(())
}
