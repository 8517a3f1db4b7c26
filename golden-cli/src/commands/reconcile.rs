//! `golden reconcile`: one-shot restoration of missing master clones.

use anyhow::Result;
use clap::Args;

use golden_core::GoldenConfig;

use super::{orchestrator, print_json};

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Emit the report as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ReconcileArgs {
    pub fn run(self, config: &GoldenConfig) -> Result<()> {
        // Description generation belongs to the daemon; none is queued here.
        let report = orchestrator(config).reconcile_golden_repos(None);
        if self.json {
            return print_json(&report);
        }

        if report.already_complete {
            println!(
                "Reconciliation already complete (remove {} to run it again).",
                config.layout().reconciliation_marker().display()
            );
            return Ok(());
        }
        for alias in &report.restored {
            println!("✓ restored '{alias}'");
        }
        for alias in &report.orphaned {
            println!("! '{alias}' has no master and no snapshot");
        }
        for failure in &report.config_fix_failed {
            println!("! '{}' restored but config fix failed: {}", failure.alias, failure.error);
        }
        for failure in &report.failed {
            println!("✗ '{}': {}", failure.alias, failure.error);
        }
        if let Some(reason) = &report.aborted {
            println!("✗ aborted: {reason}");
        }
        println!(
            "{} restored, {} orphaned, {} failed",
            report.restored.len(),
            report.orphaned.len(),
            report.failed.len()
        );
        Ok(())
    }
}
