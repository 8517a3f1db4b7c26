//! `golden refresh`: sync, index, snapshot, and promote.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use golden_core::{GoldenConfig, RepoAlias};
use golden_sync::pipeline::{self, RefreshScope};

use super::{orchestrator, print_json};

/// Arguments for `golden refresh`.
#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Alias to refresh (omit when using `--all`).
    pub alias: Option<String>,

    /// Refresh every registered repo that has a remote.
    #[arg(long, conflicts_with = "alias")]
    pub all: bool,

    /// Discard local history: fetch and hard-reset to the remote branch.
    #[arg(long)]
    pub force_reset: bool,

    /// Submit to the running daemon instead of refreshing in this process.
    #[arg(long)]
    pub daemon: bool,
}

impl RefreshArgs {
    pub fn run(self, config: &GoldenConfig) -> Result<()> {
        if !self.all && self.alias.is_none() {
            bail!("provide an alias or use --all");
        }

        if self.daemon {
            let submitted = golden_daemon::request_refresh(
                &config.golden_repos_dir,
                self.alias.as_deref(),
                self.force_reset,
            )
            .context("daemon refused the refresh")?;
            return print_json(&submitted);
        }

        let scope = match self.alias {
            Some(alias) => RefreshScope::Repo(RepoAlias::from(alias)),
            None => RefreshScope::All,
        };
        let label = match &scope {
            RefreshScope::All => "all".to_string(),
            RefreshScope::Repo(alias) => alias.to_string(),
        };

        let orchestrator = orchestrator(config);
        let results = pipeline::run(&orchestrator, scope, self.force_reset)
            .with_context(|| format!("refresh failed for '{label}'"))?;
        if results.is_empty() {
            println!("No remote golden repos registered.");
            return Ok(());
        }

        let mut failed = 0usize;
        for result in &results {
            match &result.outcome {
                Ok(outcome) => println!("{} '{}' {outcome}", "✓".green(), result.alias),
                Err(err) => {
                    failed += 1;
                    println!("{} '{}' {err}", "✗".red(), result.alias);
                }
            }
        }
        if failed > 0 {
            bail!("{failed} of {} refreshes failed", results.len());
        }
        Ok(())
    }
}
