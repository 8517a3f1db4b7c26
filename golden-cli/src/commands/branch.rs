//! `golden branch <alias> <branch>`

use anyhow::{Context, Result};
use clap::Args;

use golden_core::{GoldenConfig, RepoAlias};

use super::{orchestrator, print_json};

#[derive(Args, Debug)]
pub struct BranchArgs {
    pub alias: String,

    /// Remote branch to switch to.
    pub branch: String,

    /// Ask the running daemon to perform the switch.
    #[arg(long)]
    pub daemon: bool,
}

impl BranchArgs {
    pub fn run(self, config: &GoldenConfig) -> Result<()> {
        if self.daemon {
            let result =
                golden_daemon::request_change_branch(&config.golden_repos_dir, &self.alias, &self.branch)
                    .context("daemon refused the branch change")?;
            return print_json(&result);
        }

        let alias = RepoAlias::from(self.alias);
        let change = orchestrator(config)
            .change_branch(&alias, &self.branch)
            .with_context(|| format!("failed to switch '{alias}' to '{}'", self.branch))?;
        println!("✓ '{alias}' {change}");
        Ok(())
    }
}
