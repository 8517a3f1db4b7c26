//! `golden repo add|list|remove`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use golden_core::{GoldenConfig, RepoAlias};

use super::orchestrator;

#[derive(Subcommand, Debug)]
pub enum RepoCommand {
    /// Clone a repo (or create a `local://` one), publish its first snapshot,
    /// and register it.
    Add(AddArgs),

    /// List registered golden repos.
    List,

    /// Unregister a golden repo and delete its master clone.
    Remove {
        alias: String,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Alias readers resolve, e.g. "payments" or "payments-global".
    pub alias: String,

    /// Remote URL, or `local://<name>` for a repo without a remote.
    pub url: String,

    /// Branch to clone and track.
    #[arg(long, short = 'b', default_value = "main")]
    pub branch: String,
}

#[derive(Tabled)]
struct RepoRow {
    alias: String,
    branch: String,
    url: String,
    master: String,
}

pub fn run(config: &GoldenConfig, command: RepoCommand) -> Result<()> {
    match command {
        RepoCommand::Add(args) => add(config, args),
        RepoCommand::List => list(config),
        RepoCommand::Remove { alias } => remove(config, alias),
    }
}

fn add(config: &GoldenConfig, args: AddArgs) -> Result<()> {
    let alias = RepoAlias::from(args.alias);
    let repo = orchestrator(config)
        .add_golden_repo(&alias, &args.url, &args.branch)
        .with_context(|| format!("failed to add golden repo '{alias}'"))?;
    println!(
        "✓ Added '{}' ({} @ {}) at {}",
        repo.alias,
        repo.repo_url,
        repo.default_branch,
        repo.clone_path.display()
    );
    Ok(())
}

fn list(config: &GoldenConfig) -> Result<()> {
    let repos = golden_core::registry::list_repos_at(&config.golden_repos_dir)
        .context("failed to read the golden repo registry")?;
    if repos.is_empty() {
        println!("No golden repos registered.");
        println!("Run: golden repo add <alias> <url>");
        return Ok(());
    }

    let rows: Vec<RepoRow> = repos
        .into_iter()
        .map(|repo| RepoRow {
            alias: repo.alias.0,
            branch: repo.default_branch,
            url: repo.repo_url,
            master: repo.clone_path.display().to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn remove(config: &GoldenConfig, alias: String) -> Result<()> {
    let alias = RepoAlias::from(alias);
    orchestrator(config)
        .remove_golden_repo(&alias)
        .with_context(|| format!("failed to remove golden repo '{alias}'"))?;
    println!("✓ Removed '{alias}'");
    Ok(())
}
