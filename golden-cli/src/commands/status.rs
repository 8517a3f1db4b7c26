//! `golden status`: what each alias serves and who is writing to it.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use golden_core::{GoldenConfig, GoldenRepo};
use golden_sync::RefreshOrchestrator;

use super::{orchestrator, print_json};

/// Arguments for `golden status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct RepoStatus {
    alias: String,
    repo_url: String,
    default_branch: String,
    local: bool,
    master_present: bool,
    snapshots: usize,
    target: Option<String>,
    lock_owner: Option<String>,
}

#[derive(Serialize)]
struct StatusReport {
    root: String,
    reconciled: bool,
    repos: Vec<RepoStatus>,
}

#[derive(Tabled)]
struct StatusRow {
    alias: String,
    branch: String,
    master: String,
    snapshots: usize,
    serving: String,
    lock: String,
}

impl StatusArgs {
    pub fn run(self, config: &GoldenConfig) -> Result<()> {
        let orchestrator = orchestrator(config);
        let repos = orchestrator
            .metadata()
            .list_repos()
            .context("failed to read the golden repo registry")?;

        let mut rows = Vec::new();
        for repo in &repos {
            rows.push(
                repo_status(&orchestrator, repo)
                    .with_context(|| format!("status check failed for '{}'", repo.alias))?,
            );
        }
        let report = StatusReport {
            root: config.golden_repos_dir.display().to_string(),
            reconciled: config.layout().reconciliation_marker().exists(),
            repos: rows,
        };

        if self.json {
            return print_json(&report);
        }
        print_table(report);
        Ok(())
    }
}

fn repo_status(orchestrator: &RefreshOrchestrator, repo: &GoldenRepo) -> Result<RepoStatus> {
    let snapshots = orchestrator.snapshots().list_snapshots(&repo.alias)?;
    let target = orchestrator.snapshots().current_target(&repo.alias)?;
    let lock = orchestrator.locks().get_lock_info(repo.alias.as_str())?;
    Ok(RepoStatus {
        alias: repo.alias.to_string(),
        repo_url: repo.repo_url.clone(),
        default_branch: repo.default_branch.clone(),
        local: repo.is_local(),
        master_present: repo.clone_path.is_dir(),
        snapshots: snapshots.len(),
        target: target.map(|p| p.display().to_string()),
        lock_owner: lock.map(|info| info.owner),
    })
}

fn print_table(report: StatusReport) {
    println!(
        "golden v{} | {} | {} repos{}",
        env!("CARGO_PKG_VERSION"),
        report.root,
        report.repos.len(),
        if report.reconciled { "" } else { " | not reconciled" },
    );
    if report.repos.is_empty() {
        println!("No golden repos registered.");
        return;
    }

    let rows: Vec<StatusRow> = report
        .repos
        .into_iter()
        .map(|repo| StatusRow {
            alias: if repo.local {
                format!("{} (local)", repo.alias)
            } else {
                repo.alias
            },
            branch: repo.default_branch,
            master: if repo.master_present {
                "present".green().to_string()
            } else {
                "MISSING".red().bold().to_string()
            },
            snapshots: repo.snapshots,
            serving: repo
                .target
                .as_deref()
                .and_then(|t| t.rsplit('/').next())
                .map(str::to_string)
                .unwrap_or_else(|| "-".bright_black().to_string()),
            lock: repo
                .lock_owner
                .map(|owner| owner.yellow().to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
