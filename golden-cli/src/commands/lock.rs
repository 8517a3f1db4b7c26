//! `golden lock status|release`

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tabled::{settings::Style, Table, Tabled};

use golden_core::{registry, GoldenConfig};
use golden_sync::{LockInfo, WriteLockManager};

#[derive(Subcommand, Debug)]
pub enum LockCommand {
    /// Show live write locks. Stale locks are cleared while checking.
    Status {
        /// Only this alias.
        alias: Option<String>,
    },

    /// Clear the write lock on an alias.
    Release {
        alias: String,

        /// Release even when the holder is still alive.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Tabled)]
struct LockRow {
    alias: String,
    owner: String,
    pid: String,
    acquired: String,
    expires: String,
}

pub fn run(config: &GoldenConfig, command: LockCommand) -> Result<()> {
    let locks = WriteLockManager::new(config.layout().locks_dir());
    match command {
        LockCommand::Status { alias } => status(config, &locks, alias),
        LockCommand::Release { alias, force } => release(&locks, &alias, force),
    }
}

fn status(config: &GoldenConfig, locks: &WriteLockManager, alias: Option<String>) -> Result<()> {
    let aliases: Vec<String> = match alias {
        Some(alias) => vec![alias],
        None => registry::list_repos_at(&config.golden_repos_dir)
            .context("failed to read the golden repo registry")?
            .into_iter()
            .map(|repo| repo.alias.0)
            .collect(),
    };

    let mut rows = Vec::new();
    for alias in aliases {
        let info = locks
            .get_lock_info(&alias)
            .with_context(|| format!("failed to read write lock for '{alias}'"))?;
        if let Some(info) = info {
            rows.push(lock_row(alias, &info));
        }
    }

    if rows.is_empty() {
        println!("No live write locks.");
        return Ok(());
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn release(locks: &WriteLockManager, alias: &str, force: bool) -> Result<()> {
    let Some(info) = locks
        .get_lock_info(alias)
        .with_context(|| format!("failed to read write lock for '{alias}'"))?
    else {
        println!("'{alias}' is not locked.");
        return Ok(());
    };

    if !force {
        bail!(
            "'{alias}' is held by '{}' (pid {}); pass --force to release it anyway",
            info.owner,
            display_pid(&info)
        );
    }
    if !locks
        .release(alias, &info.owner)
        .with_context(|| format!("failed to release write lock for '{alias}'"))?
    {
        bail!("'{alias}' changed hands while releasing; check `golden lock status`");
    }
    println!("✓ Released '{alias}' (was held by '{}')", info.owner);
    Ok(())
}

fn lock_row(alias: String, info: &LockInfo) -> LockRow {
    LockRow {
        alias,
        owner: info.owner.clone(),
        pid: display_pid(info),
        acquired: info
            .acquired_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string()),
        expires: info
            .expires_at()
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string()),
    }
}

fn display_pid(info: &LockInfo) -> String {
    info.pid
        .map(|pid| pid.to_string())
        .unwrap_or_else(|| "?".to_string())
}
