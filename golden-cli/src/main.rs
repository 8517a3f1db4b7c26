//! golden: manage centrally-served golden repositories.
//!
//! # Usage
//!
//! ```text
//! golden repo add <alias> <url> [--branch main]
//! golden repo list
//! golden repo remove <alias>
//! golden refresh <alias> [--force-reset] [--daemon]
//! golden refresh --all [--force-reset] [--daemon]
//! golden branch <alias> <branch> [--daemon]
//! golden reconcile [--json]
//! golden lock status [<alias>]
//! golden lock release <alias> [--force]
//! golden status [--json]
//! golden daemon start|stop|status|job <id>
//! ```
//!
//! Every command accepts `--root <dir>` to override the golden repos directory.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    branch::BranchArgs, daemon::DaemonCommand, lock::LockCommand, reconcile::ReconcileArgs,
    refresh::RefreshArgs, repo::RepoCommand, status::StatusArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "golden",
    version,
    about = "Keep golden repositories synced, indexed, and atomically published",
    long_about = None,
)]
struct Cli {
    /// Golden repos directory (overrides GOLDEN_REPOS_DIR and config.toml).
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register, list, and remove golden repos.
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },

    /// Sync, index, snapshot, and promote golden repos.
    Refresh(RefreshArgs),

    /// Switch a golden repo to another remote branch.
    Branch(BranchArgs),

    /// Restore missing master clones from their latest snapshot.
    Reconcile(ReconcileArgs),

    /// Inspect or clear per-repo write locks.
    Lock {
        #[command(subcommand)]
        command: LockCommand,
    },

    /// Show every golden repo with its published snapshot and lock state.
    Status(StatusArgs),

    /// Run or talk to the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    // The daemon installs its own subscriber before serving.
    if !matches!(
        cli.command,
        Commands::Daemon {
            command: DaemonCommand::Start
        }
    ) {
        golden_daemon::init_tracing();
    }

    let config = golden_core::config::load(cli.root).context("failed to load configuration")?;
    match cli.command {
        Commands::Repo { command } => commands::repo::run(&config, command),
        Commands::Refresh(args) => args.run(&config),
        Commands::Branch(args) => args.run(&config),
        Commands::Reconcile(args) => args.run(&config),
        Commands::Lock { command } => commands::lock::run(&config, command),
        Commands::Status(args) => args.run(&config),
        Commands::Daemon { command } => commands::daemon::run(config, command),
    }
}
