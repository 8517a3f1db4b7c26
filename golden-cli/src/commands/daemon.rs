//! `golden daemon`: foreground runtime and socket client.

use anyhow::{Context, Result};
use clap::Subcommand;

use golden_core::GoldenConfig;
use golden_daemon::paths::socket_path;
use golden_daemon::{request_job, request_status, request_stop, start_blocking, DaemonError};

use super::print_json;

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (reconcile, schedule, serve).
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
    /// Show the state of a background job.
    Job {
        id: String,
    },
}

pub fn run(config: GoldenConfig, command: DaemonCommand) -> Result<()> {
    let root = config.golden_repos_dir.clone();

    match command {
        DaemonCommand::Start => {
            start_blocking(config).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&root) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&root) {
            Ok(status) => print_json(&status)?,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                print_json(&serde_json::json!({
                    "running": false,
                    "socket": socket_path(&root).display().to_string(),
                }))?;
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Job { id } => {
            let record = request_job(&root, &id)
                .with_context(|| format!("failed to look up job '{id}'"))?;
            print_json(&record)?;
        }
    }

    Ok(())
}
