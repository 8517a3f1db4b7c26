use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, RwLock};

use golden_core::{GoldenConfig, GoldenRepo, RepoAlias};
use golden_sync::{OrchestratorError, ReconcileReport, RefreshOrchestrator, WorkItem, WorkQueue};

use crate::cache::RegistryCache;
use crate::error::{io_err, DaemonError};
use crate::jobs::TokioJobSubmitter;
use crate::paths::{run_dir, socket_path};
use crate::protocol::{DaemonRequest, DaemonResponse};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything a request handler needs, shared behind one `Arc`.
pub struct DaemonState {
    root: PathBuf,
    orchestrator: Arc<RefreshOrchestrator>,
    jobs: TokioJobSubmitter,
    cache: RegistryCache,
    started_at: DateTime<Utc>,
    reconciliation: ReconcileReport,
    pending_descriptions: Arc<RwLock<Vec<RepoAlias>>>,
}

impl DaemonState {
    /// Wire `orchestrator` to a job submitter on `handle` and a registry
    /// cache with the configured TTL.
    pub fn new(config: &GoldenConfig, orchestrator: RefreshOrchestrator, handle: Handle) -> Self {
        let jobs = TokioJobSubmitter::new(handle);
        let orchestrator = Arc::new(orchestrator.with_job_submitter(Arc::new(jobs.clone())));
        let cache = RegistryCache::new(
            Arc::clone(orchestrator.metadata()),
            config.registry_cache_ttl(),
        );
        Self {
            root: config.golden_repos_dir.clone(),
            orchestrator,
            jobs,
            cache,
            started_at: Utc::now(),
            reconciliation: ReconcileReport::default(),
            pending_descriptions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn orchestrator(&self) -> &Arc<RefreshOrchestrator> {
        &self.orchestrator
    }

    pub fn jobs(&self) -> &TokioJobSubmitter {
        &self.jobs
    }

    /// Repos still waiting for a description. Entries are dropped once their
    /// artifact shows up under the descriptions dir.
    pub async fn pending_descriptions(&self) -> Vec<RepoAlias> {
        let layout = self.orchestrator.layout();
        let mut pending = self.pending_descriptions.write().await;
        pending.retain(|alias| {
            let written = layout.description_path(alias).exists();
            if written {
                tracing::debug!(alias = %alias, "description written; no longer pending");
            }
            !written
        });
        pending.clone()
    }

    /// Run startup reconciliation on the blocking pool. Repos lacking a
    /// description are handed to `queue`.
    pub async fn reconcile(&mut self, queue: ChannelWorkQueue) -> Result<(), DaemonError> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let report = blocking(move || orchestrator.reconcile_golden_repos(Some(&queue))).await?;
        tracing::info!(
            already_complete = report.already_complete,
            restored = report.restored.len(),
            orphaned = report.orphaned.len(),
            failed = report.failed.len(),
            "startup reconciliation finished",
        );
        self.reconciliation = report;
        Ok(())
    }
}

/// [`WorkQueue`] backed by an unbounded channel drained by the daemon.
#[derive(Clone)]
pub struct ChannelWorkQueue {
    tx: mpsc::UnboundedSender<WorkItem>,
}

impl ChannelWorkQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl WorkQueue for ChannelWorkQueue {
    fn submit_work(&self, item: WorkItem) -> Result<(), OrchestratorError> {
        self.tx
            .send(item)
            .map_err(|_| OrchestratorError::Job("description queue is closed".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: GoldenConfig) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon against real git, copy, and indexer processes.
pub async fn run(config: GoldenConfig) -> Result<(), DaemonError> {
    let orchestrator = RefreshOrchestrator::from_config(&config);
    serve(config, orchestrator).await
}

/// Reconcile, then serve the control socket (and the refresh scheduler when
/// `refresh_interval_secs > 0`) until ctrl-c or a `stop` request.
pub async fn serve(config: GoldenConfig, orchestrator: RefreshOrchestrator) -> Result<(), DaemonError> {
    let root = config.golden_repos_dir.clone();
    ensure_runtime_dirs(&root)?;

    let mut state = DaemonState::new(&config, orchestrator, Handle::current());

    let (queue, queue_rx) = ChannelWorkQueue::channel();
    let description_handle = {
        let pending = Arc::clone(&state.pending_descriptions);
        tokio::spawn(description_task(queue_rx, pending))
    };

    // Reconciliation takes no locks, so nothing else may touch the repos
    // until it has finished.
    state.reconcile(queue).await?;
    let state = Arc::new(state);

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let state = Arc::clone(&state);
        let every = Duration::from_secs(config.refresh_interval_secs);
        tokio::spawn(async move {
            if every.is_zero() {
                return Ok(());
            }
            let result = scheduler_task(state, every, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let result = socket_server_task(state, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (description_result, scheduler_result, socket_result, signal_result) = tokio::join!(
        description_handle,
        scheduler_handle,
        socket_handle,
        signal_handle
    );

    handle_join("description_queue", description_result)?;
    handle_join("scheduler", scheduler_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!(root = %root.display(), "daemon stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Description generation itself lives outside this process; the daemon only
/// tracks which repos are waiting for it.
async fn description_task(
    mut rx: mpsc::UnboundedReceiver<WorkItem>,
    pending: Arc<RwLock<Vec<RepoAlias>>>,
) -> Result<(), DaemonError> {
    while let Some(item) = rx.recv().await {
        let WorkItem::GenerateDescription { alias, repo_path } = item;
        tracing::info!(alias = %alias, path = %repo_path.display(), "description generation pending");
        pending.write().await.push(alias);
    }
    Ok(())
}

async fn scheduler_task(
    state: Arc<DaemonState>,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; refreshing right after startup would
    // race clients that expect a quiet daemon.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                match submit_refreshes(&state, None, false).await {
                    Ok(submitted) => {
                        tracing::info!(submitted = %submitted, "scheduled refresh submitted");
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "scheduled refresh failed");
                    }
                }
            }
        }
    }
    Ok(())
}

async fn socket_server_task(
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&state.root);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "daemon listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = Arc::clone(&state);
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, state, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    state: Arc<DaemonState>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stop = request.cmd == "stop";
        let response = dispatch(&state, request, &shutdown_tx).await;
        write_response(&mut writer, &response).await?;
        if stop {
            break;
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn dispatch(
    state: &Arc<DaemonState>,
    request: DaemonRequest,
    shutdown_tx: &broadcast::Sender<()>,
) -> DaemonResponse {
    let result = match request.cmd.as_str() {
        "status" => build_status_payload(state).await,
        "refresh" => {
            let alias = request.alias.map(RepoAlias::from);
            submit_refreshes(state, alias, request.force_reset.unwrap_or(false)).await
        }
        "change_branch" => match (request.alias, request.branch) {
            (Some(alias), Some(branch)) => change_branch(state, RepoAlias::from(alias), branch).await,
            _ => Err(DaemonError::Protocol(
                "change_branch requires 'alias' and 'branch'".to_string(),
            )),
        },
        "job" => match request.job_id {
            Some(id) => state
                .jobs
                .status(&id)
                .ok_or_else(|| DaemonError::Protocol(format!("unknown job '{id}'")))
                .and_then(|record| serde_json::to_value(record).map_err(DaemonError::from)),
            None => Err(DaemonError::Protocol("job requires 'job_id'".to_string())),
        },
        "stop" => {
            let _ = shutdown_tx.send(());
            Ok(json!({ "stopping": true }))
        }
        other => Err(DaemonError::Protocol(format!("unknown command '{other}'"))),
    };

    match result {
        Ok(data) => DaemonResponse::ok(data),
        Err(err) => {
            tracing::warn!(error = %err, "daemon request failed");
            DaemonResponse::error(err.to_string())
        }
    }
}

/// Submit a refresh job for `alias`, or for every non-`local://` repo.
///
/// A single alias fails the request; with `None`, per-repo submission errors
/// are reported alongside the jobs that were accepted.
async fn submit_refreshes(
    state: &Arc<DaemonState>,
    alias: Option<RepoAlias>,
    force_reset: bool,
) -> Result<Value, DaemonError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    blocking(move || -> Result<Value, DaemonError> {
        let Some(alias) = alias else {
            let mut submitted = Vec::new();
            for repo in orchestrator.metadata().list_repos()? {
                if repo.is_local() {
                    continue;
                }
                submitted.push(match orchestrator.submit_refresh(&repo.alias, force_reset) {
                    Ok(job_id) => json!({ "alias": repo.alias, "job_id": job_id }),
                    Err(err) => {
                        tracing::error!(alias = %repo.alias, error = %err, "refresh submission failed");
                        json!({ "alias": repo.alias, "error": err.to_string() })
                    }
                });
            }
            return Ok(json!({ "jobs": submitted }));
        };

        let job_id = orchestrator.submit_refresh(&alias, force_reset)?;
        Ok(json!({ "jobs": [{ "alias": alias, "job_id": job_id }] }))
    })
    .await?
}

async fn change_branch(
    state: &Arc<DaemonState>,
    alias: RepoAlias,
    branch: String,
) -> Result<Value, DaemonError> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let owned = alias.clone();
    let outcome = blocking(move || orchestrator.change_branch(&owned, &branch)).await??;
    state.cache.invalidate().await;
    Ok(json!({ "alias": alias, "result": outcome.to_string() }))
}

async fn build_status_payload(state: &Arc<DaemonState>) -> Result<Value, DaemonError> {
    let repos = state.cache.repos().await?;
    let orchestrator = Arc::clone(&state.orchestrator);
    let repos: Vec<Value> = blocking(move || {
        repos
            .iter()
            .map(|repo| repo_status(&orchestrator, repo))
            .collect::<Vec<Value>>()
    })
    .await?;
    let pending = state.pending_descriptions().await;

    Ok(json!({
        "running": true,
        "pid": std::process::id(),
        "started_at": state.started_at.to_rfc3339(),
        "root": state.root.display().to_string(),
        "socket": socket_path(&state.root).display().to_string(),
        "registry_cache_ttl_secs": state.cache.ttl().as_secs(),
        "repos": repos,
        "jobs": state.jobs.list(),
        "reconciliation": state.reconciliation,
        "pending_descriptions": pending,
    }))
}

fn repo_status(orchestrator: &RefreshOrchestrator, repo: &GoldenRepo) -> Value {
    let target = match orchestrator.snapshots().current_target(&repo.alias) {
        Ok(target) => target.map(|p| p.display().to_string()),
        Err(err) => {
            tracing::warn!(alias = %repo.alias, error = %err, "unreadable alias pointer");
            None
        }
    };
    let lock_owner = match orchestrator.locks().get_lock_info(repo.alias.as_str()) {
        Ok(info) => info.map(|info| info.owner),
        Err(err) => {
            tracing::warn!(alias = %repo.alias, error = %err, "unreadable write lock");
            None
        }
    };
    json!({
        "alias": repo.alias,
        "repo_url": repo.repo_url,
        "default_branch": repo.default_branch,
        "local": repo.is_local(),
        "master": repo.clone_path.display().to_string(),
        "target": target,
        "lock_owner": lock_owner,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn blocking<T, F>(f: F) -> Result<T, DaemonError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| DaemonError::Protocol(format!("blocking task join error: {err}")))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(root: &Path) -> Result<(), DaemonError> {
    let run = run_dir(root);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Install the `fmt` subscriber, honoring `RUST_LOG` (default `info`).
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
