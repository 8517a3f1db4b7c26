//! Long-running golden repo service.
//!
//! Startup reconciliation, a periodic refresh scheduler, background refresh
//! jobs, and a newline-delimited JSON control socket.

pub mod cache;
mod error;
pub mod jobs;
pub mod paths;
pub mod protocol;
mod runtime;

pub use cache::RegistryCache;
pub use error::DaemonError;
pub use jobs::{JobRecord, JobStatus, TokioJobSubmitter};
pub use protocol::{
    request_change_branch, request_job, request_refresh, request_status, request_stop,
    send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{init_tracing, run, serve, start_blocking, ChannelWorkQueue, DaemonState};
