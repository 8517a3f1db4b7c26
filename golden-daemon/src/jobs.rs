//! Background job execution for the daemon.
//!
//! [`TokioJobSubmitter`] runs each [`Job`] on the blocking pool and keeps its
//! status in memory so clients can poll it with the `job` command.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;

use golden_sync::{Job, JobId, JobSubmitter, OrchestratorError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded { summary: String },
    Failed { error: String },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Succeeded { .. } | JobStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct TokioJobSubmitter {
    handle: Handle,
    jobs: Arc<Mutex<HashMap<JobId, JobRecord>>>,
    seq: Arc<AtomicU64>,
}

impl TokioJobSubmitter {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            seq: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn status(&self, id: &str) -> Option<JobRecord> {
        lock(&self.jobs).get(id).cloned()
    }

    /// Every known job, oldest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = lock(&self.jobs).values().cloned().collect();
        records.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then(a.id.cmp(&b.id)));
        records
    }

    fn set_status(jobs: &Mutex<HashMap<JobId, JobRecord>>, id: &str, status: JobStatus) {
        if let Some(record) = lock(jobs).get_mut(id) {
            if status.is_finished() {
                record.finished_at = Some(Utc::now());
            }
            record.status = status;
        }
    }
}

impl JobSubmitter for TokioJobSubmitter {
    fn submit_job(&self, name: &str, job: Job) -> Result<JobId, OrchestratorError> {
        let id = format!("job-{}", self.seq.fetch_add(1, Ordering::Relaxed));
        lock(&self.jobs).insert(
            id.clone(),
            JobRecord {
                id: id.clone(),
                name: name.to_string(),
                status: JobStatus::Pending,
                submitted_at: Utc::now(),
                finished_at: None,
            },
        );

        let jobs = Arc::clone(&self.jobs);
        let job_id = id.clone();
        let job_name = name.to_string();
        self.handle.spawn_blocking(move || {
            Self::set_status(&jobs, &job_id, JobStatus::Running);
            let status = match job() {
                Ok(summary) => {
                    tracing::info!(job_id = %job_id, name = %job_name, %summary, "job succeeded");
                    JobStatus::Succeeded { summary }
                }
                Err(err) => {
                    tracing::error!(job_id = %job_id, name = %job_name, error = %err, "job failed");
                    JobStatus::Failed {
                        error: err.to_string(),
                    }
                }
            };
            Self::set_status(&jobs, &job_id, status);
        });

        Ok(id)
    }
}

// A panicking job must not take the status table down with it.
fn lock(jobs: &Mutex<HashMap<JobId, JobRecord>>) -> MutexGuard<'_, HashMap<JobId, JobRecord>> {
    jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
