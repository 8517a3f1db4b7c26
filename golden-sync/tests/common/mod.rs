//! Trait-level fakes shared by the orchestration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use golden_core::{
    registry, FileMetadataStore, GoldenLayout, GoldenRepo, MetadataError, MetadataStore, RepoAlias,
};
use golden_sync::{
    GitProvider, GitSyncError, IndexError, Indexer, Job, JobId, JobSubmitter, OrchestratorError,
    RefreshOrchestrator, RepoUpdater, Snapshot, SnapshotError, SnapshotManager,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Call log
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

// ---------------------------------------------------------------------------
// Script: what the fakes report
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct Script {
    pub has_changes: bool,
    pub remote_branches: Vec<String>,
    pub update_error: Option<String>,
    pub index_error: Option<String>,
    pub snapshot_error: Option<String>,
}

fn git_failure(command: &str, stderr: &str) -> GitSyncError {
    GitSyncError::Failed {
        command: command.to_string(),
        repo: PathBuf::from("/fake"),
        exit_code: Some(1),
        stderr: stderr.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

pub struct FakeGit {
    calls: CallLog,
    script: Script,
}

struct FakeUpdater {
    calls: CallLog,
    script: Script,
}

impl GitProvider for FakeGit {
    fn updater(&self, _repo_path: &Path) -> Box<dyn RepoUpdater> {
        Box::new(FakeUpdater {
            calls: self.calls.clone(),
            script: self.script.clone(),
        })
    }

    fn clone_repo(&self, url: &str, branch: &str, dest: &Path) -> Result<(), GitSyncError> {
        self.calls.push(format!("clone({url}, {branch})"));
        std::fs::create_dir_all(dest).unwrap();
        Ok(())
    }
}

impl RepoUpdater for FakeUpdater {
    fn has_changes(&self) -> Result<bool, GitSyncError> {
        self.calls.push("has_changes");
        Ok(self.script.has_changes)
    }

    fn update(&self, force_reset: bool) -> Result<(), GitSyncError> {
        self.calls.push(format!("update(force_reset={force_reset})"));
        match &self.script.update_error {
            Some(stderr) => Err(git_failure("git pull", stderr)),
            None => Ok(()),
        }
    }

    fn fetch(&self) -> Result<(), GitSyncError> {
        self.calls.push("fetch");
        Ok(())
    }

    fn remote_branch_exists(&self, branch: &str) -> Result<bool, GitSyncError> {
        self.calls.push(format!("remote_branch_exists({branch})"));
        Ok(self.script.remote_branches.iter().any(|b| b == branch))
    }

    fn checkout_branch(&self, branch: &str) -> Result<(), GitSyncError> {
        self.calls.push(format!("checkout({branch})"));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Indexer
// ---------------------------------------------------------------------------

pub struct FakeIndexer {
    calls: CallLog,
    script: Script,
}

impl Indexer for FakeIndexer {
    fn index(&self, repo_path: &Path) -> Result<(), IndexError> {
        self.calls.push("index");
        match &self.script.index_error {
            Some(stderr) => Err(IndexError::Failed {
                command: "cidx index --fts".into(),
                repo: repo_path.to_path_buf(),
                exit_code: Some(1),
                stderr: stderr.clone(),
            }),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

pub struct FakeSnapshots {
    calls: CallLog,
    script: Script,
    layout: GoldenLayout,
    target: Mutex<Option<PathBuf>>,
    next: Mutex<u64>,
}

impl SnapshotManager for FakeSnapshots {
    fn snapshot(&self, repo: &GoldenRepo) -> Result<PathBuf, SnapshotError> {
        self.calls.push("snapshot");
        if let Some(stderr) = &self.script.snapshot_error {
            return Err(SnapshotError::ToolFailed {
                command: "cp --reflink=auto -a".into(),
                exit_code: Some(1),
                stderr: stderr.clone(),
            });
        }
        let mut next = self.next.lock().unwrap();
        *next += 1;
        let path = self
            .layout
            .versioned_dir(&repo.alias)
            .join(format!("v_{}", 1_000_000 + *next));
        std::fs::create_dir_all(&path).unwrap();
        Ok(path)
    }

    fn promote(&self, _alias: &RepoAlias, snapshot: &Path) -> Result<(), SnapshotError> {
        self.calls.push("promote");
        *self.target.lock().unwrap() = Some(snapshot.to_path_buf());
        Ok(())
    }

    fn restore_master(&self, repo: &GoldenRepo) -> Result<PathBuf, SnapshotError> {
        self.calls.push("restore_master");
        Ok(repo.clone_path.clone())
    }

    fn list_snapshots(&self, _alias: &RepoAlias) -> Result<Vec<Snapshot>, SnapshotError> {
        Ok(Vec::new())
    }

    fn current_target(&self, _alias: &RepoAlias) -> Result<Option<PathBuf>, SnapshotError> {
        Ok(self.target.lock().unwrap().clone())
    }

    fn remove_alias(&self, _alias: &RepoAlias) -> Result<bool, SnapshotError> {
        self.calls.push("remove_alias");
        Ok(self.target.lock().unwrap().take().is_some())
    }
}

// ---------------------------------------------------------------------------
// Metadata: file-backed, with writes recorded
// ---------------------------------------------------------------------------

pub struct RecordingMetadata {
    inner: FileMetadataStore,
    writes: CallLog,
}

impl MetadataStore for RecordingMetadata {
    fn get_repo(&self, alias: &RepoAlias) -> Result<Option<GoldenRepo>, MetadataError> {
        self.inner.get_repo(alias)
    }

    fn list_repos(&self) -> Result<Vec<GoldenRepo>, MetadataError> {
        self.inner.list_repos()
    }

    fn save_repo(&self, repo: &GoldenRepo) -> Result<(), MetadataError> {
        self.writes.push(format!("save_repo({})", repo.alias));
        self.inner.save_repo(repo)
    }

    fn remove_repo(&self, alias: &RepoAlias) -> Result<bool, MetadataError> {
        self.writes.push(format!("remove_repo({alias})"));
        self.inner.remove_repo(alias)
    }

    fn update_default_branch(&self, alias: &RepoAlias, branch: &str) -> Result<(), MetadataError> {
        self.writes.push(format!("update_default_branch({alias}, {branch})"));
        self.inner.update_default_branch(alias, branch)
    }

    fn invalidate_description_refresh_tracking(&self, alias: &RepoAlias) -> Result<(), MetadataError> {
        self.writes.push(format!("invalidate_description_refresh({alias})"));
        self.inner.invalidate_description_refresh_tracking(alias)
    }

    fn invalidate_dependency_map_tracking(&self, alias: &RepoAlias) -> Result<(), MetadataError> {
        self.writes.push(format!("invalidate_dependency_map({alias})"));
        self.inner.invalidate_dependency_map_tracking(alias)
    }
}

// ---------------------------------------------------------------------------
// Job submitter that parks jobs until the test runs them
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ParkedJobs {
    jobs: Mutex<Vec<(String, Job)>>,
}

impl ParkedJobs {
    pub fn take(&self) -> Vec<(String, Job)> {
        std::mem::take(&mut *self.jobs.lock().unwrap())
    }
}

impl JobSubmitter for ParkedJobs {
    fn submit_job(&self, name: &str, job: Job) -> Result<JobId, OrchestratorError> {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.push((name.to_string(), job));
        Ok(format!("job-{}", jobs.len()))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub root: TempDir,
    pub calls: CallLog,
    pub writes: CallLog,
    pub jobs: Arc<ParkedJobs>,
    pub orchestrator: Arc<RefreshOrchestrator>,
}

impl Harness {
    pub fn new(script: Script) -> Self {
        Self::build(script, false)
    }

    pub fn with_jobs(script: Script) -> Self {
        Self::build(script, true)
    }

    fn build(script: Script, with_jobs: bool) -> Self {
        let root = TempDir::new().unwrap();
        let layout = GoldenLayout::new(root.path());
        let calls = CallLog::default();
        let writes = CallLog::default();
        let jobs = Arc::new(ParkedJobs::default());

        let mut orchestrator = RefreshOrchestrator::new(
            layout.clone(),
            Arc::new(RecordingMetadata {
                inner: FileMetadataStore::new(root.path()),
                writes: writes.clone(),
            }),
            Arc::new(FakeGit {
                calls: calls.clone(),
                script: script.clone(),
            }),
            Arc::new(FakeIndexer {
                calls: calls.clone(),
                script: script.clone(),
            }),
            Arc::new(FakeSnapshots {
                calls: calls.clone(),
                script,
                layout,
                target: Mutex::new(None),
                next: Mutex::new(0),
            }),
        );
        if with_jobs {
            orchestrator = orchestrator.with_job_submitter(jobs.clone());
        }

        Self {
            root,
            calls,
            writes,
            jobs,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Register `alias` directly in the registry (unrecorded) and create its
    /// master directory.
    pub fn register(&self, alias: &str, url: &str, branch: &str) -> GoldenRepo {
        let repo = registry::register_at(self.root.path(), RepoAlias::from(alias), url, branch, None)
            .unwrap();
        std::fs::create_dir_all(&repo.clone_path).unwrap();
        repo
    }

    pub fn lock_path(&self, alias: &str) -> PathBuf {
        self.orchestrator.locks().lock_path(alias)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.entries()
    }
}
