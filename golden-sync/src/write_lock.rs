//! Cross-process write lock, one JSON file per alias.
//!
//! ```text
//! <golden_repos_dir>/.locks/<alias>.lock
//! {"owner":"refresh","pid":4242,"acquired_at":"2026-01-05T10:00:00Z","ttl_seconds":3600}
//! ```
//!
//! A lock is live only while its PID answers a liveness probe *and*
//! `acquired_at + ttl_seconds` lies in the future. Anything else (dead PID,
//! elapsed TTL, unparseable file, a record missing `pid` or `acquired_at`)
//! is stale and is evicted by whichever call observes it
//! first. There is no blocking and no retry: contention is a `false` return.
//!
//! New lock files are written to a private tmp file and hard-linked into
//! place, so creation is atomic and two racing writers cannot both win.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{lock_io_err, LockError};

pub const DEFAULT_LOCK_TTL_SECONDS: u64 = 3600;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Persisted lock record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub acquired_at: Option<DateTime<Utc>>,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_LOCK_TTL_SECONDS
}

impl LockInfo {
    /// `None` when the record has no `acquired_at` or the TTL overflows.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = i64::try_from(self.ttl_seconds).ok()?;
        let at = self.acquired_at?;
        at.checked_add_signed(chrono::Duration::try_seconds(ttl)?)
    }

    /// Live only while the owner PID answers and the TTL has not elapsed; a
    /// record missing either field is stale.
    fn is_stale(&self, now: DateTime<Utc>, probe: &dyn ProcessProbe) -> bool {
        let alive = self.pid.is_some_and(|pid| probe.is_alive(pid));
        let unexpired = self.expires_at().is_some_and(|expires| expires > now);
        !(alive && unexpired)
    }
}

/// Answers "is this PID a running process?".
pub trait ProcessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// `kill(pid, 0)` on Unix. Elsewhere every PID is assumed alive, leaving
/// the TTL as the only staleness signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessProbe;

impl ProcessProbe for SystemProcessProbe {
    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        // SAFETY: signal 0 performs only the existence and permission check.
        let rc = unsafe { libc::kill(pid, 0) };
        if rc == 0 {
            return true;
        }
        // EPERM: the process exists but belongs to someone else.
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        true
    }
}

/// Named, file-based mutex keyed by repository alias.
#[derive(Clone)]
pub struct WriteLockManager {
    locks_dir: PathBuf,
    probe: Arc<dyn ProcessProbe>,
    pid: u32,
}

impl std::fmt::Debug for WriteLockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteLockManager")
            .field("locks_dir", &self.locks_dir)
            .field("pid", &self.pid)
            .finish()
    }
}

impl WriteLockManager {
    /// Locks live in `locks_dir` (normally `<golden_repos_dir>/.locks`).
    pub fn new(locks_dir: impl Into<PathBuf>) -> Self {
        Self::with_probe(locks_dir, Arc::new(SystemProcessProbe))
    }

    pub fn with_probe(locks_dir: impl Into<PathBuf>, probe: Arc<dyn ProcessProbe>) -> Self {
        Self {
            locks_dir: locks_dir.into(),
            probe,
            pid: std::process::id(),
        }
    }

    pub fn lock_path(&self, alias: &str) -> PathBuf {
        self.locks_dir.join(format!("{alias}.lock"))
    }

    /// Try to take the lock for `alias`. Returns `false` when a live,
    /// unexpired lock is already held (by anyone, this process included).
    pub fn acquire(&self, alias: &str, owner: &str, ttl_seconds: u64) -> Result<bool, LockError> {
        std::fs::create_dir_all(&self.locks_dir).map_err(|e| lock_io_err(&self.locks_dir, e))?;
        let path = self.lock_path(alias);

        if let Some(held) = self.read_live(&path)? {
            tracing::debug!(alias, holder = %held.owner, pid = ?held.pid, "write lock busy");
            return Ok(false);
        }

        let info = LockInfo {
            owner: owner.to_string(),
            pid: Some(self.pid),
            acquired_at: Some(Utc::now()),
            ttl_seconds,
        };
        let created = self.create_exclusive(alias, &path, &info)?;
        if created {
            tracing::info!(alias, owner, ttl_seconds, "write lock acquired");
        } else {
            tracing::debug!(alias, owner, "lost write lock race");
        }
        Ok(created)
    }

    /// Release the lock if `owner` holds it.
    ///
    /// Idempotent: no lock file → `true`. Owner mismatch → `false` and the
    /// file is left untouched. A corrupt file is evicted → `true`.
    pub fn release(&self, alias: &str, owner: &str) -> Result<bool, LockError> {
        let path = self.lock_path(alias);
        let Some(contents) = read_optional(&path)? else {
            return Ok(true);
        };

        match serde_json::from_str::<LockInfo>(&contents) {
            Ok(info) if info.owner != owner => {
                tracing::warn!(alias, owner, holder = %info.owner, "refusing to release lock held by another owner");
                Ok(false)
            }
            Ok(_) => {
                remove_if_present(&path)?;
                tracing::info!(alias, owner, "write lock released");
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(alias, error = %err, "evicting corrupt lock file on release");
                remove_if_present(&path)?;
                Ok(true)
            }
        }
    }

    /// Whether a live lock exists. Evicts stale files as a side effect.
    pub fn is_locked(&self, alias: &str) -> Result<bool, LockError> {
        Ok(self.read_live(&self.lock_path(alias))?.is_some())
    }

    /// The live lock record, if any. Evicts stale files as a side effect.
    pub fn get_lock_info(&self, alias: &str) -> Result<Option<LockInfo>, LockError> {
        self.read_live(&self.lock_path(alias))
    }

    fn read_live(&self, path: &Path) -> Result<Option<LockInfo>, LockError> {
        let Some(contents) = read_optional(path)? else {
            return Ok(None);
        };

        let stale_reason = match serde_json::from_str::<LockInfo>(&contents) {
            Ok(info) => {
                if !info.is_stale(Utc::now(), self.probe.as_ref()) {
                    return Ok(Some(info));
                }
                format!("owner={} pid={:?} acquired_at={:?}", info.owner, info.pid, info.acquired_at)
            }
            Err(err) => format!("corrupt record: {err}"),
        };

        // Only delete what was judged stale; a fresh lock written in between survives.
        if read_optional(path)?.as_deref() == Some(contents.as_str()) {
            remove_if_present(path)?;
            tracing::warn!(path = %path.display(), reason = %stale_reason, "evicted stale write lock");
        }
        Ok(None)
    }

    fn create_exclusive(&self, alias: &str, path: &Path, info: &LockInfo) -> Result<bool, LockError> {
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .locks_dir
            .join(format!(".{alias}.lock.{}.{seq}.tmp", self.pid));
        let json = serde_json::to_string(info)?;
        std::fs::write(&tmp, json).map_err(|e| lock_io_err(&tmp, e))?;

        let linked = std::fs::hard_link(&tmp, path);
        let _ = std::fs::remove_file(&tmp);
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(lock_io_err(path, e)),
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, LockError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(lock_io_err(path, e)),
    }
}

fn remove_if_present(path: &Path) -> Result<(), LockError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(lock_io_err(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct DeadPids;

    impl ProcessProbe for DeadPids {
        fn is_alive(&self, _pid: u32) -> bool {
            false
        }
    }

    fn manager(dir: &TempDir) -> WriteLockManager {
        WriteLockManager::new(dir.path().join(".locks"))
    }

    fn write_raw(manager: &WriteLockManager, alias: &str, json: &str) {
        std::fs::create_dir_all(manager.lock_path(alias).parent().unwrap()).unwrap();
        std::fs::write(manager.lock_path(alias), json).unwrap();
    }

    #[test]
    fn acquire_creates_locks_dir_and_record() {
        let dir = TempDir::new().unwrap();
        let locks = manager(&dir);
        assert!(locks.acquire("payments", "refresh", 3600).unwrap());

        let info = locks.get_lock_info("payments").unwrap().expect("live lock");
        assert_eq!(info.owner, "refresh");
        assert_eq!(info.pid, Some(std::process::id()));
        assert_eq!(info.ttl_seconds, 3600);
        assert!(info.acquired_at.is_some());
    }

    #[test]
    fn second_acquire_is_refused_without_blocking() {
        let dir = TempDir::new().unwrap();
        let locks = manager(&dir);
        assert!(locks.acquire("payments", "refresh", 3600).unwrap());
        assert!(!locks.acquire("payments", "branch_change", 3600).unwrap());
        assert_eq!(locks.get_lock_info("payments").unwrap().unwrap().owner, "refresh");
    }

    #[test]
    fn aliases_are_independent() {
        let dir = TempDir::new().unwrap();
        let locks = manager(&dir);
        assert!(locks.acquire("a", "refresh", 3600).unwrap());
        assert!(locks.acquire("b", "refresh", 3600).unwrap());
    }

    #[test]
    fn dead_pid_lock_is_evicted_by_acquire() {
        let dir = TempDir::new().unwrap();
        let probe_dead = WriteLockManager::with_probe(dir.path().join(".locks"), Arc::new(DeadPids));
        assert!(probe_dead.acquire("payments", "crashed", 3600).unwrap());
        assert!(probe_dead.acquire("payments", "survivor", 3600).unwrap());
        assert_eq!(
            probe_dead.get_lock_info("payments").unwrap(),
            None,
            "every pid is dead for this probe, so even the new lock reads as stale"
        );
    }

    #[test]
    fn expired_ttl_is_stale_even_with_live_pid() {
        let dir = TempDir::new().unwrap();
        let locks = manager(&dir);
        let two_hours_ago = (Utc::now() - chrono::Duration::hours(2)).to_rfc3339();
        write_raw(
            &locks,
            "payments",
            &format!(
                r#"{{"owner":"hung","pid":{},"acquired_at":"{two_hours_ago}","ttl_seconds":3600}}"#,
                std::process::id()
            ),
        );

        assert!(!locks.is_locked("payments").unwrap());
        assert!(!locks.lock_path("payments").exists(), "stale file evicted on observation");
    }

    #[test]
    fn pid_only_record_is_stale_while_pid_lives() {
        let dir = TempDir::new().unwrap();
        let locks = manager(&dir);
        write_raw(
            &locks,
            "payments",
            &format!(r#"{{"owner":"old","pid":{},"ttl_seconds":3600}}"#, std::process::id()),
        );
        assert!(!locks.is_locked("payments").unwrap());
    }

    #[test]
    fn record_without_pid_and_acquired_at_is_stale() {
        let dir = TempDir::new().unwrap();
        let locks = manager(&dir);
        write_raw(&locks, "payments", r#"{"owner":"mystery","ttl_seconds":999999}"#);

        assert_eq!(locks.get_lock_info("payments").unwrap(), None);
        assert!(locks.acquire("payments", "refresh", 3600).unwrap());
    }

    #[test]
    fn unparseable_file_is_stale() {
        let dir = TempDir::new().unwrap();
        let locks = manager(&dir);
        write_raw(&locks, "payments", "{not json");
        assert!(locks.acquire("payments", "refresh", 3600).unwrap());
    }

    #[test]
    fn release_is_idempotent_and_owner_checked() {
        let dir = TempDir::new().unwrap();
        let locks = manager(&dir);
        assert!(locks.release("payments", "refresh").unwrap(), "no lock → true");

        assert!(locks.acquire("payments", "refresh", 3600).unwrap());
        assert!(!locks.release("payments", "intruder").unwrap());
        assert!(locks.lock_path("payments").exists(), "wrong owner leaves file intact");

        assert!(locks.release("payments", "refresh").unwrap());
        assert!(!locks.lock_path("payments").exists());
        assert!(locks.release("payments", "refresh").unwrap());
    }

    #[test]
    fn expires_at_handles_missing_and_huge_ttl() {
        let mut info = LockInfo {
            owner: "x".into(),
            pid: Some(1),
            acquired_at: None,
            ttl_seconds: 10,
        };
        assert_eq!(info.expires_at(), None);
        info.acquired_at = Some(Utc::now());
        info.ttl_seconds = u64::MAX;
        assert_eq!(info.expires_at(), None);
    }

    #[cfg(unix)]
    #[test]
    fn system_probe_sees_self_and_rejects_impossible_pid() {
        assert!(SystemProcessProbe.is_alive(std::process::id()));
        assert!(!SystemProcessProbe.is_alive(999_999_999));
        assert!(!SystemProcessProbe.is_alive(0));
    }
}
