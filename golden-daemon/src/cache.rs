//! Registry snapshot served to `status` requests, reloaded after a TTL.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use golden_core::{GoldenRepo, MetadataStore};

use crate::error::DaemonError;

struct Cached {
    loaded_at: Instant,
    repos: Vec<GoldenRepo>,
}

pub struct RegistryCache {
    metadata: Arc<dyn MetadataStore>,
    ttl: Duration,
    entry: RwLock<Option<Cached>>,
}

impl RegistryCache {
    pub fn new(metadata: Arc<dyn MetadataStore>, ttl: Duration) -> Self {
        Self {
            metadata,
            ttl,
            entry: RwLock::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Registered repos, from memory while younger than the TTL.
    pub async fn repos(&self) -> Result<Vec<GoldenRepo>, DaemonError> {
        self.repos_at(Instant::now()).await
    }

    pub(crate) async fn repos_at(&self, now: Instant) -> Result<Vec<GoldenRepo>, DaemonError> {
        {
            let entry = self.entry.read().await;
            if let Some(cached) = entry.as_ref() {
                if now.saturating_duration_since(cached.loaded_at) < self.ttl {
                    return Ok(cached.repos.clone());
                }
            }
        }

        let metadata = Arc::clone(&self.metadata);
        let repos = tokio::task::spawn_blocking(move || metadata.list_repos())
            .await
            .map_err(|err| DaemonError::Protocol(format!("registry load join error: {err}")))??;

        let mut entry = self.entry.write().await;
        *entry = Some(Cached {
            loaded_at: now,
            repos: repos.clone(),
        });
        tracing::debug!(repos = repos.len(), "registry cache reloaded");
        Ok(repos)
    }

    /// Drop the cached copy; the next read goes to disk.
    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use golden_core::{registry, FileMetadataStore, RepoAlias};
    use tempfile::TempDir;

    fn register(root: &TempDir, alias: &str) {
        registry::register_at(
            root.path(),
            RepoAlias::from(alias),
            &format!("https://example.com/{alias}.git"),
            "main",
            None,
        )
        .unwrap();
    }

    fn aliases(repos: &[GoldenRepo]) -> Vec<&str> {
        repos.iter().map(|r| r.alias.as_str()).collect()
    }

    #[tokio::test]
    async fn serves_cached_copy_until_ttl_elapses() {
        let root = TempDir::new().unwrap();
        register(&root, "alpha");
        let cache = RegistryCache::new(
            Arc::new(FileMetadataStore::new(root.path())),
            Duration::from_secs(30),
        );
        let start = Instant::now();

        assert_eq!(aliases(&cache.repos_at(start).await.unwrap()), vec!["alpha"]);

        register(&root, "beta");
        let within = start + Duration::from_secs(29);
        assert_eq!(aliases(&cache.repos_at(within).await.unwrap()), vec!["alpha"]);

        let after = start + Duration::from_secs(30);
        assert_eq!(
            aliases(&cache.repos_at(after).await.unwrap()),
            vec!["alpha", "beta"]
        );
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let root = TempDir::new().unwrap();
        let cache = RegistryCache::new(
            Arc::new(FileMetadataStore::new(root.path())),
            Duration::from_secs(3600),
        );
        assert!(cache.repos().await.unwrap().is_empty());

        register(&root, "alpha");
        assert!(cache.repos().await.unwrap().is_empty());

        cache.invalidate().await;
        assert_eq!(aliases(&cache.repos().await.unwrap()), vec!["alpha"]);
    }

    #[tokio::test]
    async fn zero_ttl_always_reads_disk() {
        let root = TempDir::new().unwrap();
        let cache = RegistryCache::new(Arc::new(FileMetadataStore::new(root.path())), Duration::ZERO);
        assert!(cache.repos().await.unwrap().is_empty());
        register(&root, "alpha");
        assert_eq!(aliases(&cache.repos().await.unwrap()), vec!["alpha"]);
    }
}
