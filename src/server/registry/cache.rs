use moka::{future::Cache, Expiry};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::models::{Credentials, SecretToken};

/// Default lifetime of a cached credential
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default interval of the background sweep that drops expired entries
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Cached credentials together with the TTL they were stored with
#[derive(Debug, Clone)]
struct CacheEntry {
    credentials: Credentials,
    ttl: Duration,
}

/// Each entry expires after its own TTL, and a `set` restarts the clock
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Derive the cache key for a (token, path) pair.
///
/// Only the SHA-256 digest is kept so the raw secret-store token never sits in
/// the key space.
pub fn cache_key(token: &SecretToken, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(path.as_bytes());
    format!("creds:{:x}", hasher.finalize())
}

/// Process-wide TTL cache of resolved registry credentials.
///
/// Expired entries are invisible to reads immediately; the periodic sweep only
/// reclaims their memory. There is no capacity bound.
#[derive(Clone)]
pub struct CredentialCache {
    cache: Cache<String, CacheEntry>,
    default_ttl: Duration,
}

impl CredentialCache {
    pub fn new(default_ttl: Duration) -> Self {
        let cache = Cache::builder().expire_after(EntryExpiry).build();
        Self { cache, default_ttl }
    }

    pub async fn get(&self, token: &SecretToken, path: &str) -> Option<Credentials> {
        self.cache
            .get(&cache_key(token, path))
            .await
            .map(|entry| entry.credentials)
    }

    /// Store credentials with the default TTL
    pub async fn set(&self, token: &SecretToken, path: &str, credentials: Credentials) {
        self.set_with_ttl(token, path, credentials, self.default_ttl)
            .await
    }

    pub async fn set_with_ttl(
        &self,
        token: &SecretToken,
        path: &str,
        credentials: Credentials,
        ttl: Duration,
    ) {
        self.cache
            .insert(cache_key(token, path), CacheEntry { credentials, ttl })
            .await;
    }

    pub async fn delete(&self, token: &SecretToken, path: &str) {
        self.cache.invalidate(&cache_key(token, path)).await;
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Return the cached credentials, or run `fetch` to populate the entry.
    ///
    /// Concurrent callers missing on the same key share a single `fetch`;
    /// the others wait for its result. Failures are not cached.
    pub async fn get_or_fetch<F, E>(
        &self,
        token: &SecretToken,
        path: &str,
        fetch: F,
    ) -> Result<Credentials, Arc<E>>
    where
        F: Future<Output = Result<Credentials, E>>,
        E: Send + Sync + 'static,
    {
        let ttl = self.default_ttl;
        self.cache
            .try_get_with(cache_key(token, path), async move {
                fetch
                    .await
                    .map(|credentials| CacheEntry { credentials, ttl })
            })
            .await
            .map(|entry| entry.credentials)
    }

    /// Number of live entries, approximate until pending maintenance has run
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Drop expired entries now
    pub async fn sweep(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Run [`sweep`](Self::sweep) on a fixed interval until the task is aborted
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.sweep().await;
                tracing::debug!(
                    entries = cache.entry_count(),
                    "Credential cache sweep complete"
                );
            }
        })
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn creds(user: &str) -> Credentials {
        Credentials::new(user, format!("{}-pass", user), None)
    }

    #[test]
    fn test_cache_key_deterministic_and_hashed() {
        let token = SecretToken::new("hvs.token");
        let key1 = cache_key(&token, "docker-hub");
        let key2 = cache_key(&token, "docker-hub");
        assert_eq!(key1, key2);
        assert!(key1.starts_with("creds:"));
        assert_eq!(key1.len(), "creds:".len() + 64);
        assert!(!key1.contains("hvs.token"));
        assert!(!key1.contains("docker-hub"));

        assert_ne!(key1, cache_key(&token, "quay"));
        assert_ne!(key1, cache_key(&SecretToken::new("other"), "docker-hub"));
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = CredentialCache::default();
        let token = SecretToken::new("t1");

        cache.set(&token, "docker-hub", creds("alice")).await;
        assert_eq!(cache.get(&token, "docker-hub").await, Some(creds("alice")));
    }

    #[tokio::test]
    async fn test_get_isolated_per_pair() {
        let cache = CredentialCache::default();
        let t1 = SecretToken::new("t1");
        let t2 = SecretToken::new("t2");

        cache.set(&t1, "docker-hub", creds("alice")).await;
        cache.set(&t2, "docker-hub", creds("bob")).await;

        assert_eq!(cache.get(&t1, "docker-hub").await, Some(creds("alice")));
        assert_eq!(cache.get(&t2, "docker-hub").await, Some(creds("bob")));
        assert_eq!(cache.get(&t1, "quay").await, None);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = CredentialCache::new(Duration::from_millis(100));
        let token = SecretToken::new("t1");

        cache.set(&token, "docker-hub", creds("alice")).await;
        assert!(cache.get(&token, "docker-hub").await.is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get(&token, "docker-hub").await.is_none());
    }

    #[tokio::test]
    async fn test_set_with_custom_ttl() {
        let cache = CredentialCache::new(Duration::from_secs(60));
        let token = SecretToken::new("t1");

        cache
            .set_with_ttl(&token, "short", creds("alice"), Duration::from_millis(100))
            .await;
        cache.set(&token, "long", creds("bob")).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get(&token, "short").await.is_none());
        assert!(cache.get(&token, "long").await.is_some());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let cache = CredentialCache::default();
        let token = SecretToken::new("t1");

        cache.set(&token, "docker-hub", creds("alice")).await;
        cache.set(&token, "docker-hub", creds("bob")).await;
        assert_eq!(cache.get(&token, "docker-hub").await, Some(creds("bob")));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = CredentialCache::default();
        let token = SecretToken::new("t1");

        cache.set(&token, "a", creds("alice")).await;
        cache.set(&token, "b", creds("bob")).await;

        cache.delete(&token, "a").await;
        assert!(cache.get(&token, "a").await.is_none());
        assert!(cache.get(&token, "b").await.is_some());

        cache.clear();
        assert!(cache.get(&token, "b").await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_reclaims_expired_entries() {
        let cache = CredentialCache::new(Duration::from_millis(50));
        let token = SecretToken::new("t1");

        cache.set(&token, "a", creds("alice")).await;
        cache.sweep().await;
        assert_eq!(cache.entry_count(), 1);

        // Expired entries are unreadable at once but only reclaimed when
        // moka's timer wheel advances, which happens at one-second granularity
        assert!(cache.get(&token, "a").await.is_none());
        tokio::time::sleep(Duration::from_millis(2500)).await;
        cache.sweep().await;
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_get_or_fetch_coalesces_concurrent_misses() {
        let cache = CredentialCache::default();
        let token = SecretToken::new("t1");
        let fetches = Arc::new(AtomicUsize::new(0));

        let calls = (0..8).map(|_| {
            let fetches = fetches.clone();
            cache.get_or_fetch(&token, "docker-hub", async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, String>(creds("alice"))
            })
        });
        let results = futures::future::join_all(calls).await;

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.as_ref().ok() == Some(&creds("alice"))));
    }

    #[tokio::test]
    async fn test_get_or_fetch_does_not_cache_errors() {
        let cache = CredentialCache::default();
        let token = SecretToken::new("t1");

        let err = cache
            .get_or_fetch(&token, "p", async { Err::<Credentials, _>("boom".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err.as_str(), "boom");
        assert!(cache.get(&token, "p").await.is_none());

        let ok = cache
            .get_or_fetch(&token, "p", async { Ok::<_, String>(creds("alice")) })
            .await
            .unwrap();
        assert_eq!(ok, creds("alice"));
    }
}
