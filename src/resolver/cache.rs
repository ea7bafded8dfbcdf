use crate::types::SourceConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    config: Arc<SourceConfig>,
    // None when the TTL reaches past what an Instant can represent
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Process-wide cache of resolved source configurations, keyed by secret
/// reference. Entries are inserted whole and expire after a fixed TTL.
#[derive(Debug)]
pub struct SecretCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
    // one lock per reference with a miss in flight
    misses: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SecretCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            misses: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, reference: &str) -> Option<Arc<SourceConfig>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries
            .get(reference)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.config.clone())
    }

    pub async fn insert(&self, reference: &str, config: SourceConfig) -> Arc<SourceConfig> {
        let config = Arc::new(config);
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(
            reference.to_string(),
            CacheEntry {
                config: config.clone(),
                expires_at: now.checked_add(self.ttl),
            },
        );
        config
    }

    /// Live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Serializes miss handling per reference. Callers re-check the cache after
    /// acquiring the guard so concurrent misses result in a single lookup, then
    /// hand the guard back through [`SecretCache::release_miss`].
    pub async fn lock_miss(&self, reference: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut misses = self.misses.lock().await;
            misses
                .entry(reference.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Releases a miss guard and forgets the reference's lock once no other
    /// caller is waiting on it.
    pub async fn release_miss(&self, reference: &str, guard: OwnedMutexGuard<()>) {
        drop(guard);
        // clones only happen under this lock, so the count cannot grow meanwhile
        let mut misses = self.misses.lock().await;
        if misses
            .get(reference)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            misses.remove(reference);
        }
    }

    /// References with a miss lock currently held or awaited.
    pub async fn pending_misses(&self) -> usize {
        self.misses.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id: &str) -> SourceConfig {
        SourceConfig {
            endpoint: "https://api.example.com".into(),
            auth_token: "secret".into(),
            source_id: id.into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = SecretCache::new(Duration::from_secs(60));
        cache.insert("ref", config("a")).await;
        assert_eq!(cache.get("ref").await.unwrap().source_id, "a");

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("ref").await.is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("ref").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn insert_replaces_whole_entry() {
        let cache = SecretCache::new(Duration::from_secs(60));
        cache.insert("ref", config("old")).await;
        cache.insert("ref", config("new")).await;
        assert_eq!(cache.get("ref").await.unwrap().source_id, "new");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn unrepresentable_ttl_never_expires() {
        let cache = SecretCache::new(Duration::MAX);
        cache.insert("ref", config("a")).await;
        assert_eq!(cache.get("ref").await.unwrap().source_id, "a");
    }

    #[tokio::test]
    async fn released_miss_lock_is_forgotten() {
        let cache = Arc::new(SecretCache::new(Duration::from_secs(60)));
        let guard = cache.lock_miss("ref").await;
        assert_eq!(cache.pending_misses().await, 1);

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                let guard = cache.lock_miss("ref").await;
                cache.release_miss("ref", guard).await;
            })
        };
        // map + held guard + waiter
        while Arc::strong_count(cache.misses.lock().await.get("ref").unwrap()) < 3 {
            tokio::task::yield_now().await;
        }

        cache.release_miss("ref", guard).await;
        waiter.await.unwrap();
        assert_eq!(cache.pending_misses().await, 0);
    }
}
