pub mod cache;

use crate::app::ports::{SecretStoreError, SecretStorePort};
use crate::classifier;
use crate::error::{IngestError, Result};
use crate::observability::metrics;
use crate::types::{validate_component, SourceConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub use cache::SecretCache;

/// Resolves a secret reference into a [`SourceConfig`], consulting the shared
/// cache first.
pub struct ConfigResolver {
    store: Arc<dyn SecretStorePort>,
    cache: Arc<SecretCache>,
    lookup_timeout: Option<Duration>,
}

impl ConfigResolver {
    pub fn new(store: Arc<dyn SecretStorePort>, cache: Arc<SecretCache>) -> Self {
        Self { store, cache, lookup_timeout: None }
    }

    /// Bounds each secret store lookup; an expired lookup counts as the store
    /// being unreachable.
    pub fn with_lookup_timeout(mut self, limit: Duration) -> Self {
        self.lookup_timeout = Some(limit);
        self
    }

    pub fn cache(&self) -> &Arc<SecretCache> {
        &self.cache
    }

    pub async fn resolve(&self, reference: &str) -> Result<SourceConfig> {
        if let Some(hit) = self.cache.get(reference).await {
            metrics::secrets::cache_hit();
            debug!(reference, "secret cache hit");
            return Ok((*hit).clone());
        }

        let miss = self.cache.lock_miss(reference).await;
        let resolved = self.resolve_miss(reference).await;
        self.cache.release_miss(reference, miss).await;
        resolved
    }

    async fn resolve_miss(&self, reference: &str) -> Result<SourceConfig> {
        // another invocation may have filled the entry while we waited
        if let Some(hit) = self.cache.get(reference).await {
            metrics::secrets::cache_hit();
            return Ok((*hit).clone());
        }
        metrics::secrets::cache_miss();

        let raw = self.lookup(reference).await.map_err(|e| {
            metrics::secrets::lookup_error();
            classifier::secret_failure(reference, e)
        })?;
        metrics::secrets::lookup_success();

        let config = parse_source_config(reference, &raw)?;
        info!(
            reference,
            source_id = %config.source_id,
            ttl_secs = self.cache.ttl().as_secs(),
            "resolved source configuration"
        );
        let cached = self.cache.insert(reference, config).await;
        Ok((*cached).clone())
    }

    async fn lookup(&self, reference: &str) -> std::result::Result<String, SecretStoreError> {
        let lookup = self.store.get_secret(reference);
        match self.lookup_timeout {
            Some(limit) => tokio::time::timeout(limit, lookup).await.unwrap_or_else(|_| {
                Err(SecretStoreError::Unavailable {
                    message: format!("lookup exceeded {:?}", limit),
                    source: None,
                })
            }),
            None => lookup.await,
        }
    }
}

pub fn parse_source_config(reference: &str, raw: &str) -> Result<SourceConfig> {
    let config: SourceConfig =
        serde_json::from_str(raw).map_err(|e| classifier::malformed_secret(reference, e))?;

    let url = reqwest::Url::parse(&config.endpoint).map_err(|e| {
        IngestError::config_caused_by(reference, "endpoint is not a valid URL", e)
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(IngestError::config(
            reference,
            format!("endpoint scheme '{}' is not http(s)", url.scheme()),
        ));
    }
    if config.auth_token.trim().is_empty() {
        return Err(IngestError::config(reference, "auth token is empty"));
    }
    validate_component("source id", &config.source_id)
        .map_err(|e| IngestError::config_caused_by(reference, "source id is unusable", e))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::SecretStoreError;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct MockSecretStore {
        secrets: HashMap<String, String>,
        lookups: AtomicUsize,
        delay: Duration,
    }

    impl MockSecretStore {
        fn with(reference: &str, body: &str) -> Self {
            let mut secrets = HashMap::new();
            secrets.insert(reference.to_string(), body.to_string());
            Self { secrets, lookups: AtomicUsize::new(0), delay: Duration::ZERO }
        }

        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SecretStorePort for MockSecretStore {
        async fn get_secret(&self, reference: &str) -> std::result::Result<String, SecretStoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.secrets
                .get(reference)
                .cloned()
                .ok_or_else(|| SecretStoreError::NotFound(reference.to_string()))
        }
    }

    const GOOD: &str = r#"{"endpoint":"https://api.example.com/data","authToken":"tok","sourceId":"example"}"#;

    fn resolver(store: Arc<MockSecretStore>, ttl: Duration) -> ConfigResolver {
        ConfigResolver::new(store, Arc::new(SecretCache::new(ttl)))
    }

    #[tokio::test(start_paused = true)]
    async fn caches_within_ttl_and_refreshes_after() {
        let store = Arc::new(MockSecretStore::with("ref", GOOD));
        let resolver = resolver(store.clone(), Duration::from_secs(300));

        resolver.resolve("ref").await.unwrap();
        resolver.resolve("ref").await.unwrap();
        assert_eq!(store.lookups(), 1);

        tokio::time::advance(Duration::from_secs(301)).await;
        let config = resolver.resolve("ref").await.unwrap();
        assert_eq!(config.source_id, "example");
        assert_eq!(store.lookups(), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_lookup() {
        let mut store = MockSecretStore::with("ref", GOOD);
        store.delay = Duration::from_millis(20);
        let store = Arc::new(store);
        let resolver = Arc::new(resolver(store.clone(), Duration::from_secs(300)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r = resolver.clone();
                tokio::spawn(async move { r.resolve("ref").await.map(|c| c.source_id) })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "example");
        }
        assert_eq!(store.lookups(), 1);
        assert_eq!(resolver.cache().pending_misses().await, 0);
    }

    #[tokio::test]
    async fn missing_secret_is_config_error_and_not_cached() {
        let store = Arc::new(MockSecretStore::with("other", GOOD));
        let resolver = resolver(store.clone(), Duration::from_secs(300));

        let err = resolver.resolve("ref").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        resolver.resolve("ref").await.unwrap_err();
        assert_eq!(store.lookups(), 2);
        assert_eq!(resolver.cache().pending_misses().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out_as_config_error() {
        let mut store = MockSecretStore::with("ref", GOOD);
        store.delay = Duration::from_secs(30);
        let resolver = resolver(Arc::new(store), Duration::from_secs(300))
            .with_lookup_timeout(Duration::from_secs(5));

        let err = resolver.resolve("ref").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert!(resolver.cache().is_empty().await);
    }

    #[test]
    fn malformed_secrets_are_rejected() {
        let cases = [
            "not json",
            r#"{"endpoint":"https://x.io"}"#,
            r#"{"endpoint":"ftp://x.io","authToken":"t","sourceId":"s"}"#,
            r#"{"endpoint":"https://x.io","authToken":" ","sourceId":"s"}"#,
            r#"{"endpoint":"https://x.io","authToken":"t","sourceId":"a/b"}"#,
        ];
        for raw in cases {
            let err = parse_source_config("ref", raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConfigError, "{}", raw);
        }
    }
}
