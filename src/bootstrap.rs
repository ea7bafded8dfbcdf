use crate::app::ports::{ObjectStorePort, SecretStorePort};
use crate::app::IngestUseCase;
use crate::config::{IngestSettings, SecretsBackend, StorageBackend};
use crate::fetcher::HttpFetcher;
use crate::infra::{
    EnvSecretStore, FileSecretStore, FsObjectStore, InMemoryObjectStore, ReqwestHttp,
    SupabaseObjectStore, SupabaseSettings,
};
use crate::resolver::{ConfigResolver, SecretCache};
use crate::writer::ObjectWriter;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub fn secret_store(settings: &IngestSettings) -> Arc<dyn SecretStorePort> {
    match settings.secrets.backend {
        SecretsBackend::File => Arc::new(FileSecretStore::new(&settings.secrets.path)),
        SecretsBackend::Env => Arc::new(EnvSecretStore::new(settings.secrets.env_prefix.clone())),
    }
}

pub fn object_store(settings: &IngestSettings) -> anyhow::Result<Arc<dyn ObjectStorePort>> {
    Ok(match settings.storage.backend {
        StorageBackend::Fs => Arc::new(FsObjectStore::new(&settings.storage.root)),
        StorageBackend::Memory => Arc::new(InMemoryObjectStore::new()),
        StorageBackend::Supabase => {
            let supabase = SupabaseSettings::from_env().context("Supabase storage is not configured")?;
            Arc::new(SupabaseObjectStore::new(supabase, settings.storage_write_budget())?)
        }
    })
}

/// Wires the full pipeline from settings. The cache is passed in so a
/// long-lived worker can share one across invocations.
pub fn build_use_case(settings: &IngestSettings, cache: Arc<SecretCache>) -> anyhow::Result<IngestUseCase> {
    let resolver = ConfigResolver::new(secret_store(settings), cache)
        .with_lookup_timeout(settings.secret_lookup_budget());
    let http = ReqwestHttp::new(&settings.http.user_agent).context("failed to build HTTP client")?;
    let fetcher = HttpFetcher::new(Arc::new(http), settings.retry.clone(), settings.attempt_timeout());
    let store = object_store(settings)?;
    info!(
        secrets = ?settings.secrets.backend,
        storage = store.name(),
        max_attempts = settings.retry.max_attempts,
        "ingestion pipeline ready"
    );
    let writer = ObjectWriter::new(store, settings.storage.encryption.clone());
    Ok(IngestUseCase::new(resolver, fetcher, writer))
}
