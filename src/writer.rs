use crate::app::ports::{EncryptionDirective, ObjectStorePort, PutObject};
use crate::classifier;
use crate::error::{IngestError, Result};
use crate::observability::metrics;
use crate::types::StorageKey;
use std::sync::Arc;
use tracing::{info, warn};

/// Writes raw payloads under their deterministic key. Every write carries the
/// configured encryption directive.
pub struct ObjectWriter {
    store: Arc<dyn ObjectStorePort>,
    encryption: EncryptionDirective,
}

impl ObjectWriter {
    pub fn new(store: Arc<dyn ObjectStorePort>, encryption: EncryptionDirective) -> Self {
        Self { store, encryption }
    }

    pub async fn write(
        &self,
        raw_bucket: &str,
        source_id: &str,
        invocation_id: &str,
        body: Vec<u8>,
    ) -> Result<StorageKey> {
        let key = StorageKey::derive(source_id, invocation_id)
            .map_err(|e| IngestError::config_caused_by(invocation_id, "cannot derive storage key", e))?;
        let bytes = body.len();
        let backend = self.store.name();

        // single attempt; the key makes a caller-level retry an overwrite
        let put = PutObject {
            container: raw_bucket.to_string(),
            key: key.as_str().to_string(),
            body,
            content_type: "application/json",
            encryption: self.encryption.clone(),
        };
        match self.store.put(put).await {
            Ok(()) => {
                metrics::storage::write_success(backend, bytes);
                info!(container = raw_bucket, key = %key, bytes, backend, "stored raw payload");
                Ok(key)
            }
            Err(e) => {
                metrics::storage::write_error(backend);
                warn!(container = raw_bucket, key = %key, backend, error = %e, "storage write failed");
                Err(classifier::storage_failure(raw_bucket, key.as_str(), e))
            }
        }
    }
}
