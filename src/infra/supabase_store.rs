use crate::app::ports::{EncryptionDirective, ObjectStoreError, ObjectStorePort, PutObject};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// Supabase Storage settings.
/// Config via env:
/// - SUPABASE_URL (e.g., https://xyzcompany.supabase.co) OR SUPABASE_PROJECT_REF
/// - SUPABASE_SERVICE_ROLE_KEY (service role key)
/// - SUPABASE_PREFIX (optional path prefix inside each bucket)
#[derive(Clone)]
pub struct SupabaseSettings {
    pub url: String,
    pub service_key: String,
    pub prefix: String,
}

impl std::fmt::Debug for SupabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseSettings")
            .field("url", &self.url)
            .field("service_key", &"<redacted>")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl SupabaseSettings {
    pub fn from_env() -> Result<Self, std::env::VarError> {
        // Allow either a full URL or a project ref
        let url = match std::env::var("SUPABASE_URL") {
            Ok(u) => u,
            Err(_) => {
                let project_ref = std::env::var("SUPABASE_PROJECT_REF")?;
                format!("https://{}.supabase.co", project_ref)
            }
        };
        Ok(Self {
            url,
            service_key: std::env::var("SUPABASE_SERVICE_ROLE_KEY")?,
            prefix: std::env::var("SUPABASE_PREFIX").unwrap_or_default(),
        })
    }
}

/// Uploads objects to Supabase Storage with `upsert=true`, so rewriting a key
/// replaces it. Each upload is a single request: the object either lands whole
/// or not at all.
pub struct SupabaseObjectStore {
    settings: SupabaseSettings,
    client: reqwest::Client,
}

impl SupabaseObjectStore {
    pub fn new(settings: SupabaseSettings, timeout: Duration) -> Result<Self, ObjectStoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { settings, client })
    }

    /// Builds the object URL with every bucket, prefix and key segment
    /// percent-encoded, so `?`, `#` and `%` stay part of the object name.
    pub fn object_url(&self, bucket: &str, key: &str) -> Result<reqwest::Url, ObjectStoreError> {
        let mut url = reqwest::Url::parse(&self.settings.url)
            .map_err(|e| ObjectStoreError::Invalid(format!("invalid Supabase URL: {}", e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ObjectStoreError::Invalid("Supabase URL cannot carry a path".into()))?;
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "object", bucket]);
            segments.extend(self.settings.prefix.split('/').filter(|s| !s.is_empty()));
            segments.extend(key.split('/'));
        }
        Ok(url)
    }
}

#[async_trait]
impl ObjectStorePort for SupabaseObjectStore {
    async fn put(&self, object: PutObject) -> Result<(), ObjectStoreError> {
        let endpoint = self.object_url(&object.container, &object.key)?;
        let key = &self.settings.service_key;
        let mut request = self
            .client
            .put(endpoint)
            .header("Authorization", format!("Bearer {}", key))
            .header("apikey", key.clone())
            .header(CONTENT_TYPE, object.content_type)
            .header("x-amz-server-side-encryption", object.encryption.header_value())
            .query(&[("upsert", "true")]);
        if let EncryptionDirective::Kms { key_id } = &object.encryption {
            request = request.header("x-amz-server-side-encryption-aws-kms-key-id", key_id.clone());
        }

        let resp = request.body(object.body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Rejected { status: status.as_u16(), body });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "supabase"
    }
}
