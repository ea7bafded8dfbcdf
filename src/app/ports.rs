use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

// Secret-side ports
#[async_trait]
pub trait SecretStorePort: Send + Sync {
    /// Returns the raw secret document stored under `reference`.
    async fn get_secret(&self, reference: &str) -> Result<String, SecretStoreError>;
}

#[derive(Error, Debug)]
pub enum SecretStoreError {
    #[error("secret '{0}' not found")]
    NotFound(String),

    #[error("secret store unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

// Fetch-side ports
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    /// Performs exactly one GET attempt and buffers the whole body.
    async fn get(&self, request: &HttpGetRequest) -> Result<HttpGetResult, TransportError>;
}

#[derive(Clone, Debug)]
pub struct HttpGetRequest {
    pub url: String,
    pub query: BTreeMap<String, String>,
    pub bearer_token: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct HttpGetResult {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network failure: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

// Storage-side ports
#[async_trait]
pub trait ObjectStorePort: Send + Sync {
    /// Writes the whole object or nothing.
    async fn put(&self, object: PutObject) -> Result<(), ObjectStoreError>;

    fn name(&self) -> &'static str;
}

/// Server-side encryption requested for a stored object. Has no plaintext variant.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum EncryptionDirective {
    #[default]
    Aes256,
    Kms { key_id: String },
}

impl EncryptionDirective {
    /// Value for the `x-amz-server-side-encryption` header.
    pub fn header_value(&self) -> &'static str {
        match self {
            EncryptionDirective::Aes256 => "AES256",
            EncryptionDirective::Kms { .. } => "aws:kms",
        }
    }
}

#[derive(Clone, Debug)]
pub struct PutObject {
    pub container: String,
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub encryption: EncryptionDirective,
}

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend rejected write: {status} - {body}")]
    Rejected { status: u16, body: String },

    #[error("backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid object: {0}")]
    Invalid(String),
}
