use crate::error::{ErrorKind, IngestError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Input to a single invocation. Never mutated once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionRequest {
    pub secret_reference: String,
    pub raw_bucket: String,
    #[serde(default)]
    pub query_parameters: BTreeMap<String, String>,
    pub invocation_id: String,
}

/// Source configuration resolved from a secret reference.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    pub endpoint: String,
    #[serde(alias = "authToken")]
    pub auth_token: String,
    #[serde(alias = "sourceId")]
    pub source_id: String,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &"<redacted>")
            .field("source_id", &self.source_id)
            .finish()
    }
}

/// A fully buffered response from the source.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status_code: u16,
    pub raw_body: Vec<u8>,
    pub attempt_count: u32,
}

/// `<sourceId>/<invocationId>.json`. Downstream consumers parse this path to
/// recover the source id; the format is fixed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub const SUFFIX: &'static str = ".json";

    pub fn derive(source_id: &str, invocation_id: &str) -> Result<Self, InvalidKeyComponent> {
        validate_component("source id", source_id)?;
        validate_component("invocation id", invocation_id)?;
        Ok(StorageKey(format!(
            "{}/{}{}",
            source_id,
            invocation_id,
            Self::SUFFIX
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn source_id(&self) -> &str {
        self.0.split_once('/').map(|(s, _)| s).unwrap_or_default()
    }

    pub fn invocation_id(&self) -> &str {
        self.0
            .split_once('/')
            .and_then(|(_, rest)| rest.strip_suffix(Self::SUFFIX))
            .unwrap_or_default()
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {component} '{value}': {reason}")]
pub struct InvalidKeyComponent {
    pub component: &'static str,
    pub value: String,
    pub reason: &'static str,
}

pub(crate) fn validate_component(component: &'static str, value: &str) -> Result<(), InvalidKeyComponent> {
    let reason = if value.is_empty() {
        "must not be empty"
    } else if value.contains('/') {
        "must not contain '/'"
    } else if value.chars().any(char::is_control) {
        "must not contain control characters"
    } else {
        return Ok(());
    };
    Err(InvalidKeyComponent {
        component,
        value: value.to_string(),
        reason,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Partial,
    Failure,
}

/// What the caller receives once an invocation finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionOutcome {
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

impl IngestionOutcome {
    pub fn success(key: &StorageKey, attempts: u32, record_count: u64) -> Self {
        Self {
            status: OutcomeStatus::Success,
            record_count: Some(record_count),
            error_kind: None,
            storage_key: Some(key.to_string()),
            attempts: Some(attempts),
        }
    }

    pub fn partial(key: &StorageKey, attempts: u32) -> Self {
        Self {
            status: OutcomeStatus::Partial,
            record_count: None,
            error_kind: None,
            storage_key: Some(key.to_string()),
            attempts: Some(attempts),
        }
    }

    pub fn failure(err: &IngestError) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            record_count: None,
            error_kind: Some(err.kind()),
            storage_key: None,
            attempts: err.attempts(),
        }
    }
}
