//! Maps every failure the pipeline can observe onto the fixed [`ErrorKind`]
//! taxonomy. Nothing here performs I/O.

use crate::app::ports::{ObjectStoreError, SecretStoreError, TransportError};
use crate::error::{BoxError, IngestError};
use crate::fetcher::retry::RetryPolicy;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    Transient,
    Permanent,
}

pub fn classify_status(status: u16, policy: &RetryPolicy) -> ResponseClass {
    if (200..=299).contains(&status) {
        ResponseClass::Success
    } else if policy.is_retryable_status(status) {
        ResponseClass::Transient
    } else {
        ResponseClass::Permanent
    }
}

/// Timeouts and network failures may succeed on a later attempt; a request
/// that could not even be built never will.
pub fn classify_transport(err: &TransportError) -> ResponseClass {
    match err {
        TransportError::Timeout(_) | TransportError::Network { .. } => ResponseClass::Transient,
        TransportError::InvalidRequest(_) => ResponseClass::Permanent,
    }
}

pub fn secret_failure(reference: &str, err: SecretStoreError) -> IngestError {
    let reason = match &err {
        SecretStoreError::NotFound(_) => "secret not found",
        SecretStoreError::Unavailable { .. } => "secret store unreachable",
    };
    IngestError::config_caused_by(reference, reason, err)
}

pub fn malformed_secret(reference: &str, err: serde_json::Error) -> IngestError {
    IngestError::config_caused_by(reference, "secret is not a valid source configuration", err)
}

pub fn exhausted(attempts: u32, last_status: Option<u16>, last_error: Option<TransportError>) -> IngestError {
    let cause = match (&last_error, last_status) {
        (Some(e), _) => e.to_string(),
        (None, Some(status)) => format!("source kept answering {}", status),
        (None, None) => "no attempt was made".to_string(),
    };
    IngestError::TransientNetwork {
        attempts,
        last_status,
        cause,
        source: last_error.map(|e| Box::new(e) as BoxError),
    }
}

pub fn storage_failure(container: &str, key: &str, err: ObjectStoreError) -> IngestError {
    IngestError::StorageWrite {
        container: container.to_string(),
        key: key.to_string(),
        source: Box::new(err),
    }
}

/// Number of top-level elements of a JSON array or object body.
///
/// Invalid JSON and scalar documents are both `SerializationError`.
pub fn count_records(body: &[u8]) -> Result<u64, IngestError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| IngestError::Serialization {
        reason: "body is not valid JSON".to_string(),
        source: Some(e),
    })?;
    match value {
        Value::Array(items) => Ok(items.len() as u64),
        Value::Object(map) => Ok(map.len() as u64),
        other => Err(IngestError::Serialization {
            reason: format!("top-level JSON {} has no record count", json_type(&other)),
            source: None,
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
