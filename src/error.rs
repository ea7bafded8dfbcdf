use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Boxed underlying cause carried by every classified failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The fixed failure taxonomy an invocation can terminate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ConfigError,
    TransientNetworkError,
    PermanentHttpError,
    StorageWriteError,
    SerializationError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::TransientNetworkError => "TransientNetworkError",
            ErrorKind::PermanentHttpError => "PermanentHttpError",
            ErrorKind::StorageWriteError => "StorageWriteError",
            ErrorKind::SerializationError => "SerializationError",
        }
    }

    /// Whether resubmitting the same invocation (same invocation id) can succeed
    /// without changing configuration.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::TransientNetworkError | ErrorKind::StorageWriteError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("configuration error for '{reference}': {reason}")]
    Config {
        reference: String,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("transient network failure after {attempts} attempt(s){}: {cause}", status_suffix(.last_status))]
    TransientNetwork {
        attempts: u32,
        last_status: Option<u16>,
        cause: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("permanent HTTP error: status {status} after {attempts} attempt(s)")]
    PermanentHttp { status: u16, attempts: u32 },

    #[error("storage write failed for '{container}/{key}'")]
    StorageWrite {
        container: String,
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("payload could not be counted as JSON: {reason}")]
    Serialization {
        reason: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (last status {})", code),
        None => String::new(),
    }
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Config { .. } => ErrorKind::ConfigError,
            IngestError::TransientNetwork { .. } => ErrorKind::TransientNetworkError,
            IngestError::PermanentHttp { .. } => ErrorKind::PermanentHttpError,
            IngestError::StorageWrite { .. } => ErrorKind::StorageWriteError,
            IngestError::Serialization { .. } => ErrorKind::SerializationError,
        }
    }

    pub fn config(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        IngestError::Config {
            reference: reference.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub fn config_caused_by(
        reference: impl Into<String>,
        reason: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        IngestError::Config {
            reference: reference.into(),
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    /// Fetch attempts made before this error, when the error came out of the fetch stage.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            IngestError::TransientNetwork { attempts, .. }
            | IngestError::PermanentHttp { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// An invocation ran past its time budget and was abandoned mid-stage. No
/// outcome exists for it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invocation exceeded its {budget:?} budget")]
pub struct BudgetExceeded {
    pub budget: std::time::Duration,
}
