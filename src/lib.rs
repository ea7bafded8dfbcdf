pub mod bootstrap;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod observability;
pub mod resolver;
pub mod types;
pub mod writer;

// Layered boundaries for application and infrastructure
pub mod app;
pub mod infra;

pub use app::IngestUseCase;
pub use error::{ErrorKind, IngestError};
pub use types::{IngestionOutcome, IngestionRequest, OutcomeStatus, StorageKey};
