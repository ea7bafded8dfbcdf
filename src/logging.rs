use crate::config::LoggingSettings;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes logging with console output and a daily-rotated JSON file.
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the life of the process.
pub fn init_logging(settings: &LoggingSettings) -> Option<WorkerGuard> {
    // Determine filter: respect RUST_LOG if set; otherwise info for our crate
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("raw_ingest=info,warn"));

    // Outcome JSON goes to stdout, so console logs go to stderr
    let console_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match fs::create_dir_all(&settings.dir) {
        Ok(()) => {
            let file_appender = tracing_appender::rolling::daily(&settings.dir, &settings.file_name);
            let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
            (Some(fmt::layer().json().with_writer(non_blocking_writer)), Some(guard))
        }
        Err(e) => {
            eprintln!("log directory {} unavailable: {}", settings.dir.display(), e);
            (None, None)
        }
    };

    // a global subscriber may already be installed
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    guard
}
