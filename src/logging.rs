//! Logging Module
//!
//! Structured logging with file output for diagnostics.

use tracing_subscriber::{fmt, EnvFilter, prelude::*};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::config;

/// Initialize logging with console and file output.
///
/// Log files rotate daily under `<data dir>/logs`.
pub fn init(data_dir: &std::path::Path) {
    let log_dir = config::log_dir(data_dir);

    // Ensure log directory exists
    let _ = std::fs::create_dir_all(&log_dir);

    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &log_dir,
        "tourfleet.log",
    );

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(file_appender);

    // Console layer (debug builds only)
    #[cfg(debug_assertions)]
    let console_layer = Some(
        fmt::layer()
            .with_target(true)
            .pretty()
    );

    #[cfg(not(debug_assertions))]
    let console_layer: Option<fmt::Layer<_>> = None;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            #[cfg(debug_assertions)]
            { EnvFilter::new("debug,hyper=warn,reqwest=warn") }
            #[cfg(not(debug_assertions))]
            { EnvFilter::new("info,hyper=warn,reqwest=warn") }
        });

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer);

    // Ignored if a subscriber is already installed (tests)
    let _ = tracing::subscriber::set_global_default(subscriber);
}
