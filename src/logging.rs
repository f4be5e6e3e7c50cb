//! Process-wide `tracing` subscriber setup.
//!
//! Logs go to `BRUNCH_LOG_FILE` (appended) when configured and to stderr
//! otherwise. `RUST_LOG` overrides the default filter.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::EnvConfig;

/// Where the installed subscriber writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    Stderr,
    File(PathBuf),
}

static SINK: OnceCell<LogSink> = OnceCell::new();

/// Installs the global subscriber once and reports where it writes.
///
/// Later calls return the sink chosen by the first call. A log file that
/// cannot be opened falls back to stderr; a subscriber installed elsewhere is
/// left in place.
pub fn init_logging(config: &EnvConfig) -> &'static LogSink {
    SINK.get_or_init(|| install(config))
}

/// Sink of the installed subscriber, if [`init_logging`] has run.
#[must_use]
pub fn installed_sink() -> Option<&'static LogSink> {
    SINK.get()
}

fn install(config: &EnvConfig) -> LogSink {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_log_directive()));

    if let Some(path) = config.log_file.as_deref().map(PathBuf::from) {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            if let Err(error) = std::fs::create_dir_all(parent) {
                eprintln!("[brunch] failed to create log directory {parent:?}: {error}");
            }
        }

        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                let subscriber = tracing_subscriber::registry().with(filter).with(
                    fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .with_target(true),
                );
                if tracing::subscriber::set_global_default(subscriber).is_ok() {
                    tracing::info!(path = %path.display(), "logging initialized");
                }
                return LogSink::File(path);
            }
            Err(error) => {
                eprintln!("[brunch] failed to open log file {path:?}: {error}");
            }
        }
    }

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true),
    );
    let _ = tracing::subscriber::set_global_default(subscriber);
    LogSink::Stderr
}
