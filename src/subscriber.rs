//! Logging initialization for applications embedding the runtime.
//!
//! The library itself never calls this; a host or core binary does, once,
//! at startup.

use std::fs::OpenOptions;
use std::io::{self, IsTerminal};
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Initialize the tracing subscriber based on configuration.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| LoggingError::InvalidFilter(e.to_string()))?;

    tracing_subscriber::registry()
        .with(build_layer(config)?)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

/// Build the formatting layer for `config` without installing it.
pub fn build_layer(config: &LoggingConfig) -> Result<BoxedLayer, LoggingError> {
    match config.output.as_str() {
        "stdout" => Ok(format_layer(
            config,
            config.color && io::stdout().is_terminal(),
            io::stdout,
        )),
        "stderr" => Ok(format_layer(
            config,
            config.color && io::stderr().is_terminal(),
            io::stderr,
        )),
        path => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| LoggingError::FileOpen(path.to_string(), e))?;
            Ok(format_layer(config, false, Mutex::new(file)))
        }
    }
}

fn format_layer<W>(config: &LoggingConfig, ansi: bool, writer: W) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_ansi(ansi)
        .with_target(config.target)
        .with_span_events(FmtSpan::NONE)
        .with_writer(writer);

    match (config.format, config.timestamps) {
        (LogFormat::Text, true) => layer.boxed(),
        (LogFormat::Text, false) => layer.without_time().boxed(),
        (LogFormat::Json, true) => layer.json().boxed(),
        (LogFormat::Json, false) => layer.json().without_time().boxed(),
    }
}

/// Errors that can occur during logging initialization.
#[derive(Error, Debug)]
pub enum LoggingError {
    /// Invalid log filter string.
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    /// Failed to open log file.
    #[error("Failed to open log file '{0}': {1}")]
    FileOpen(String, #[source] io::Error),

    /// A global subscriber was already installed.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}
