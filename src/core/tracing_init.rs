use crate::core::config::LoggingConfig;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Console output plus an optional append-only log file.
/// `RUST_LOG` takes precedence over the configured level, and `format`
/// applies to both outputs.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let use_json = config.format == "json";

    let console_layer = (config.console && !use_json).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_level(true)
            .with_ansi(true)
    });

    let json_layer = (config.console && use_json).then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
    });

    let file_layer = match &config.path {
        Some(path) => Some(file_layer(open_log_file(path)?, use_json)),
        None => None,
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(env_filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context(format!("Failed to open log file: {}", path.display()))
}

fn file_layer(file: File, use_json: bool) -> Box<dyn Layer<Registry> + Send + Sync> {
    if use_json {
        fmt::layer()
            .json()
            .with_writer(Mutex::new(file))
            .with_current_span(true)
            .with_span_list(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(Mutex::new(file))
            .with_target(false)
            .with_ansi(false)
            .boxed()
    }
}
