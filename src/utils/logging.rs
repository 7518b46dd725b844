//! Structured logging setup.
//!
//! Installs a `tracing-subscriber` registry built from [`LoggingConfig`]:
//! console output goes to stderr, file output is appended to
//! `log_file_path`, and either may be plain text or JSON. `RUST_LOG` takes
//! precedence over the configured level when it is set.

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing::{info, Level};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::{EngineError, Result};

type FilterLayer = reload::Layer<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Layered<FilterLayer, Registry>> + Send + Sync>;

/// Returned by [`init_logging`]; adjusts the active filter at runtime.
#[derive(Clone)]
pub struct LoggingHandle {
    filter: reload::Handle<EnvFilter, Registry>,
}

impl LoggingHandle {
    /// Replace the active filter with a single global level.
    pub fn set_level(&self, level: Level) -> Result<()> {
        self.filter
            .reload(level_filter(level))
            .map_err(|e| EngineError::ConfigError(format!("Failed to change log level: {e}")))?;
        info!(%level, "Log level changed");
        Ok(())
    }
}

fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::default().add_directive(LevelFilter::from_level(level).into())
}

fn output_layer<W>(json: bool, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(ansi);
    if json {
        Box::new(layer.json())
    } else {
        Box::new(layer)
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingHandle> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(config.log_level));
    let (filter, handle) = reload::Layer::new(filter);

    let mut outputs: Vec<BoxedLayer> = Vec::new();
    if config.log_to_console {
        outputs.push(output_layer(config.json_format, io::stderr, !config.json_format));
    }
    if config.log_to_file {
        let path = config.log_file_path.as_deref().ok_or_else(|| {
            EngineError::ConfigError("log_file_path must be set when log_to_file is true".into())
        })?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| EngineError::ConfigError(format!("Failed to open log file {path}: {e}")))?;
        outputs.push(output_layer(config.json_format, Mutex::new(file), false));
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(outputs)
        .try_init()
        .map_err(|e| EngineError::ConfigError(format!("Failed to install logger: {e}")))?;

    info!(
        app = %config.app_name,
        level = %config.log_level,
        json = config.json_format,
        "Logging initialised"
    );
    Ok(LoggingHandle { filter: handle })
}
