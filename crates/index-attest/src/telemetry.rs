//! Logging setup for the binary.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;
use crate::error::{AttestError, Result};

/// Parse `log.level`.
///
/// A bare word must be a level name (`trace` through `error`, or `off`);
/// anything with `=` or `,` is taken as a full filter directive.
pub fn level_filter(level: &str) -> Result<EnvFilter> {
    let invalid =
        |reason: String| AttestError::InvalidConfig(format!("invalid log.level {:?}: {}", level, reason));
    if !level.contains(['=', ',']) {
        level
            .trim()
            .parse::<LevelFilter>()
            .map_err(|e| invalid(e.to_string()))?;
    }
    EnvFilter::try_new(level).map_err(|e| invalid(e.to_string()))
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `log.level`; an unusable `log.level` is an error.
/// When `log.file` is set, output is
/// appended to it; if it cannot be opened, logs go to stdout and a warning
/// is emitted once the subscriber is up.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.level)?,
    };

    let mut file_error = None;
    let file = config.file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| file_error = Some((path.clone(), e)))
            .ok()
    });

    let (file_layer, stdout_layer) = match file {
        Some(file) => (
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file))),
            None,
        ),
        None => (None, Some(fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    if let Some((path, error)) = file_error {
        tracing::warn!(path = %path.display(), %error, "cannot open log file, logging to stdout");
    }
    Ok(())
}
