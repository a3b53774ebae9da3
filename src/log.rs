//! Logger initialization.

use crate::config::LogConfig;
use anyhow::Context;
use std::fs::OpenOptions;
use std::sync::Once;

static LOGGER_ONCE: Once = Once::new();

/// Install `env_logger` as a global logger.
///
/// Filter comes from `RUST_LOG` if it set, otherwise from configuration. Subsequent calls do nothing.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let mut result = Ok(());
    LOGGER_ONCE.call_once(|| result = install(config));
    result
}

fn install(config: &LogConfig) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&config.level);
    if let Ok(filter) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filter);
    }

    if let Some(path) = &config.file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
        builder.write_style(env_logger::WriteStyle::Never);
    }

    builder.try_init().context("install logger")
}
