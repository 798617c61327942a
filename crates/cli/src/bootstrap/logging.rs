use glory_hole_domain::config::LoggingConfig;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

pub type LogReloadHandle = reload::Handle<EnvFilter, Registry>;

/// Initialize the subscriber and hand back a reload handle so the log
/// level can follow configuration hot reloads.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LogReloadHandle> {
    let filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(filter);
    let registry = tracing_subscriber::registry().with(filter_layer);

    let json = config.format.eq_ignore_ascii_case("json");
    match config.output.as_str() {
        "file" => {
            let path = config
                .file_path
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("logging.output = \"file\" needs file_path"))?;
            let file = Arc::new(
                std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?,
            );
            if json {
                registry.with(fmt::layer().json().with_writer(file)).init();
            } else {
                registry
                    .with(fmt::layer().with_ansi(false).with_writer(file))
                    .init();
            }
        }
        "stderr" => {
            if json {
                registry
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .init();
            } else {
                registry.with(fmt::layer().with_writer(std::io::stderr)).init();
            }
        }
        _ => {
            if json {
                registry.with(fmt::layer().json()).init();
            } else {
                registry.with(fmt::layer()).init();
            }
        }
    }

    info!(level = %config.level, format = %config.format, "Logging initialized");
    Ok(handle)
}

/// Apply a new level from a reloaded configuration.
pub fn set_level(handle: &LogReloadHandle, level: &str) {
    match EnvFilter::try_new(level) {
        Ok(filter) => {
            if handle.reload(filter).is_ok() {
                info!(level = %level, "Log level updated");
            }
        }
        Err(e) => tracing::warn!(level = %level, error = %e, "Invalid log level; keeping current"),
    }
}
