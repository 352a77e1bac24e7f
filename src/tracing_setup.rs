use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Build the level filter: `RUST_LOG` wins over the configured level.
fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}")),
    }
}

/// Initialize logging from the `logging` configuration section.
///
/// JSON lines by default, with the current request span flattened into each
/// event so `request_id` travels with every log line of a request.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(&config.level)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if config.json {
        Registry::default()
            .with(filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
            .wrap_err("Failed to install tracing subscriber")?;
    } else {
        Registry::default()
            .with(filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
            .wrap_err("Failed to install tracing subscriber")?;
    }

    tracing::info!(
        level = %config.level,
        json = config.json,
        "Gateway logging initialized"
    );
    Ok(())
}

/// Console logging for the CLI subcommands that do not serve traffic.
pub fn init_console_tracing() -> Result<()> {
    Registry::default()
        .with(env_filter("warn")?)
        .with(tracing_subscriber::fmt::layer().compact().with_target(false))
        .try_init()
        .wrap_err("Failed to install tracing subscriber")
}
