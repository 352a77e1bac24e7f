use std::{collections::HashMap, path::Path};

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::GatewayConfig;

/// Prefix of environment overrides, e.g. `GATEWAY__AUTH__JWT_SECRET`.
pub const ENV_PREFIX: &str = "GATEWAY";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from a file layered over the built-in defaults and
/// under the process environment.
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<GatewayConfig> {
    load_config_sync(Some(config_path), None)
}

/// Load configuration synchronously.
///
/// `config_path` may be `None` (or point to a missing file) to run purely
/// from defaults and environment. `env_overrides` replaces the process
/// environment as the override source when given.
pub fn load_config_sync(
    config_path: Option<&str>,
    env_overrides: Option<HashMap<String, String>>,
) -> Result<GatewayConfig> {
    let defaults =
        Config::try_from(&GatewayConfig::default()).wrap_err("Failed to serialize defaults")?;

    let mut builder = Config::builder().add_source(defaults);

    if let Some(path) = config_path {
        let config_path = Path::new(path);

        // Determine file format based on extension
        let format = match config_path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            Some("toml") => FileFormat::Toml,
            _ => FileFormat::Yaml, // Default to YAML
        };

        if !config_path.exists() {
            tracing::warn!(
                path = %config_path.display(),
                "Config file not found, using defaults and environment"
            );
        }

        builder = builder.add_source(File::new(path, format).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(env_overrides),
    );

    let settings = builder
        .build()
        .with_context(|| format!("Failed to build config from {config_path:?}"))?;

    let gateway_config: GatewayConfig = settings
        .try_deserialize()
        .with_context(|| format!("Failed to deserialize config from {config_path:?}"))?;

    Ok(gateway_config)
}
