use crate::models::{AppConfig, StorageConfig};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Arc<AppConfig>, String> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

    let config = parse_config(&contents)?;

    info!(
        "Configuration loaded: device cap {}, store timeout {}ms, {} seed identity(ies)",
        config.admission.device_cap,
        config.admission.store_timeout_ms,
        config.identities.len()
    );
    match &config.storage {
        StorageConfig::Memory => info!("  Identity store: memory"),
        StorageConfig::Redis { key_prefix, .. } => {
            info!("  Identity store: redis (prefix '{}')", key_prefix)
        }
    }

    Ok(Arc::new(config))
}

/// Parse and validate YAML configuration, applying environment overrides
pub fn parse_config(contents: &str) -> Result<AppConfig, String> {
    let mut config: AppConfig = serde_yaml::from_str(contents)
        .map_err(|e| format!("Failed to parse YAML config: {}", e))?;

    apply_env_overrides(&mut config);
    config.validate()?;

    Ok(config)
}

/// Load configuration with fallback options
///
/// Order: `CONFIG_PATH`, then `config.yaml`/`config.yml` in the working
/// directory, then built-in defaults (memory store, no seed identities).
pub fn load_config_with_fallback() -> Result<Arc<AppConfig>, String> {
    let config_path = std::env::var("CONFIG_PATH").ok();
    resolve_config(config_path.as_deref(), &["config.yaml", "config.yml"])
}

/// Load `config_path` if set, otherwise the first candidate file that exists.
/// Defaults apply only when there is no file at all; a file that fails to
/// load or validate is an error.
pub fn resolve_config(
    config_path: Option<&str>,
    candidates: &[&str],
) -> Result<Arc<AppConfig>, String> {
    if let Some(path) = config_path {
        return load_config(path).map_err(|e| format!("CONFIG_PATH ({}): {}", path, e));
    }

    for path in candidates {
        if Path::new(path).exists() {
            return load_config(path);
        }
    }

    warn!("No configuration file found, using defaults (in-memory store, no identities)");
    let mut config = AppConfig::default();
    apply_env_overrides(&mut config);
    config.validate()?;

    Ok(Arc::new(config))
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        config.session.jwt_secret = secret;
    }

    if config.session.uses_default_secret() {
        warn!("Using the published default JWT secret; set JWT_SECRET in production");
    }
}
