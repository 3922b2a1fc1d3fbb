use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use super::identity::NewIdentity;

pub const DEFAULT_JWT_SECRET: &str = "your-secret-key-change-this-in-production";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub admission: AdmissionSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionSettings,
    /// Identities provisioned at startup if they don't exist yet
    #[serde(default)]
    pub identities: Vec<NewIdentity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

/// Device admission settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionSettings {
    /// Maximum registered devices per identity (default: 3)
    #[serde(default = "default_device_cap")]
    pub device_cap: usize,
    /// Deadline for a single identity store operation (default: 2000ms)
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

impl AdmissionSettings {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            device_cap: default_device_cap(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

fn default_device_cap() -> usize {
    3
}

fn default_store_timeout_ms() -> u64 {
    2000
}

/// Identity store backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    #[default]
    Memory,
    Redis {
        url: String,
        #[serde(default = "default_key_prefix")]
        key_prefix: String,
    },
}

fn default_key_prefix() -> String {
    "ielts".to_string()
}

/// Session token settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Token lifetime in seconds (default: 86400 = 24 hours)
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: i64,
}

impl SessionSettings {
    /// Whether the secret is still the published default
    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            expiration_secs: default_expiration_secs(),
        }
    }
}

fn default_jwt_secret() -> String {
    DEFAULT_JWT_SECRET.to_string()
}

fn default_expiration_secs() -> i64 {
    86400
}

impl AppConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.admission.device_cap == 0 {
            return Err("admission.device_cap must be at least 1".to_string());
        }

        if self.admission.store_timeout_ms == 0 {
            return Err("admission.store_timeout_ms must be greater than zero".to_string());
        }

        if self.session.jwt_secret.is_empty() {
            return Err("session.jwt_secret must not be empty".to_string());
        }

        if self.session.expiration_secs <= 0 {
            return Err("session.expiration_secs must be positive".to_string());
        }

        if let StorageConfig::Redis { url, .. } = &self.storage
            && url.is_empty()
        {
            return Err("Redis storage must have a url".to_string());
        }

        let mut seen = HashSet::new();
        for identity in &self.identities {
            // Keys are stored trimmed, so " +1" and "+1" are the same identity
            let identity_key = identity.identity_key.trim();
            if identity_key.is_empty() {
                return Err("Seed identities must have a non-empty identity_key".to_string());
            }
            if !seen.insert(identity_key) {
                return Err(format!(
                    "Seed identity '{}' is listed more than once",
                    identity_key
                ));
            }
        }

        Ok(())
    }
}
