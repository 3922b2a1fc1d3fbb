// Identity store abstraction
// Durable mapping from identity key to its registered devices, profile and test history

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{IdentityRecord, ProfileUpdate, StorageConfig, TestResult};

/// Storage backend trait for identity records
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get(&self, identity_key: &str) -> Result<Option<IdentityRecord>, StorageError>;

    /// Admit `device_fingerprint` for `identity_key` unless `cap` devices are
    /// already registered. Presence check, capacity check and insertion are one
    /// atomic step with respect to other calls for the same identity.
    async fn atomic_admit(
        &self,
        identity_key: &str,
        device_fingerprint: &str,
        cap: usize,
        now: DateTime<Utc>,
    ) -> Result<AdmitOutcome, StorageError>;

    /// Fails with `AlreadyExists` if the identity key is taken
    async fn create(&self, record: IdentityRecord) -> Result<(), StorageError>;

    async fn list(&self) -> Result<Vec<IdentityRecord>, StorageError>;

    /// Delete an identity together with its devices and history.
    /// Returns false if nothing was stored under the key.
    async fn delete(&self, identity_key: &str) -> Result<bool, StorageError>;

    async fn update_profile(
        &self,
        identity_key: &str,
        update: ProfileUpdate,
    ) -> Result<Option<IdentityRecord>, StorageError>;

    /// Returns false if the device was not registered; `NotFound` if the identity is missing
    async fn remove_device(
        &self,
        identity_key: &str,
        device_fingerprint: &str,
    ) -> Result<bool, StorageError>;

    /// Returns the number of devices removed; `NotFound` if the identity is missing
    async fn clear_devices(&self, identity_key: &str) -> Result<usize, StorageError>;

    /// Append to the history, bump `total_tests` and `last_test_at` in one step
    async fn record_test_result(
        &self,
        identity_key: &str,
        result: TestResult,
    ) -> Result<(), StorageError>;

    /// Test history, newest first
    async fn list_test_results(&self, identity_key: &str) -> Result<Vec<TestResult>, StorageError>;
}

/// Result of the atomic admission primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmitOutcome {
    pub record_found: bool,
    pub already_present: bool,
    pub admitted: bool,
    /// Device count after the operation (0 when the record is missing)
    pub device_count: usize,
}

impl AdmitOutcome {
    pub fn not_found() -> Self {
        Self {
            record_found: false,
            already_present: false,
            admitted: false,
            device_count: 0,
        }
    }

    pub fn already_present(device_count: usize) -> Self {
        Self {
            record_found: true,
            already_present: true,
            admitted: false,
            device_count,
        }
    }

    pub fn capacity_exceeded(device_count: usize) -> Self {
        Self {
            record_found: true,
            already_present: false,
            admitted: false,
            device_count,
        }
    }

    pub fn admitted(device_count: usize) -> Self {
        Self {
            record_found: true,
            already_present: false,
            admitted: true,
            device_count,
        }
    }
}

/// Storage errors
#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    NotFound,
    AlreadyExists,
    Timeout(Duration),
    ConnectionError(String),
    SerializationError(String),
    InvalidData(String),
}

impl StorageError {
    /// Whether the failure is an infrastructure fault the caller may retry
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StorageError::Timeout(_) | StorageError::ConnectionError(_)
        )
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NotFound => write!(f, "Item not found"),
            StorageError::AlreadyExists => write!(f, "Item already exists"),
            StorageError::Timeout(after) => {
                write!(f, "Operation timed out after {}ms", after.as_millis())
            }
            StorageError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            StorageError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            StorageError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Run a store operation under a deadline, surfacing expiry as `StorageError::Timeout`
pub async fn with_deadline<T, F>(timeout: Duration, operation: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout(timeout)),
    }
}

/// Factory function to create the identity store based on configuration
pub async fn create_identity_store(
    config: &StorageConfig,
) -> Result<Arc<dyn IdentityStore>, StorageError> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(memory::MemoryIdentityStore::new())),
        StorageConfig::Redis { url, key_prefix } => {
            let store = redis_store::RedisIdentityStore::connect(url, key_prefix).await?;
            Ok(Arc::new(store))
        }
    }
}
