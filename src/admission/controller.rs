// Device admission controller

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::metrics::prometheus_metrics::{record_admission, record_store_duration};
use crate::models::AdmissionSettings;
use crate::storage::{AdmitOutcome, IdentityStore, StorageError, with_deadline};

/// Admission configuration
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Maximum registered devices per identity
    pub device_cap: usize,
    /// Deadline for the backing store operation
    pub store_timeout: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            device_cap: 3,
            store_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&AdmissionSettings> for AdmissionConfig {
    fn from(settings: &AdmissionSettings) -> Self {
        Self {
            device_cap: settings.device_cap,
            store_timeout: settings.store_timeout(),
        }
    }
}

/// Outcome of an admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionResult {
    /// New device registered
    Admitted,
    /// Device was already registered; only the login time changed
    AlreadyAdmitted,
    /// No identity is provisioned under the key; nothing changed
    IdentityNotFound,
    /// Device cap reached; nothing changed
    CapacityExceeded,
    /// The identity store failed or missed its deadline; safe to retry
    StoreUnavailable,
}

impl AdmissionResult {
    /// Whether the caller should let the device in
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            AdmissionResult::Admitted | AdmissionResult::AlreadyAdmitted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionResult::Admitted => "admitted",
            AdmissionResult::AlreadyAdmitted => "already_admitted",
            AdmissionResult::IdentityNotFound => "identity_not_found",
            AdmissionResult::CapacityExceeded => "capacity_exceeded",
            AdmissionResult::StoreUnavailable => "store_unavailable",
        }
    }

    /// Message shown to the end user
    pub fn user_message(&self) -> &'static str {
        match self {
            AdmissionResult::Admitted => "Device registered successfully",
            AdmissionResult::AlreadyAdmitted => "Device already registered",
            AdmissionResult::IdentityNotFound => "Phone number not found",
            AdmissionResult::CapacityExceeded => "Device limit reached. Please contact admin.",
            AdmissionResult::StoreUnavailable => {
                "Service temporarily unavailable, please try again"
            }
        }
    }
}

impl From<AdmitOutcome> for AdmissionResult {
    fn from(outcome: AdmitOutcome) -> Self {
        if !outcome.record_found {
            AdmissionResult::IdentityNotFound
        } else if outcome.already_present {
            AdmissionResult::AlreadyAdmitted
        } else if outcome.admitted {
            AdmissionResult::Admitted
        } else {
            AdmissionResult::CapacityExceeded
        }
    }
}

/// Decides whether a device may open a session for an identity
pub struct AdmissionController {
    store: Arc<dyn IdentityStore>,
    config: AdmissionConfig,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn IdentityStore>, config: AdmissionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Admit `device_fingerprint` for `identity_key`.
    ///
    /// Known devices are always re-admitted; new devices are admitted only while
    /// the identity holds fewer than `device_cap` devices. The whole decision is
    /// a single store operation, so concurrent logins for one identity can never
    /// push it past the cap. No retries happen here.
    pub async fn admit(&self, identity_key: &str, device_fingerprint: &str) -> AdmissionResult {
        // Provisioning never creates an empty key, and an empty fingerprint
        // cannot identify a device, so neither reaches the store.
        if identity_key.is_empty() || device_fingerprint.is_empty() {
            debug!("Rejecting admission with empty identity key or fingerprint");
            record_admission(AdmissionResult::IdentityNotFound);
            return AdmissionResult::IdentityNotFound;
        }

        let started = Instant::now();
        let outcome = with_deadline(
            self.config.store_timeout,
            self.store.atomic_admit(
                identity_key,
                device_fingerprint,
                self.config.device_cap,
                Utc::now(),
            ),
        )
        .await;
        record_store_duration("atomic_admit", started.elapsed().as_secs_f64());

        let result = match outcome {
            Ok(outcome) => AdmissionResult::from(outcome),
            Err(StorageError::Timeout(after)) => {
                warn!(
                    "Identity store timed out after {}ms admitting device for {}",
                    after.as_millis(),
                    identity_key
                );
                AdmissionResult::StoreUnavailable
            }
            Err(e) => {
                error!("Identity store error admitting device for {}: {}", identity_key, e);
                AdmissionResult::StoreUnavailable
            }
        };

        match result {
            AdmissionResult::Admitted => {
                info!("Admitted new device for {}", identity_key)
            }
            AdmissionResult::AlreadyAdmitted => {
                debug!("Known device re-admitted for {}", identity_key)
            }
            AdmissionResult::IdentityNotFound => {
                debug!("Admission for unknown identity {}", identity_key)
            }
            AdmissionResult::CapacityExceeded => info!(
                "Device limit ({}) reached for {}",
                self.config.device_cap, identity_key
            ),
            AdmissionResult::StoreUnavailable => {}
        }

        record_admission(result);
        result
    }
}
