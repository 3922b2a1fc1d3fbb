use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::storage::AdmitOutcome;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IdentityRole {
    #[default]
    Student,
    Admin,
}

/// A registrant keyed by an opaque identity key (a phone number in practice)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityRecord {
    pub identity_key: String,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub photo_url: Option<String>,
    #[serde(default)]
    pub role: IdentityRole,
    /// Registered device fingerprints. Always `device_count` long.
    pub registered_devices: BTreeSet<String>,
    pub device_count: usize,
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_tests: u64,
    pub last_test_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl IdentityRecord {
    /// Create a record for a freshly provisioned identity (no devices yet)
    /// The key is stored trimmed, matching how login reads it.
    pub fn new(identity: NewIdentity, now: DateTime<Utc>) -> Self {
        Self {
            identity_key: identity.identity_key.trim().to_string(),
            name: identity.name,
            surname: identity.surname,
            photo_url: None,
            role: identity.role,
            registered_devices: BTreeSet::new(),
            device_count: 0,
            last_login_at: None,
            total_tests: 0,
            last_test_at: None,
            created_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == IdentityRole::Admin
    }

    pub fn has_device(&self, device_fingerprint: &str) -> bool {
        self.registered_devices.contains(device_fingerprint)
    }

    /// Check-and-update for one admission attempt.
    ///
    /// Callers must hold exclusive access to the record for the whole call;
    /// the check against `cap` and the insertion are only atomic together.
    pub fn try_admit(
        &mut self,
        device_fingerprint: &str,
        cap: usize,
        now: DateTime<Utc>,
    ) -> AdmitOutcome {
        if self.has_device(device_fingerprint) {
            self.last_login_at = Some(now);
            return AdmitOutcome::already_present(self.device_count);
        }

        if self.device_count >= cap {
            return AdmitOutcome::capacity_exceeded(self.device_count);
        }

        self.registered_devices.insert(device_fingerprint.to_string());
        self.device_count = self.registered_devices.len();
        self.last_login_at = Some(now);

        AdmitOutcome::admitted(self.device_count)
    }

    /// Remove a single device. Returns false if it was not registered.
    pub fn remove_device(&mut self, device_fingerprint: &str) -> bool {
        let removed = self.registered_devices.remove(device_fingerprint);
        self.device_count = self.registered_devices.len();
        removed
    }

    /// Remove every device, returning how many were registered
    pub fn clear_devices(&mut self) -> usize {
        let cleared = self.registered_devices.len();
        self.registered_devices.clear();
        self.device_count = 0;
        cleared
    }

    pub fn apply_profile_update(&mut self, update: ProfileUpdate) {
        if let Some(name) = update.name {
            self.name = Some(name);
        }
        if let Some(surname) = update.surname {
            self.surname = Some(surname);
        }
        if let Some(photo_url) = update.photo_url {
            self.photo_url = Some(photo_url);
        }
    }

    pub fn record_test(&mut self, completed_at: DateTime<Utc>) {
        self.total_tests += 1;
        self.last_test_at = Some(completed_at);
    }
}

/// Provisioning payload, used by the admin API and by configuration seeding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIdentity {
    pub identity_key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub role: IdentityRole,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identity_key: String,
    pub device_fingerprint: String,
}

/// Public view of an identity (devices are not exposed to the owner)
#[derive(Debug, Serialize)]
pub struct IdentityInfo {
    pub identity_key: String,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub photo_url: Option<String>,
    pub role: IdentityRole,
    pub device_count: usize,
    pub last_login_at: Option<DateTime<Utc>>,
    pub total_tests: u64,
    pub last_test_at: Option<DateTime<Utc>>,
}

impl From<IdentityRecord> for IdentityInfo {
    fn from(record: IdentityRecord) -> Self {
        Self {
            identity_key: record.identity_key,
            name: record.name,
            surname: record.surname,
            photo_url: record.photo_url,
            role: record.role,
            device_count: record.device_count,
            last_login_at: record.last_login_at,
            total_tests: record.total_tests,
            last_test_at: record.last_test_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub token: String,
    pub user: IdentityInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Identity key
    pub device: String,
    pub role: IdentityRole,
    pub exp: usize,
}
