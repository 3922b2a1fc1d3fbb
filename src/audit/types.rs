// Audit log types and structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::admission::AdmissionResult;

/// Audit log entry representing a single auditable event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique identifier for the audit entry
    pub id: String,
    /// Timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
    /// Identity the event concerns
    pub identity_key: Option<String>,
    /// Device fingerprint involved, if any
    pub device_fingerprint: Option<String>,
    /// Administrator who performed the action (admin events only)
    pub actor: Option<String>,
    /// IP address of the requester
    pub ip_address: String,
    /// User agent string from the request
    pub user_agent: Option<String>,
    pub action: AuditAction,
    pub level: AuditLevel,
    pub success: bool,
    pub error_message: Option<String>,
    /// Additional metadata about the event
    pub metadata: HashMap<String, String>,
}

/// Types of auditable actions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Admission outcomes
    DeviceAdmitted,
    DeviceReadmitted,
    UnknownIdentity,
    DeviceLimitReached,
    AdmissionFailed,

    // Student actions
    ProfileUpdated,
    TestResultSubmitted,

    // Admin actions
    IdentityProvisioned,
    IdentityDeleted,
    DeviceRemoved,
    DevicesCleared,
}

impl AuditAction {
    /// Get a string representation of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::DeviceAdmitted => "device_admitted",
            AuditAction::DeviceReadmitted => "device_readmitted",
            AuditAction::UnknownIdentity => "unknown_identity",
            AuditAction::DeviceLimitReached => "device_limit_reached",
            AuditAction::AdmissionFailed => "admission_failed",
            AuditAction::ProfileUpdated => "profile_updated",
            AuditAction::TestResultSubmitted => "test_result_submitted",
            AuditAction::IdentityProvisioned => "identity_provisioned",
            AuditAction::IdentityDeleted => "identity_deleted",
            AuditAction::DeviceRemoved => "device_removed",
            AuditAction::DevicesCleared => "devices_cleared",
        }
    }
}

impl From<AdmissionResult> for AuditAction {
    fn from(result: AdmissionResult) -> Self {
        match result {
            AdmissionResult::Admitted => AuditAction::DeviceAdmitted,
            AdmissionResult::AlreadyAdmitted => AuditAction::DeviceReadmitted,
            AdmissionResult::IdentityNotFound => AuditAction::UnknownIdentity,
            AdmissionResult::CapacityExceeded => AuditAction::DeviceLimitReached,
            AdmissionResult::StoreUnavailable => AuditAction::AdmissionFailed,
        }
    }
}

/// Severity level of audit events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    /// Informational events (normal operations)
    Info,
    /// Warning events (unusual but not critical)
    Warning,
    /// Security-relevant events
    Security,
}

/// Query parameters for searching audit logs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    /// Filter by identity key
    pub identity_key: Option<String>,
    /// Filter by action type
    pub action: Option<AuditAction>,
    /// Filter by minimum severity level
    pub min_level: Option<AuditLevel>,
    /// Maximum number of results to return
    pub limit: Option<usize>,
}

impl AuditEntry {
    /// Create a new audit entry builder
    pub fn builder() -> AuditEntryBuilder {
        AuditEntryBuilder::default()
    }
}

/// Builder for creating audit entries
#[derive(Default)]
pub struct AuditEntryBuilder {
    identity_key: Option<String>,
    device_fingerprint: Option<String>,
    actor: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    action: Option<AuditAction>,
    level: Option<AuditLevel>,
    success: Option<bool>,
    error_message: Option<String>,
    metadata: HashMap<String, String>,
}

impl AuditEntryBuilder {
    pub fn identity_key(mut self, identity_key: impl Into<String>) -> Self {
        self.identity_key = Some(identity_key.into());
        self
    }

    pub fn device_fingerprint(mut self, device_fingerprint: impl Into<String>) -> Self {
        self.device_fingerprint = Some(device_fingerprint.into());
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn level(mut self, level: AuditLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self.success = Some(false);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> AuditEntry {
        AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            identity_key: self.identity_key,
            device_fingerprint: self.device_fingerprint,
            actor: self.actor,
            ip_address: self.ip_address.unwrap_or_else(|| "unknown".to_string()),
            user_agent: self.user_agent,
            action: self.action.unwrap_or(AuditAction::AdmissionFailed),
            level: self.level.unwrap_or(AuditLevel::Info),
            success: self.success.unwrap_or(true),
            error_message: self.error_message,
            metadata: self.metadata,
        }
    }
}
