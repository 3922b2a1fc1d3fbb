// Audit logger implementation

use super::storage::AuditStorage;
use super::types::{AuditAction, AuditEntry, AuditLevel, AuditQuery};
use crate::admission::AdmissionResult;
use axum::http::HeaderMap;
use std::sync::Arc;
use tracing::{error, info};

/// Audit logger for admission and admin events
#[derive(Clone)]
pub struct AuditLogger {
    storage: Arc<dyn AuditStorage>,
}

impl AuditLogger {
    pub fn new(storage: Arc<dyn AuditStorage>) -> Self {
        Self { storage }
    }

    /// Log an audit event
    /// Storage failures are logged and swallowed
    pub async fn log(&self, entry: AuditEntry) {
        info!(
            "Audit: {} for {:?} by {:?} - success: {}",
            entry.action.as_str(),
            entry.identity_key,
            entry.actor,
            entry.success
        );

        if let Err(e) = self.storage.store(entry).await {
            error!("Failed to store audit entry: {}", e);
        }
    }

    /// Log the outcome of a login attempt
    pub async fn log_admission(
        &self,
        identity_key: &str,
        device_fingerprint: &str,
        result: AdmissionResult,
        headers: &HeaderMap,
    ) {
        let level = match result {
            AdmissionResult::Admitted | AdmissionResult::AlreadyAdmitted => AuditLevel::Info,
            AdmissionResult::StoreUnavailable => AuditLevel::Warning,
            AdmissionResult::IdentityNotFound | AdmissionResult::CapacityExceeded => {
                AuditLevel::Security
            }
        };

        let mut builder = AuditEntry::builder()
            .identity_key(identity_key)
            .device_fingerprint(device_fingerprint)
            .ip_address(Self::extract_ip(headers))
            .action(result.into())
            .level(level)
            .metadata("result", result.as_str());

        if let Some(user_agent) = Self::extract_user_agent(headers) {
            builder = builder.user_agent(user_agent);
        }

        builder = if result.is_success() {
            builder.success(true)
        } else {
            builder.error(result.user_message())
        };

        self.log(builder.build()).await;
    }

    /// Log an action taken by the identity on its own account
    pub async fn log_identity_action(
        &self,
        action: AuditAction,
        identity_key: &str,
        device_fingerprint: &str,
        headers: &HeaderMap,
    ) {
        let entry = AuditEntry::builder()
            .identity_key(identity_key)
            .device_fingerprint(device_fingerprint)
            .ip_address(Self::extract_ip(headers))
            .action(action)
            .level(AuditLevel::Info)
            .success(true)
            .build();

        self.log(entry).await;
    }

    /// Log admin action (identity and device management)
    pub async fn log_admin_action(
        &self,
        action: AuditAction,
        identity_key: &str,
        admin_key: &str,
        headers: &HeaderMap,
        device_fingerprint: Option<&str>,
    ) {
        let mut builder = AuditEntry::builder()
            .identity_key(identity_key)
            .actor(admin_key)
            .ip_address(Self::extract_ip(headers))
            .action(action)
            .level(AuditLevel::Security)
            .success(true);

        if let Some(fingerprint) = device_fingerprint {
            builder = builder.device_fingerprint(fingerprint);
        }

        self.log(builder.build()).await;
    }

    pub async fn query(&self, query: AuditQuery) -> Result<Vec<AuditEntry>, String> {
        self.storage.query(query).await
    }

    /// Extract client IP address from proxy headers
    pub fn extract_ip(headers: &HeaderMap) -> String {
        headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .or_else(|| headers.get("x-real-ip").and_then(|h| h.to_str().ok()))
            .unwrap_or("unknown")
            .to_string()
    }

    pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
        headers
            .get("user-agent")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::storage::MemoryAuditStorage;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_log_admission_denied() {
        let storage = Arc::new(MemoryAuditStorage::new());
        let logger = AuditLogger::new(storage.clone());

        logger
            .log_admission(
                "+1555",
                "fp-d",
                AdmissionResult::CapacityExceeded,
                &HeaderMap::new(),
            )
            .await;

        let query = AuditQuery {
            identity_key: Some("+1555".to_string()),
            action: Some(AuditAction::DeviceLimitReached),
            ..Default::default()
        };

        let results = logger.query(query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(results[0].level, AuditLevel::Security);
        assert_eq!(results[0].device_fingerprint.as_deref(), Some("fp-d"));
    }

    #[tokio::test]
    async fn test_log_admin_action_records_actor() {
        let storage = Arc::new(MemoryAuditStorage::new());
        let logger = AuditLogger::new(storage.clone());

        logger
            .log_admin_action(
                AuditAction::DeviceRemoved,
                "+1555",
                "admin",
                &HeaderMap::new(),
                Some("fp-a"),
            )
            .await;

        let results = storage.query(AuditQuery::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].actor.as_deref(), Some("admin"));
        assert!(results[0].success);
    }

    #[test]
    fn test_extract_ip() {
        let mut headers = HeaderMap::new();
        assert_eq!(AuditLogger::extract_ip(&headers), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(AuditLogger::extract_ip(&headers), "10.0.0.2");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(AuditLogger::extract_ip(&headers), "203.0.113.7");
    }
}
