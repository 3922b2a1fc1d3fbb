// Shared application state for handlers and middleware

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::admission::{AdmissionConfig, AdmissionController};
use crate::audit::{AuditLogger, AuditStorage, MemoryAuditStorage};
use crate::auth::SessionTokens;
use crate::models::{AppConfig, IdentityRecord, NewIdentity};
use crate::storage::{IdentityStore, StorageError, with_deadline};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IdentityStore>,
    pub controller: Arc<AdmissionController>,
    pub sessions: Arc<SessionTokens>,
    pub audit: AuditLogger,
    /// Deadline applied to every store call made outside the controller
    pub store_timeout: Duration,
}

impl AppState {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        config: &AppConfig,
        audit_storage: Arc<dyn AuditStorage>,
    ) -> Self {
        let admission = AdmissionConfig::from(&config.admission);
        let store_timeout = admission.store_timeout;

        Self {
            controller: Arc::new(AdmissionController::new(store.clone(), admission)),
            store,
            sessions: Arc::new(SessionTokens::from(&config.session)),
            audit: AuditLogger::new(audit_storage),
            store_timeout,
        }
    }

    /// State with an in-memory audit trail
    pub fn with_memory_audit(store: Arc<dyn IdentityStore>, config: &AppConfig) -> Self {
        Self::new(store, config, Arc::new(MemoryAuditStorage::new()))
    }
}

/// Provision the configured seed identities, leaving existing ones untouched.
/// Returns how many were created.
pub async fn seed_identities(
    store: &dyn IdentityStore,
    identities: &[NewIdentity],
    timeout: Duration,
) -> Result<usize, StorageError> {
    let mut created = 0;

    for identity in identities {
        let record = IdentityRecord::new(identity.clone(), Utc::now());
        match with_deadline(timeout, store.create(record)).await {
            Ok(()) => {
                debug!("Seeded identity {}", identity.identity_key);
                created += 1;
            }
            Err(StorageError::AlreadyExists) => {
                debug!("Seed identity {} already exists", identity.identity_key);
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        "Seeded {} of {} configured identity(ies)",
        created,
        identities.len()
    );
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IdentityRole;
    use crate::storage::memory::MemoryIdentityStore;

    fn seed(identity_key: &str) -> NewIdentity {
        NewIdentity {
            identity_key: identity_key.to_string(),
            name: Some("Seed".to_string()),
            surname: None,
            role: IdentityRole::Student,
        }
    }

    #[tokio::test]
    async fn test_seed_skips_existing() {
        let store = MemoryIdentityStore::new();
        let timeout = Duration::from_secs(1);

        let created = seed_identities(&store, &[seed("+1"), seed("+2")], timeout)
            .await
            .unwrap();
        assert_eq!(created, 2);

        let created = seed_identities(&store, &[seed("+2"), seed("+3")], timeout)
            .await
            .unwrap();
        assert_eq!(created, 1);
        assert_eq!(store.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_seeded_keys_are_trimmed_for_login() {
        let store = Arc::new(MemoryIdentityStore::new());
        seed_identities(store.as_ref(), &[seed(" +1555 ")], Duration::from_secs(1))
            .await
            .unwrap();

        assert!(store.get("+1555").await.unwrap().is_some());

        let state = AppState::with_memory_audit(store, &AppConfig::default());
        assert_eq!(
            state.controller.admit("+1555", "fp-a").await,
            crate::admission::AdmissionResult::Admitted
        );
    }
}
