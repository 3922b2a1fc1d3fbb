// Audit log storage backends

use super::types::{AuditEntry, AuditQuery};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Trait for audit log storage backends
#[async_trait]
pub trait AuditStorage: Send + Sync {
    /// Store an audit entry
    async fn store(&self, entry: AuditEntry) -> Result<(), String>;

    /// Query audit entries, most recent first
    async fn query(&self, query: AuditQuery) -> Result<Vec<AuditEntry>, String>;
}

/// In-memory audit storage implementation
/// Keeps the most recent `capacity` entries
pub struct MemoryAuditStorage {
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
    capacity: usize,
}

impl MemoryAuditStorage {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }
}

impl Default for MemoryAuditStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStorage for MemoryAuditStorage {
    async fn store(&self, entry: AuditEntry) -> Result<(), String> {
        let mut entries = self.entries.write().await;
        debug!("Storing audit entry: {:?}", entry.action);

        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
        Ok(())
    }

    async fn query(&self, query: AuditQuery) -> Result<Vec<AuditEntry>, String> {
        let entries = self.entries.read().await;
        let limit = query.limit.unwrap_or(100);

        // Entries are appended in time order, so walking backwards is newest first
        let results = entries
            .iter()
            .rev()
            .filter(|entry| {
                // Filter by identity_key
                if let Some(ref identity_key) = query.identity_key
                    && entry.identity_key.as_ref() != Some(identity_key)
                {
                    return false;
                }

                // Filter by action
                if let Some(action) = query.action
                    && entry.action != action
                {
                    return false;
                }

                // Filter by minimum level
                if let Some(min_level) = query.min_level
                    && entry.level < min_level
                {
                    return false;
                }

                true
            })
            .take(limit)
            .cloned()
            .collect();

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::types::{AuditAction, AuditLevel};

    fn entry(identity_key: &str, action: AuditAction, level: AuditLevel) -> AuditEntry {
        AuditEntry::builder()
            .identity_key(identity_key)
            .action(action)
            .level(level)
            .build()
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let storage = MemoryAuditStorage::new();
        storage
            .store(entry("+1", AuditAction::DeviceAdmitted, AuditLevel::Info))
            .await
            .unwrap();
        storage
            .store(entry("+2", AuditAction::DeviceAdmitted, AuditLevel::Info))
            .await
            .unwrap();
        storage
            .store(entry("+1", AuditAction::DeviceLimitReached, AuditLevel::Warning))
            .await
            .unwrap();

        let query = AuditQuery {
            identity_key: Some("+1".to_string()),
            ..Default::default()
        };
        let results = storage.query(query).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].action, AuditAction::DeviceLimitReached);

        let query = AuditQuery {
            min_level: Some(AuditLevel::Warning),
            ..Default::default()
        };
        assert_eq!(storage.query(query).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_drops_oldest() {
        let storage = MemoryAuditStorage::with_capacity(2);
        for key in ["+1", "+2", "+3"] {
            storage
                .store(entry(key, AuditAction::DeviceAdmitted, AuditLevel::Info))
                .await
                .unwrap();
        }

        let results = storage.query(AuditQuery::default()).await.unwrap();
        let keys: Vec<_> = results
            .iter()
            .filter_map(|e| e.identity_key.as_deref())
            .collect();
        assert_eq!(keys, vec!["+3", "+2"]);
    }
}
