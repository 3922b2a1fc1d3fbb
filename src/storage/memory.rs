// In-memory identity store
// The map lock only guards membership; each identity has its own mutex, so
// admissions for different identities never wait on each other.

use super::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

struct IdentityEntry {
    record: IdentityRecord,
    results: Vec<TestResult>,
    /// Set when the entry is deleted while another task still holds its Arc
    removed: bool,
}

/// In-memory identity store
pub struct MemoryIdentityStore {
    entries: RwLock<HashMap<String, Arc<Mutex<IdentityEntry>>>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn entry(&self, identity_key: &str) -> Option<Arc<Mutex<IdentityEntry>>> {
        self.entries.read().await.get(identity_key).cloned()
    }
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get(&self, identity_key: &str) -> Result<Option<IdentityRecord>, StorageError> {
        let Some(entry) = self.entry(identity_key).await else {
            return Ok(None);
        };

        let entry = entry.lock().await;
        if entry.removed {
            return Ok(None);
        }
        Ok(Some(entry.record.clone()))
    }

    async fn atomic_admit(
        &self,
        identity_key: &str,
        device_fingerprint: &str,
        cap: usize,
        now: DateTime<Utc>,
    ) -> Result<AdmitOutcome, StorageError> {
        let Some(entry) = self.entry(identity_key).await else {
            return Ok(AdmitOutcome::not_found());
        };

        // No await points past this lock: the check and the insert cannot be
        // split by cancellation or by another admission for this identity.
        let mut entry = entry.lock().await;
        if entry.removed {
            return Ok(AdmitOutcome::not_found());
        }

        Ok(entry.record.try_admit(device_fingerprint, cap, now))
    }

    async fn create(&self, record: IdentityRecord) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&record.identity_key) {
            return Err(StorageError::AlreadyExists);
        }

        debug!("Creating identity {}", record.identity_key);
        entries.insert(
            record.identity_key.clone(),
            Arc::new(Mutex::new(IdentityEntry {
                record,
                results: Vec::new(),
                removed: false,
            })),
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<IdentityRecord>, StorageError> {
        let handles: Vec<Arc<Mutex<IdentityEntry>>> =
            self.entries.read().await.values().cloned().collect();

        let mut records = Vec::with_capacity(handles.len());
        for handle in handles {
            let entry = handle.lock().await;
            if !entry.removed {
                records.push(entry.record.clone());
            }
        }

        records.sort_by(|a, b| a.identity_key.cmp(&b.identity_key));
        Ok(records)
    }

    async fn delete(&self, identity_key: &str) -> Result<bool, StorageError> {
        let removed = self.entries.write().await.remove(identity_key);

        match removed {
            Some(entry) => {
                entry.lock().await.removed = true;
                debug!("Deleted identity {}", identity_key);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_profile(
        &self,
        identity_key: &str,
        update: ProfileUpdate,
    ) -> Result<Option<IdentityRecord>, StorageError> {
        let Some(entry) = self.entry(identity_key).await else {
            return Ok(None);
        };

        let mut entry = entry.lock().await;
        if entry.removed {
            return Ok(None);
        }

        entry.record.apply_profile_update(update);
        Ok(Some(entry.record.clone()))
    }

    async fn remove_device(
        &self,
        identity_key: &str,
        device_fingerprint: &str,
    ) -> Result<bool, StorageError> {
        let entry = self
            .entry(identity_key)
            .await
            .ok_or(StorageError::NotFound)?;

        let mut entry = entry.lock().await;
        if entry.removed {
            return Err(StorageError::NotFound);
        }

        Ok(entry.record.remove_device(device_fingerprint))
    }

    async fn clear_devices(&self, identity_key: &str) -> Result<usize, StorageError> {
        let entry = self
            .entry(identity_key)
            .await
            .ok_or(StorageError::NotFound)?;

        let mut entry = entry.lock().await;
        if entry.removed {
            return Err(StorageError::NotFound);
        }

        Ok(entry.record.clear_devices())
    }

    async fn record_test_result(
        &self,
        identity_key: &str,
        result: TestResult,
    ) -> Result<(), StorageError> {
        let entry = self
            .entry(identity_key)
            .await
            .ok_or(StorageError::NotFound)?;

        let mut entry = entry.lock().await;
        if entry.removed {
            return Err(StorageError::NotFound);
        }

        entry.record.record_test(result.completed_at);
        entry.results.push(result);
        Ok(())
    }

    async fn list_test_results(&self, identity_key: &str) -> Result<Vec<TestResult>, StorageError> {
        let entry = self
            .entry(identity_key)
            .await
            .ok_or(StorageError::NotFound)?;

        let entry = entry.lock().await;
        if entry.removed {
            return Err(StorageError::NotFound);
        }

        Ok(entry.results.iter().rev().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdentityRole, NewIdentity, TestSection};
    use std::time::Duration;

    fn new_record(identity_key: &str) -> IdentityRecord {
        IdentityRecord::new(
            NewIdentity {
                identity_key: identity_key.to_string(),
                name: None,
                surname: None,
                role: IdentityRole::Student,
            },
            Utc::now(),
        )
    }

    fn test_result(name: &str) -> TestResult {
        TestResult {
            id: uuid::Uuid::new_v4(),
            test_name: name.to_string(),
            section: TestSection::Listening,
            score: 30,
            max_score: 40,
            duration_secs: 1800,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let store = MemoryIdentityStore::new();
        store.create(new_record("+1")).await.unwrap();

        let err = store.create(new_record("+1")).await.unwrap_err();
        assert_eq!(err, StorageError::AlreadyExists);
    }

    #[tokio::test]
    async fn test_atomic_admit_unknown_identity() {
        let store = MemoryIdentityStore::new();
        let outcome = store.atomic_admit("+1", "fp", 3, Utc::now()).await.unwrap();
        assert_eq!(outcome, AdmitOutcome::not_found());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_then_admit_reports_not_found() {
        let store = MemoryIdentityStore::new();
        store.create(new_record("+1")).await.unwrap();

        assert!(store.delete("+1").await.unwrap());
        assert!(!store.delete("+1").await.unwrap());

        let outcome = store.atomic_admit("+1", "fp", 3, Utc::now()).await.unwrap();
        assert!(!outcome.record_found);
        assert!(store.get("+1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_device_removal_requires_identity() {
        let store = MemoryIdentityStore::new();
        assert_eq!(
            store.remove_device("+1", "fp").await.unwrap_err(),
            StorageError::NotFound
        );
        assert_eq!(
            store.clear_devices("+1").await.unwrap_err(),
            StorageError::NotFound
        );
    }

    #[tokio::test]
    async fn test_remove_device_frees_a_slot() {
        let store = MemoryIdentityStore::new();
        store.create(new_record("+1")).await.unwrap();
        let now = Utc::now();

        store.atomic_admit("+1", "a", 1, now).await.unwrap();
        assert!(!store.atomic_admit("+1", "b", 1, now).await.unwrap().admitted);

        assert!(store.remove_device("+1", "a").await.unwrap());
        assert!(store.atomic_admit("+1", "b", 1, now).await.unwrap().admitted);

        let record = store.get("+1").await.unwrap().unwrap();
        assert_eq!(record.device_count, 1);
        assert!(record.has_device("b"));
    }

    #[tokio::test]
    async fn test_test_results_newest_first() {
        let store = MemoryIdentityStore::new();
        store.create(new_record("+1")).await.unwrap();

        store
            .record_test_result("+1", test_result("first"))
            .await
            .unwrap();
        store
            .record_test_result("+1", test_result("second"))
            .await
            .unwrap();

        let results = store.list_test_results("+1").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].test_name, "second");

        let record = store.get("+1").await.unwrap().unwrap();
        assert_eq!(record.total_tests, 2);
        assert_eq!(record.last_test_at, Some(results[0].completed_at));
    }

    #[tokio::test]
    async fn test_locked_identity_does_not_block_others() {
        let store = Arc::new(MemoryIdentityStore::new());
        store.create(new_record("+1")).await.unwrap();
        store.create(new_record("+2")).await.unwrap();

        let busy = store.entry("+1").await.unwrap();
        let _guard = busy.lock().await;

        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            store.atomic_admit("+2", "fp", 3, Utc::now()),
        )
        .await
        .expect("admission for another identity must not wait")
        .unwrap();
        assert!(outcome.admitted);
    }
}
