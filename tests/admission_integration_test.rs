use chrono::Utc;
use ielts_auth_api::admission::{AdmissionConfig, AdmissionController, AdmissionResult};
use ielts_auth_api::models::{IdentityRecord, IdentityRole, NewIdentity};
use ielts_auth_api::storage::IdentityStore;
use ielts_auth_api::storage::memory::MemoryIdentityStore;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn identity(identity_key: &str) -> IdentityRecord {
    IdentityRecord::new(
        NewIdentity {
            identity_key: identity_key.to_string(),
            name: Some("Test".to_string()),
            surname: None,
            role: IdentityRole::Student,
        },
        Utc::now(),
    )
}

async fn controller_with(
    identity_keys: &[&str],
    device_cap: usize,
) -> (Arc<MemoryIdentityStore>, Arc<AdmissionController>) {
    let store = Arc::new(MemoryIdentityStore::new());
    for key in identity_keys {
        store.create(identity(key)).await.unwrap();
    }

    let controller = AdmissionController::new(
        store.clone(),
        AdmissionConfig {
            device_cap,
            store_timeout: Duration::from_secs(5),
        },
    );
    (store, Arc::new(controller))
}

/// cap + k concurrent logins with distinct devices: exactly cap get in
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_devices_respect_cap() {
    const CAP: usize = 3;
    const EXTRA: usize = 17;

    let (store, controller) = controller_with(&["+998771234567"], CAP).await;

    let handles: Vec<_> = (0..CAP + EXTRA)
        .map(|i| {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .admit("+998771234567", &format!("device-{}", i))
                    .await
            })
        })
        .collect();

    let mut admitted = 0;
    let mut denied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            AdmissionResult::Admitted => admitted += 1,
            AdmissionResult::CapacityExceeded => denied += 1,
            other => panic!("unexpected result {:?}", other),
        }
    }

    assert_eq!(admitted, CAP);
    assert_eq!(denied, EXTRA);

    let record = store.get("+998771234567").await.unwrap().unwrap();
    assert_eq!(record.device_count, CAP);
    assert_eq!(record.registered_devices.len(), CAP);
}

/// The same device racing with itself is registered once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_device_registers_once() {
    let (store, controller) = controller_with(&["+1"], 3).await;

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let controller = controller.clone();
            tokio::spawn(async move { controller.admit("+1", "phone").await })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.is_success());
        if result == AdmissionResult::Admitted {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(store.get("+1").await.unwrap().unwrap().device_count, 1);
}

/// Contention on one identity does not change outcomes for another
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_identities_are_independent_under_load() {
    let (store, controller) = controller_with(&["+1", "+2"], 2).await;

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let controller = controller.clone();
            let key = if i % 2 == 0 { "+1" } else { "+2" };
            tokio::spawn(async move { controller.admit(key, &format!("d{}", i)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    for key in ["+1", "+2"] {
        let record = store.get(key).await.unwrap().unwrap();
        assert_eq!(record.device_count, 2);
    }
}

#[tokio::test]
async fn test_cap_boundary_and_readmission() {
    let (store, controller) = controller_with(&["+1"], 3).await;

    for fp in ["A", "B", "C"] {
        assert_eq!(controller.admit("+1", fp).await, AdmissionResult::Admitted);
    }
    let full = store.get("+1").await.unwrap().unwrap();

    assert_eq!(
        controller.admit("+1", "D").await,
        AdmissionResult::CapacityExceeded
    );
    assert_eq!(store.get("+1").await.unwrap().unwrap(), full);

    // Known devices still get in at capacity
    for fp in ["C", "A"] {
        assert_eq!(
            controller.admit("+1", fp).await,
            AdmissionResult::AlreadyAdmitted
        );
    }

    let record = store.get("+1").await.unwrap().unwrap();
    assert_eq!(record.registered_devices, full.registered_devices);
    assert_eq!(record.device_count, 3);
    assert!(record.last_login_at >= full.last_login_at);
}

#[tokio::test]
async fn test_repeated_admission_is_idempotent() {
    let (store, controller) = controller_with(&["+1"], 3).await;

    assert_eq!(controller.admit("+1", "A").await, AdmissionResult::Admitted);
    for _ in 0..5 {
        assert_eq!(
            controller.admit("+1", "A").await,
            AdmissionResult::AlreadyAdmitted
        );
    }

    let record = store.get("+1").await.unwrap().unwrap();
    assert_eq!(record.device_count, 1);
}

#[derive(Debug, Clone)]
enum Op {
    Admit(u8),
    Remove(u8),
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0u8..8).prop_map(Op::Admit),
        2 => (0u8..8).prop_map(Op::Remove),
        1 => Just(Op::Clear),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_device_count_matches_set_and_never_exceeds_cap(
        device_cap in 1usize..5,
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let (store, controller) = controller_with(&["+1"], device_cap).await;

            for op in &ops {
                let before = store.get("+1").await.unwrap().unwrap();
                match op {
                    Op::Admit(d) => {
                        let fp = format!("device-{}", d);
                        let result = controller.admit("+1", &fp).await;
                        let expected = if before.has_device(&fp) {
                            AdmissionResult::AlreadyAdmitted
                        } else if before.device_count >= device_cap {
                            AdmissionResult::CapacityExceeded
                        } else {
                            AdmissionResult::Admitted
                        };
                        assert_eq!(result, expected);
                    }
                    Op::Remove(d) => {
                        store.remove_device("+1", &format!("device-{}", d)).await.unwrap();
                    }
                    Op::Clear => {
                        store.clear_devices("+1").await.unwrap();
                    }
                }

                let after = store.get("+1").await.unwrap().unwrap();
                assert_eq!(after.device_count, after.registered_devices.len());
                assert!(after.device_count <= device_cap);
            }
        });
    }
}
