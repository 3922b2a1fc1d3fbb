use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use std::time::Instant;

use super::{ApiError, api_error, store_error};
use crate::audit::AuditAction;
use crate::metrics::{record_store_duration, record_test_submitted};
use crate::middleware::AuthUser;
use crate::models::{SubmitResultRequest, TestResult};
use crate::state::AppState;
use crate::storage::with_deadline;

pub async fn submit_result(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    headers: HeaderMap,
    Json(payload): Json<SubmitResultRequest>,
) -> Result<(StatusCode, Json<TestResult>), ApiError> {
    payload
        .validate()
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, "invalid_request", e))?;

    let result = payload.into_result(Utc::now());

    let started = Instant::now();
    let stored = with_deadline(
        state.store_timeout,
        state
            .store
            .record_test_result(&auth_user.identity_key, result.clone()),
    )
    .await;
    record_store_duration("record_test_result", started.elapsed().as_secs_f64());
    stored.map_err(store_error)?;

    record_test_submitted(result.section);
    state
        .audit
        .log_identity_action(
            AuditAction::TestResultSubmitted,
            &auth_user.identity_key,
            &auth_user.device_fingerprint,
            &headers,
        )
        .await;

    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn list_results(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<Vec<TestResult>>), ApiError> {
    let results = with_deadline(
        state.store_timeout,
        state.store.list_test_results(&auth_user.identity_key),
    )
    .await
    .map_err(store_error)?;

    Ok((StatusCode::OK, Json(results)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppConfig, IdentityRecord, IdentityRole, NewIdentity, TestSection};
    use crate::storage::IdentityStore;
    use crate::storage::memory::MemoryIdentityStore;
    use std::sync::Arc;

    async fn setup() -> (AppState, AuthUser) {
        let store = Arc::new(MemoryIdentityStore::new());
        store
            .create(IdentityRecord::new(
                NewIdentity {
                    identity_key: "+1555".to_string(),
                    name: None,
                    surname: None,
                    role: IdentityRole::Student,
                },
                Utc::now(),
            ))
            .await
            .unwrap();

        let auth_user = AuthUser {
            identity_key: "+1555".to_string(),
            device_fingerprint: "fp-a".to_string(),
            role: IdentityRole::Student,
        };
        (
            AppState::with_memory_audit(store, &AppConfig::default()),
            auth_user,
        )
    }

    fn submission(test_name: &str, score: u32, max_score: u32) -> Json<SubmitResultRequest> {
        Json(SubmitResultRequest {
            test_name: test_name.to_string(),
            section: TestSection::Reading,
            score,
            max_score,
            duration_secs: 3600,
        })
    }

    #[tokio::test]
    async fn test_submit_updates_history_and_totals() {
        let (state, auth_user) = setup().await;

        for name in ["Cambridge 18 Test 1", "Cambridge 18 Test 2"] {
            let (status, _) = submit_result(
                State(state.clone()),
                Extension(auth_user.clone()),
                HeaderMap::new(),
                submission(name, 30, 40),
            )
            .await
            .unwrap();
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, Json(history)) = list_results(State(state.clone()), Extension(auth_user))
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].test_name, "Cambridge 18 Test 2");

        let record = state.store.get("+1555").await.unwrap().unwrap();
        assert_eq!(record.total_tests, 2);
        assert_eq!(record.last_test_at, Some(history[0].completed_at));
    }

    #[tokio::test]
    async fn test_submit_rejects_score_above_max() {
        let (state, auth_user) = setup().await;

        let (status, _) = submit_result(
            State(state.clone()),
            Extension(auth_user),
            HeaderMap::new(),
            submission("Cambridge 18 Test 1", 41, 40),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let record = state.store.get("+1555").await.unwrap().unwrap();
        assert_eq!(record.total_tests, 0);
    }
}
