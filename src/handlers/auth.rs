use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use tracing::{error, info};

use super::{ApiError, api_error, store_error};
use crate::admission::AdmissionResult;
use crate::models::{IdentityInfo, LoginRequest, LoginResponse};
use crate::state::AppState;
use crate::storage::with_deadline;

/// HTTP status for an admission outcome
pub fn admission_status(result: AdmissionResult) -> StatusCode {
    match result {
        AdmissionResult::Admitted | AdmissionResult::AlreadyAdmitted => StatusCode::OK,
        AdmissionResult::IdentityNotFound => StatusCode::NOT_FOUND,
        AdmissionResult::CapacityExceeded => StatusCode::FORBIDDEN,
        AdmissionResult::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    let identity_key = payload.identity_key.trim();
    let device_fingerprint = payload.device_fingerprint.trim();

    if identity_key.is_empty() || device_fingerprint.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Phone number and device fingerprint are required",
        ));
    }

    let result = state.controller.admit(identity_key, device_fingerprint).await;
    state
        .audit
        .log_admission(identity_key, device_fingerprint, result, &headers)
        .await;

    if !result.is_success() {
        return Err(api_error(
            admission_status(result),
            result.as_str(),
            result.user_message(),
        ));
    }

    // The identity can be deleted between admission and this read
    let record = with_deadline(state.store_timeout, state.store.get(identity_key))
        .await
        .map_err(store_error)?
        .ok_or_else(|| {
            let result = AdmissionResult::IdentityNotFound;
            api_error(admission_status(result), result.as_str(), result.user_message())
        })?;

    let token = state
        .sessions
        .issue(&record, device_fingerprint)
        .map_err(|e| {
            error!("Failed to create session token: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Failed to create token",
            )
        })?;

    info!(
        "Session opened for {} ({} of {} devices)",
        identity_key,
        record.device_count,
        state.controller.config().device_cap
    );

    Ok((
        StatusCode::OK,
        Json(LoginResponse {
            status: "success",
            message: result.user_message(),
            token,
            user: IdentityInfo::from(record),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppConfig, IdentityRecord, IdentityRole, NewIdentity};
    use crate::storage::IdentityStore;
    use crate::storage::memory::MemoryIdentityStore;
    use chrono::Utc;
    use std::sync::Arc;

    async fn state_with(identity_key: &str) -> AppState {
        let store = Arc::new(MemoryIdentityStore::new());
        store
            .create(IdentityRecord::new(
                NewIdentity {
                    identity_key: identity_key.to_string(),
                    name: Some("John".to_string()),
                    surname: None,
                    role: IdentityRole::Student,
                },
                Utc::now(),
            ))
            .await
            .unwrap();

        let mut config = AppConfig::default();
        config.admission.device_cap = 1;
        AppState::with_memory_audit(store, &config)
    }

    fn request(identity_key: &str, device_fingerprint: &str) -> Json<LoginRequest> {
        Json(LoginRequest {
            identity_key: identity_key.to_string(),
            device_fingerprint: device_fingerprint.to_string(),
        })
    }

    #[tokio::test]
    async fn test_login_issues_token() {
        let state = state_with("+1555").await;

        let (status, Json(response)) =
            login(State(state.clone()), HeaderMap::new(), request(" +1555 ", "fp-a"))
                .await
                .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.message, "Device registered successfully");
        assert_eq!(response.user.device_count, 1);

        let claims = state.sessions.validate(&response.token).unwrap();
        assert_eq!(claims.sub, "+1555");
        assert_eq!(claims.device, "fp-a");
    }

    #[tokio::test]
    async fn test_login_denials() {
        let state = state_with("+1555").await;

        login(State(state.clone()), HeaderMap::new(), request("+1555", "fp-a"))
            .await
            .unwrap();

        let (status, Json(body)) =
            login(State(state.clone()), HeaderMap::new(), request("+1555", "fp-b"))
                .await
                .unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Device limit reached. Please contact admin.");

        let (status, _) = login(State(state.clone()), HeaderMap::new(), request("+1999", "fp-a"))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = login(State(state), HeaderMap::new(), request("  ", "fp-a"))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_is_audited() {
        let state = state_with("+1555").await;

        login(State(state.clone()), HeaderMap::new(), request("+1555", "fp-a"))
            .await
            .unwrap();
        login(State(state.clone()), HeaderMap::new(), request("+1555", "fp-a"))
            .await
            .unwrap();

        let entries = state.audit.query(Default::default()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, crate::audit::AuditAction::DeviceReadmitted);
        assert_eq!(entries[1].action, crate::audit::AuditAction::DeviceAdmitted);
    }
}
