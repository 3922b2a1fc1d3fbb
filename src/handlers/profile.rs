use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use super::{ApiError, api_error, store_error};
use crate::audit::AuditAction;
use crate::middleware::AuthUser;
use crate::models::{IdentityInfo, ProfileUpdate};
use crate::state::AppState;
use crate::storage::with_deadline;

fn identity_gone() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", "Identity not found")
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<IdentityInfo>), ApiError> {
    let record = with_deadline(state.store_timeout, state.store.get(&auth_user.identity_key))
        .await
        .map_err(store_error)?
        .ok_or_else(identity_gone)?;

    Ok((StatusCode::OK, Json(IdentityInfo::from(record))))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    headers: HeaderMap,
    Json(update): Json<ProfileUpdate>,
) -> Result<(StatusCode, Json<IdentityInfo>), ApiError> {
    if update
        .name
        .as_deref()
        .is_some_and(|name| name.trim().is_empty())
    {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Name must not be empty",
        ));
    }

    let record = with_deadline(
        state.store_timeout,
        state.store.update_profile(&auth_user.identity_key, update),
    )
    .await
    .map_err(store_error)?
    .ok_or_else(identity_gone)?;

    state
        .audit
        .log_identity_action(
            AuditAction::ProfileUpdated,
            &auth_user.identity_key,
            &auth_user.device_fingerprint,
            &headers,
        )
        .await;

    Ok((StatusCode::OK, Json(IdentityInfo::from(record))))
}
