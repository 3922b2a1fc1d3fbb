use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;

use super::{ApiError, api_error, store_error};
use crate::audit::{AuditAction, AuditEntry, AuditQuery};
use crate::middleware::AuthUser;
use crate::models::{IdentityRecord, NewIdentity};
use crate::state::AppState;
use crate::storage::{StorageError, with_deadline};

// These endpoints sit behind require_admin; handlers assume an admin caller.

fn identity_not_found(identity_key: &str) -> ApiError {
    api_error(
        StatusCode::NOT_FOUND,
        "not_found",
        format!("Identity '{}' not found", identity_key),
    )
}

pub async fn create_identity(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    headers: HeaderMap,
    Json(mut payload): Json<NewIdentity>,
) -> Result<(StatusCode, Json<IdentityRecord>), ApiError> {
    payload.identity_key = payload.identity_key.trim().to_string();
    if payload.identity_key.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "identity_key is required",
        ));
    }

    let record = IdentityRecord::new(payload, Utc::now());
    with_deadline(state.store_timeout, state.store.create(record.clone()))
        .await
        .map_err(|e| match e {
            StorageError::AlreadyExists => api_error(
                StatusCode::CONFLICT,
                "already_exists",
                format!("Identity '{}' already exists", record.identity_key),
            ),
            e => store_error(e),
        })?;

    info!(
        "Identity {} provisioned by {}",
        record.identity_key, admin.identity_key
    );
    state
        .audit
        .log_admin_action(
            AuditAction::IdentityProvisioned,
            &record.identity_key,
            &admin.identity_key,
            &headers,
            None,
        )
        .await;

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_identities(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Vec<IdentityRecord>>), ApiError> {
    let identities = with_deadline(state.store_timeout, state.store.list())
        .await
        .map_err(store_error)?;

    Ok((StatusCode::OK, Json(identities)))
}

pub async fn get_identity(
    State(state): State<AppState>,
    Path(identity_key): Path<String>,
) -> Result<(StatusCode, Json<IdentityRecord>), ApiError> {
    let record = with_deadline(state.store_timeout, state.store.get(&identity_key))
        .await
        .map_err(store_error)?
        .ok_or_else(|| identity_not_found(&identity_key))?;

    Ok((StatusCode::OK, Json(record)))
}

pub async fn delete_identity(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    headers: HeaderMap,
    Path(identity_key): Path<String>,
) -> Result<StatusCode, ApiError> {
    let deleted = with_deadline(state.store_timeout, state.store.delete(&identity_key))
        .await
        .map_err(store_error)?;

    if !deleted {
        return Err(identity_not_found(&identity_key));
    }

    state
        .audit
        .log_admin_action(
            AuditAction::IdentityDeleted,
            &identity_key,
            &admin.identity_key,
            &headers,
            None,
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_device(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    headers: HeaderMap,
    Path((identity_key, device_fingerprint)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let removed = with_deadline(
        state.store_timeout,
        state.store.remove_device(&identity_key, &device_fingerprint),
    )
    .await
    .map_err(|e| match e {
        StorageError::NotFound => identity_not_found(&identity_key),
        e => store_error(e),
    })?;

    if !removed {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "Device is not registered for this identity",
        ));
    }

    state
        .audit
        .log_admin_action(
            AuditAction::DeviceRemoved,
            &identity_key,
            &admin.identity_key,
            &headers,
            Some(&device_fingerprint),
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_devices(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    headers: HeaderMap,
    Path(identity_key): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let removed = with_deadline(state.store_timeout, state.store.clear_devices(&identity_key))
        .await
        .map_err(|e| match e {
            StorageError::NotFound => identity_not_found(&identity_key),
            e => store_error(e),
        })?;

    state
        .audit
        .log_admin_action(
            AuditAction::DevicesCleared,
            &identity_key,
            &admin.identity_key,
            &headers,
            None,
        )
        .await;

    Ok((
        StatusCode::OK,
        Json(json!({
            "identity_key": identity_key,
            "devices_removed": removed
        })),
    ))
}

pub async fn list_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<(StatusCode, Json<Vec<AuditEntry>>), ApiError> {
    let entries = state.audit.query(query).await.map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            format!("Failed to query audit log: {}", e),
        )
    })?;

    Ok((StatusCode::OK, Json(entries)))
}
