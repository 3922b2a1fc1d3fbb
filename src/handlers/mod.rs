pub mod admin;
pub mod auth;
pub mod health;
pub mod profile;
pub mod results;

use axum::{Json, http::StatusCode};
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::storage::StorageError;

pub type ApiError = (StatusCode, Json<Value>);

pub(crate) fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(json!({
            "error": error,
            "message": message.into()
        })),
    )
}

/// Map a store failure onto the HTTP error returned to the client
pub(crate) fn store_error(e: StorageError) -> ApiError {
    match e {
        StorageError::NotFound => api_error(StatusCode::NOT_FOUND, "not_found", "Identity not found"),
        StorageError::AlreadyExists => api_error(
            StatusCode::CONFLICT,
            "already_exists",
            "Identity already exists",
        ),
        e if e.is_unavailable() => {
            warn!("Identity store unavailable: {}", e);
            api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                "Service temporarily unavailable, please try again",
            )
        }
        e => {
            error!("Identity store error: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_store_error_status_mapping() {
        assert_eq!(store_error(StorageError::NotFound).0, StatusCode::NOT_FOUND);
        assert_eq!(store_error(StorageError::AlreadyExists).0, StatusCode::CONFLICT);
        assert_eq!(
            store_error(StorageError::Timeout(Duration::from_millis(10))).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            store_error(StorageError::ConnectionError("refused".to_string())).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            store_error(StorageError::InvalidData("bad".to_string())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
