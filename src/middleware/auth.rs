use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, warn};

use crate::models::IdentityRole;
use crate::state::AppState;
use crate::storage::with_deadline;

// Extension to store the authenticated identity in the request
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub identity_key: String,
    pub device_fingerprint: String,
    pub role: IdentityRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == IdentityRole::Admin
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "Unauthorized",
            "message": message
        })),
    )
        .into_response()
}

/// Validates the bearer token and checks that its device is still registered.
/// Removing a device from an identity therefore ends that device's session.
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    else {
        return unauthorized("Missing bearer token");
    };

    let claims = match state.sessions.validate(token) {
        Ok(claims) => claims,
        Err(e) => {
            debug!("Rejected session token: {}", e);
            return unauthorized("Invalid or expired token");
        }
    };

    let record = match with_deadline(state.store_timeout, state.store.get(&claims.sub)).await {
        Ok(Some(record)) => record,
        Ok(None) => return unauthorized("Identity no longer exists"),
        Err(e) => {
            warn!("Identity store error during authentication: {}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "store_unavailable",
                    "message": "Service temporarily unavailable, please try again"
                })),
            )
                .into_response();
        }
    };

    if !record.has_device(&claims.device) {
        return unauthorized("Device is no longer registered");
    }

    // Role comes from the stored record, not the token
    request.extensions_mut().insert(AuthUser {
        identity_key: record.identity_key,
        device_fingerprint: claims.device,
        role: record.role,
    });

    next.run(request).await
}

pub async fn require_admin(request: Request, next: Next) -> Result<Response, impl IntoResponse> {
    let auth_user = request.extensions().get::<AuthUser>().ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "Unauthorized"
            })),
        )
    })?;

    if !auth_user.is_admin() {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "Admin access required"
            })),
        ));
    }

    Ok(next.run(request).await)
}
