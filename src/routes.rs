use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::middleware::{auth_middleware, require_admin};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(handlers::health::health_check))
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/auth/login", post(handlers::auth::login));

    // Layers added later run first: auth_middleware wraps require_admin
    let protected = Router::new()
        .route(
            "/api/v1/me",
            get(handlers::profile::get_profile).put(handlers::profile::update_profile),
        )
        .route(
            "/api/v1/results",
            get(handlers::results::list_results).post(handlers::results::submit_result),
        )
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let admin = Router::new()
        .route(
            "/api/v1/admin/identities",
            get(handlers::admin::list_identities).post(handlers::admin::create_identity),
        )
        .route(
            "/api/v1/admin/identities/:identity_key",
            get(handlers::admin::get_identity).delete(handlers::admin::delete_identity),
        )
        .route(
            "/api/v1/admin/identities/:identity_key/devices",
            delete(handlers::admin::clear_devices),
        )
        .route(
            "/api/v1/admin/identities/:identity_key/devices/:device_fingerprint",
            delete(handlers::admin::remove_device),
        )
        .route("/api/v1/admin/audit", get(handlers::admin::list_audit))
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    public
        .merge(protected)
        .merge(admin)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
