use ielts_auth_api::{config, routes, state, storage};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ielts_auth_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let app_config = match config::load_config_with_fallback() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let store = match storage::create_identity_store(&app_config.storage).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to initialize identity store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = state::seed_identities(
        store.as_ref(),
        &app_config.identities,
        app_config.admission.store_timeout(),
    )
    .await
    {
        tracing::error!("Failed to seed identities: {}", e);
        return ExitCode::FAILURE;
    }

    let app_state = state::AppState::with_memory_audit(store, &app_config);
    let app = routes::build_router(app_state);

    let bind_addr = &app_config.server.bind_addr;
    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", bind_addr, e);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("🚀 Starting IELTS auth API server on {}", bind_addr);
    tracing::info!(
        "📋 Device cap: {} per identity",
        app_config.admission.device_cap
    );

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
