//! REST API for the Telegram mini app, plus the payment webhook.
//!
//! CORS is open so the mini app can be served from any origin.

pub mod error;
pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use routes::AppState;

/// Bind `port` and serve the API in a background task until `shutdown`
/// flips to `true`. Binding happens before returning so a taken port is
/// reported to the caller.
pub async fn spawn_api(
    state: AppState,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API port {port}"))?;
    info!(port, "API server listening on http://localhost:{port}");

    Ok(tokio::spawn(async move {
        let stop = async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(stop).await {
            error!(error = %e, "API server error");
        }
        info!("API server stopped");
    }))
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/user/:id", get(routes::get_user))
        .route("/api/bet", post(routes::open_bet))
        .route("/api/bet/resolve/:wager_id", post(routes::resolve_bet))
        .route("/api/price/:pair", get(routes::get_price))
        .route("/webhook/payment", post(routes::payment_webhook))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
