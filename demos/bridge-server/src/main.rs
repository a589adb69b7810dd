//! Demo request layer for the Shishen breath bridge.
//!
//! Run with: SHISHEN_HOST=<agent host> SHISHEN_SSH_KEY=<key> cargo run -p bridge-server
//!
//! Then `POST /chat/send` with `{"userId": "42", "message": "hello"}`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use shishen_bridge::{
    BreathBridge, BridgeConfig, BridgeError, SendOutcome, orchestrator::DEFAULT_HISTORY_LIMIT,
    storage::MemoryChatStore,
};
use shishen_core::{ChatStore, RemoteStatus, validate_message};
use shishen_remote::SshChannel;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_BIND: &str = "127.0.0.1:3000";
const APOLOGY: &str = "Sorry, Shishen cannot be reached right now. Please try again in a moment.";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    bridge: Arc<BreathBridge<SshChannel>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = BridgeConfig::load_default().context("Failed to load bridge configuration")?;
    tracing::info!(
        host = %config.remote.host,
        policy = %config.remote.host_key_policy,
        correlation = ?config.wait.correlation,
        "Bridge configured"
    );

    let store: Arc<dyn ChatStore> = Arc::new(MemoryChatStore::new());
    let state = AppState {
        bridge: Arc::new(BreathBridge::connect(&config).with_store(store)),
    };

    let app = Router::new()
        .route("/chat/send", post(send_handler))
        .route("/chat/history", get(history_handler))
        .route("/shishen/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let bind = std::env::var("SHISHEN_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let addr: SocketAddr = bind.parse().with_context(|| format!("Invalid SHISHEN_BIND: {bind}"))?;
    tracing::info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest {
    user_id: String,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryQuery {
    user_id: String,
    limit: Option<usize>,
}

fn bad_request(message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

async fn send_handler(State(state): State<AppState>, Json(req): Json<SendRequest>) -> Response {
    if req.user_id.trim().is_empty() {
        return bad_request("userId is required");
    }
    let message = match validate_message(&req.message) {
        Ok(message) => message,
        Err(e) => return bad_request(e.to_string()),
    };

    match state.bridge.send(&req.user_id, message).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            tracing::warn!("{e}");
            let BridgeError::DeliveryFailed { breath_id } = e;
            let outcome = SendOutcome {
                success: false,
                response: APOLOGY.to_string(),
                breath_id,
                answered: false,
            };
            (StatusCode::BAD_GATEWAY, Json(outcome)).into_response()
        }
    }
}

async fn history_handler(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    match state.bridge.history(&query.user_id, limit).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            tracing::error!("Failed to load history: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": e.to_string() })))
                .into_response()
        }
    }
}

async fn status_handler(State(state): State<AppState>) -> Json<RemoteStatus> {
    Json(state.bridge.get_shishen_status().await.unwrap_or_default())
}
