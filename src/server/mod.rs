//! HTTP/WebSocket surface: one `/ws` upgrade per trainee call, plus a
//! small supplemental HTTP surface for operational liveness/status. Router
//! assembly is the usual `CorsLayer` + `TraceLayer` + `axum::serve` over a
//! bound `TcpListener`, trimmed to the routes this gateway actually
//! serves -- no HTML pages, no device registry, no login surface, since
//! authentication is an excluded external collaborator.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::{WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::providers::auth::JwtAuthVerifier;
use crate::providers::history::EmptyHistoryReader;
use crate::providers::llm::HttpLlmClient;
use crate::providers::sink::NullSessionSink;
use crate::providers::stt::DeepgramSttClient;
use crate::providers::tts::HttpTtsClient;
use crate::session::{run_session, Providers};

#[derive(Clone)]
struct ServerState {
    providers: Providers,
}

/// Builds the default provider set from configuration. `NullSessionSink`
/// and `EmptyHistoryReader` stand in until a persistence/analytics backend
/// is wired in -- the gateway itself has no opinion on where sessions are
/// stored or analytics are served from.
fn default_providers(config: &Config) -> Providers {
    Providers {
        auth: Arc::new(JwtAuthVerifier::new(config.jwt_secret.clone())),
        stt: Arc::new(DeepgramSttClient::new(config)),
        llm: Arc::new(HttpLlmClient::new(config)),
        tts: Arc::new(HttpTtsClient::new(config, config.tts_base_url.clone())),
        sink: Arc::new(NullSessionSink),
        history: Arc::new(EmptyHistoryReader),
    }
}

pub async fn start(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse().context("invalid bind address")?;
    let state = ServerState { providers: default_providers(&config) };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .route("/api/status", get(status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind listener")?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state.providers))
}

async fn healthz() -> impl IntoResponse {
    axum::http::StatusCode::OK
}

async fn status() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "sales-voice-gateway",
        "status": "ok",
    }))
}
