//! HTTP surface of the gateway

pub mod response;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use archivelink_core::Operation;
use archivelink_dispatch::{CertificateProvider, CommandRequest, RequestDispatcher};

use crate::config::GatewayConfig;
use response::GatewayResponse;

/// Shared application state
#[derive(Debug)]
pub struct AppState {
    pub dispatcher: RequestDispatcher,
    pub provider: Arc<dyn CertificateProvider>,
    pub config: GatewayConfig,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Readiness check response
#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub repositories: usize,
    pub operations: Vec<Operation>,
    pub protection: String,
}

/// Health check endpoint
///
/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Readiness check endpoint
///
/// GET /ready
pub async fn ready(State(state): State<Arc<AppState>>) -> Json<ReadyResponse> {
    let repositories = state.provider.list().await.map(|v| v.len()).unwrap_or(0);

    Json(ReadyResponse {
        ready: true,
        repositories,
        operations: state.dispatcher.registered_operations(),
        protection: archivelink_core::access::permission_letters(
            state.dispatcher.config().protection_level,
        ),
    })
}

/// The content server endpoint
///
/// GET/POST/PUT/DELETE on the configured path; the command lives in the
/// query string.
pub async fn content_server(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut request = CommandRequest::new(method.as_str(), uri.query().unwrap_or_default())
        .with_body(body.to_vec());
    for (name, value) in headers.iter() {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }

    GatewayResponse(state.dispatcher.run(request).await).into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let endpoint = state.config.endpoint.clone();

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route(
            &endpoint,
            get(content_server)
                .post(content_server)
                .put(content_server)
                .delete(content_server),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
