//! Control-plane boundary: discovery reads, the bounded alert feed, the
//! blocklist, and the `/ws` stream.
//!
//! Write endpoints sit behind a static `X-API-Key` header; GET requests and
//! the fixed open-path set bypass the check. With no key configured the
//! instance is treated as a local deployment and writes stay open.

mod ws;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::info;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;

use crate::alerts::AlertBuffer;
use crate::broadcast::ConnectionManager;
use crate::graph::GraphStore;
use crate::response::ResponseManager;

const OPEN_PATHS: [&str; 5] = ["/health", "/ws", "/docs", "/openapi.json", "/redoc"];

pub struct ApiState {
    pub graph: Arc<dyn GraphStore>,
    pub alerts: Arc<AlertBuffer>,
    pub response: Arc<ResponseManager>,
    pub broadcast: Arc<ConnectionManager>,
    pub api_key: Option<String>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/discovery/nodes", get(nodes))
        .route("/v1/discovery/edges", get(edges))
        .route("/v1/policy/alerts", get(alerts))
        .route("/v1/policy/blocklist", get(blocklist))
        .route("/v1/policy/unblock", post(unblock))
        .route("/ws", get(ws::handler))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_api_key,
        ))
        .with_state(state)
}

/// Serve until the shutdown signal flips.
pub async fn serve(
    listen: String,
    state: Arc<ApiState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind control plane on {}", listen))?;
    info!("control plane listening on {}", listen);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .context("control plane server failed")?;
    Ok(())
}

async fn require_api_key(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Response {
    let open = request.method() == Method::GET
        || OPEN_PATHS.contains(&request.uri().path());
    if !open {
        if let Some(expected) = &state.api_key {
            let presented = request
                .headers()
                .get("x-api-key")
                .and_then(|v| v.to_str().ok());
            if presented != Some(expected.as_str()) {
                return (StatusCode::UNAUTHORIZED, "invalid API key").into_response();
            }
        }
    }
    next.run(request).await
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn nodes(State(state): State<Arc<ApiState>>) -> Response {
    match state.graph.get_all_nodes().await {
        Ok(nodes) => Json(nodes).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn edges(State(state): State<Arc<ApiState>>) -> Response {
    match state.graph.get_all_edges().await {
        Ok(edges) => Json(edges).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn alerts(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.alerts.snapshot())
}

async fn blocklist(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(json!({
        "blocked": state.response.blocked_ips(),
        "stats": state.response.stats(),
    }))
}

#[derive(Debug, Deserialize)]
struct UnblockRequest {
    ip: String,
    #[serde(default)]
    reason: Option<String>,
}

async fn unblock(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<UnblockRequest>,
) -> impl IntoResponse {
    let reason = request.reason.as_deref().unwrap_or("Manual unblock");
    let unblocked = state.response.unblock_ip(&request.ip, reason);
    Json(json!({"unblocked": unblocked, "ip": request.ip}))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use tower::util::ServiceExt;

    use super::*;
    use crate::config::ResponseConfig;
    use crate::graph::memory::MemoryGraphStore;

    fn state(api_key: Option<&str>) -> Arc<ApiState> {
        Arc::new(ApiState {
            graph: Arc::new(MemoryGraphStore::new()),
            alerts: Arc::new(AlertBuffer::default()),
            response: Arc::new(ResponseManager::new(&ResponseConfig::default())),
            broadcast: Arc::new(ConnectionManager::new()),
            api_key: api_key.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn health_is_open() {
        let response = router(state(Some("secret")))
            .oneshot(
                HttpRequest::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn reads_bypass_the_key() {
        let response = router(state(Some("secret")))
            .oneshot(
                HttpRequest::builder()
                    .uri("/v1/policy/alerts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn writes_require_the_key() {
        let app = router(state(Some("secret")));
        let denied = app
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/v1/policy/unblock")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"ip": "192.168.1.10"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/v1/policy/unblock")
                    .header("content-type", "application/json")
                    .header("x-api-key", "secret")
                    .body(Body::from(r#"{"ip": "192.168.1.10"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }
}
