//! Health check handlers for stream workers.
//!
//! - Liveness (`/health`)
//! - Readiness (`/ready`), pings Redis
//! - Downstream client status (`/health/clients`)
//! - Prometheus metrics (`/metrics`)

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::metrics;

/// Reports `name -> healthy` for the downstream clients a worker depends on
pub type ClientsProbe = Arc<dyn Fn() -> HashMap<String, bool> + Send + Sync>;

/// Shared state for health endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub redis: ConnectionManager,
    pub app_name: String,
    pub app_version: String,
    clients: Option<ClientsProbe>,
}

impl HealthState {
    pub fn new(
        redis: ConnectionManager,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            redis,
            app_name: app_name.into(),
            app_version: app_version.into(),
            clients: None,
        }
    }

    /// Attach a probe reported by `/health/clients`
    pub fn with_clients(mut self, probe: ClientsProbe) -> Self {
        self.clients = Some(probe);
        self
    }
}

/// Health response for liveness probes.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub name: String,
    pub version: String,
}

/// Liveness probe handler. Always OK while the process is serving.
pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        name: state.app_name,
        version: state.app_version,
    })
}

/// Readiness probe handler: 503 unless Redis answers PING.
pub async fn ready_handler(
    State(state): State<HealthState>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let mut conn = state.redis.clone();
    let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;

    match result {
        Ok(response) if response == "PONG" => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "checks": { "redis": "ok" }
            })),
        )),
        Ok(response) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": { "redis": format!("unexpected response: {}", response) }
            })),
        )),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": { "redis": format!("error: {}", e) }
            })),
        )),
    }
}

/// Downstream client status. 503 when any client is down.
pub async fn clients_handler(State(state): State<HealthState>) -> (StatusCode, Json<Value>) {
    let clients = state.clients.as_ref().map(|probe| probe()).unwrap_or_default();
    clients_report(clients)
}

fn clients_report(clients: HashMap<String, bool>) -> (StatusCode, Json<Value>) {
    let healthy = clients.values().all(|live| *live);
    let (code, status) = if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (code, Json(json!({ "status": status, "clients": clients })))
}

/// Prometheus metrics endpoint handler.
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Some(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            output,
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        )
            .into_response(),
    }
}

/// Router with every health route, ready to merge or serve.
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/health/clients", get(clients_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clients_report_all_live() {
        let clients = HashMap::from([("mail-service".to_string(), true)]);
        let (code, Json(body)) = clients_report(clients);

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["clients"]["mail-service"], true);
    }

    #[test]
    fn test_clients_report_degraded() {
        let clients = HashMap::from([
            ("mail-service".to_string(), true),
            ("audit".to_string(), false),
        ]);
        let (code, Json(body)) = clients_report(clients);

        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["clients"]["audit"], false);
    }

    #[test]
    fn test_clients_report_empty_is_ok() {
        let (code, _) = clients_report(HashMap::new());
        assert_eq!(code, StatusCode::OK);
    }
}
