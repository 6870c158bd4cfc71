//! Webhook intake server.
//!
//! One POST route per monitoring source. Handlers parse the source-specific
//! payload, normalize it, and hand each alert to the ingestor; the core
//! never sees a raw HTTP body.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::alert::ingest::{AlertIngestor, IngestReport};
use crate::alert::normalize::{
    from_alertmanager, from_custom, from_datadog, from_grafana, AlertmanagerPayload, DatadogEvent,
};
use crate::alert::AlertPayload;

/// Server state shared across handlers.
pub struct AppState {
    pub ingestor: Arc<AlertIngestor>,
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhooks/alertmanager", post(alertmanager_handler))
        .route("/webhooks/datadog", post(datadog_handler))
        .route("/webhooks/grafana", post(grafana_handler))
        .route("/webhooks/custom", post(custom_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
///
/// # Errors
///
/// Returns an error if the server fails to bind or serve.
pub async fn run_server(state: Arc<AppState>, addr: &str) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Webhook intake server listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check response.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Response for webhook deliveries.
#[derive(Debug, Serialize)]
struct WebhookResponse {
    status: &'static str,
    processed: usize,
    results: Vec<IngestReport>,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn process_alerts(state: &AppState, alerts: Vec<AlertPayload>) -> Json<WebhookResponse> {
    let mut results = Vec::with_capacity(alerts.len());
    for alert in &alerts {
        results.push(state.ingestor.process(alert).await);
    }
    Json(WebhookResponse {
        status: "ok",
        processed: results.len(),
        results,
    })
}

async fn alertmanager_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AlertmanagerPayload>,
) -> impl IntoResponse {
    process_alerts(&state, from_alertmanager(&payload)).await
}

async fn datadog_handler(
    State(state): State<Arc<AppState>>,
    Json(event): Json<DatadogEvent>,
) -> impl IntoResponse {
    process_alerts(&state, vec![from_datadog(&event)]).await
}

async fn grafana_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let alerts = from_grafana(&payload);
    if alerts.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(WebhookResponse {
                status: "invalid_payload",
                processed: 0,
                results: Vec::new(),
            }),
        )
            .into_response();
    }
    process_alerts(&state, alerts).await.into_response()
}

async fn custom_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    process_alerts(&state, from_custom(&payload)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::fingerprint::FingerprintStore;
    use crate::alert::rules::RuleSet;
    use crate::config::EngineConfig;
    use crate::escalation::EscalationLog;
    use crate::incident::orchestrator::Orchestrator;
    use crate::incident::store::IncidentStore;
    use crate::incident::warroom::DisabledWarRoom;
    use crate::org::Directory;
    use crate::routing::Router as NotificationRouter;
    use notify::{ChannelSet, Dispatcher};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<IncidentStore>) {
        let store = Arc::new(IncidentStore::new());
        let directory = Arc::new(Directory::new());
        let router = Arc::new(NotificationRouter::new(
            ChannelSet::new(),
            Dispatcher::default(),
            Arc::clone(&directory),
            Arc::clone(&store),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            router,
            Arc::new(DisabledWarRoom),
            Arc::new(EscalationLog::new()),
            EngineConfig::default(),
        ));
        let ingestor = Arc::new(AlertIngestor::new(
            Arc::new(FingerprintStore::new()),
            Arc::new(RuleSet::new(Vec::new()).unwrap()),
            orchestrator,
            directory,
            EngineConfig::default(),
        ));
        (build_router(Arc::new(AppState { ingestor })), store)
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _) = app();
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_alertmanager_webhook_creates_incident() {
        let (app, store) = app();
        let (status, body) = post_json(
            app,
            "/webhooks/alertmanager",
            serde_json::json!({
                "version": "4",
                "groupKey": "{}",
                "status": "firing",
                "receiver": "incidents",
                "alerts": [{
                    "status": "firing",
                    "labels": {"alertname": "HighLatency", "severity": "critical"},
                    "annotations": {"summary": "High latency"}
                }]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["processed"], 1);
        assert_eq!(body["results"][0]["action"], "created");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_custom_webhook_roundtrip() {
        let (app, _) = app();
        let (status, body) = post_json(
            app,
            "/webhooks/custom",
            serde_json::json!({
                "alert_name": "HighCPUUsage",
                "status": "firing",
                "severity": "critical"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"][0]["action"], "created");
    }

    #[tokio::test]
    async fn test_malformed_alertmanager_payload_is_rejected() {
        let (app, _) = app();
        let (status, _) = post_json(
            app,
            "/webhooks/alertmanager",
            serde_json::json!({"not": "an alertmanager payload"}),
        )
        .await;
        // Missing `alerts` fails deserialization before the core runs.
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
