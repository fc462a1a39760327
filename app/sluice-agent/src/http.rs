//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! HTTP endpoints for the Sluice agent

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use sluice_core::{EngineMetrics, HealthStatus, PipelineError};
use sluice_pipeline::{Engine, PushHandle, PushPayload};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const TRACEPARENT_HEADER: &str = "traceparent";

/// HTTP server for agent endpoints
#[derive(Clone)]
pub struct HttpServer {
    engine: Arc<Mutex<Engine>>,
    metrics: Arc<EngineMetrics>,
    push_handles: Arc<HashMap<String, PushHandle>>,
    prometheus: PrometheusHandle,
}

impl HttpServer {
    /// Create a server for an engine
    ///
    /// Push handles are captured up front so ingest never waits on the
    /// engine lock.
    pub async fn new(engine: Arc<Mutex<Engine>>, prometheus: PrometheusHandle) -> Self {
        let (metrics, push_handles) = {
            let engine = engine.lock().await;
            let handles = engine
                .config()
                .receivers
                .keys()
                .filter_map(|id| engine.push_handle(id).map(|handle| (id.clone(), handle)))
                .collect();
            (engine.metrics(), handles)
        };

        Self {
            engine,
            metrics,
            push_handles: Arc::new(push_handles),
            prometheus,
        }
    }

    /// Create router with all endpoints
    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/health", get(Self::health_check))
            .route("/health/live", get(Self::health_live))
            .route("/health/ready", get(Self::health_ready))
            .route("/metrics", get(Self::metrics))
            .route("/metrics/prometheus", get(Self::prometheus_metrics))
            .route("/v1/receivers/:id", post(Self::ingest))
            .with_state(Arc::new(self.clone()))
    }

    /// Full health report
    async fn health_check(State(server): State<Arc<Self>>) -> impl IntoResponse {
        let report = server.engine.lock().await.health();
        let status_code = if report.live {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status_code, Json(report))
    }

    /// Liveness endpoint
    async fn health_live(State(server): State<Arc<Self>>) -> impl IntoResponse {
        let report = server.engine.lock().await.health();
        let (status_code, status) = if report.live {
            (StatusCode::OK, "alive")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "dead")
        };
        (
            status_code,
            Json(json!({ "status": status, "timestamp": report.timestamp })),
        )
    }

    /// Readiness endpoint
    async fn health_ready(State(server): State<Arc<Self>>) -> impl IntoResponse {
        let report = server.engine.lock().await.health();
        let is_ready = report.live && report.ready;
        let status_code = if is_ready {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };

        let not_ready: Vec<&str> = report
            .components
            .iter()
            .filter(|c| c.status != HealthStatus::Healthy || !c.running)
            .map(|c| c.name.as_str())
            .collect();

        (
            status_code,
            Json(json!({
                "status": if is_ready { "ready" } else { "not_ready" },
                "components": not_ready,
                "timestamp": report.timestamp,
            })),
        )
    }

    /// Metrics endpoint (JSON format)
    async fn metrics(State(server): State<Arc<Self>>) -> impl IntoResponse {
        let response = json!({
            "metrics": server.metrics.snapshot(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        (StatusCode::OK, Json(response))
    }

    /// Prometheus metrics endpoint
    async fn prometheus_metrics(State(server): State<Arc<Self>>) -> impl IntoResponse {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            server.prometheus.render(),
        )
    }

    /// Push a newline-delimited payload into a push receiver
    async fn ingest(
        State(server): State<Arc<Self>>,
        Path(id): Path<String>,
        headers: HeaderMap,
        body: String,
    ) -> impl IntoResponse {
        let Some(handle) = server.push_handles.get(&id) else {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("no push receiver '{}'", id) })),
            );
        };

        let mut payload = PushPayload::lines(body);
        if let Some(traceparent) = headers
            .get(TRACEPARENT_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            payload = payload.with_traceparent(traceparent);
        }

        match handle.try_push(payload) {
            Ok(()) => {
                debug!(receiver = %id, "Accepted push payload");
                (StatusCode::ACCEPTED, Json(json!({ "accepted": true })))
            }
            Err(e @ PipelineError::QueueOverflow { .. }) => {
                warn!(receiver = %id, error = %e, "Rejected push payload");
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": e.to_string() })),
                )
            }
            Err(e) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string() })),
            ),
        }
    }
}
