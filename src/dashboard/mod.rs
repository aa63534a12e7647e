use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::metrics::serve_metrics;
use crate::query::{JobRegistry, QueryCatalog, QueryClass};

#[derive(Clone)]
pub struct DashboardState {
    pub registry: Arc<JobRegistry>,
    pub catalog: QueryCatalog,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub handle: String,
    pub query: String,
    pub status: String,
    pub progress: f64,
    pub submitted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Routes: `/api/queries`, `/api/classes`, `/metrics`.
pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/queries", get(list_queries_handler))
        .route("/api/classes", get(list_classes_handler))
        .route("/metrics", get(serve_metrics))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

/// Read-only view of in-flight queries. Never removes or advances jobs.
async fn list_queries_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let mut queries = Vec::with_capacity(state.registry.len());
    for job in state.registry.jobs() {
        let snapshot = job.snapshot().await;
        queries.push(QueryResponse {
            handle: job.handle.to_string(),
            query: job.query.name.clone(),
            status: snapshot.status.to_string(),
            progress: snapshot.progress,
            submitted_at: job.created_at,
            expires_at: job.expires_at_utc,
        });
    }

    Json(queries)
}

async fn list_classes_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let classes: Vec<QueryClass> = state.catalog.classes().cloned().collect();
    Json(classes)
}
