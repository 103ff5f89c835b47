//! Application startup and lifecycle management.

use crate::config::BillingConfig;
use crate::handlers::{distribution, payments, periods};
use crate::services::{get_metrics, init_metrics, Database, DistributionService};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::{make_request_span, request_id_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: BillingConfig,
    pub db: Arc<Database>,
    pub distribution: DistributionService<Database>,
}

/// Liveness: the process answers and can reach PostgreSQL.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (status, body) = match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            json!({
                "status": "ok",
                "service": state.config.service_name,
                "version": state.config.service_version,
                "unowned_field_policy": state.config.distribution.unowned_field_policy.as_str(),
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "PostgreSQL unreachable from health probe");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "status": "unhealthy",
                    "service": state.config.service_name,
                    "error": e.to_string(),
                }),
            )
        }
    };
    (status, Json(body))
}

/// Readiness: status code only.
async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    match state.db.health_check().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Not ready to take billing traffic");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        get_metrics(),
    )
}

/// Build the HTTP router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route(
            "/wells/:well_id/periods",
            post(periods::create_billing_period).get(periods::list_billing_periods),
        )
        .route("/periods/:period_id", get(periods::get_billing_period))
        .route(
            "/periods/:period_id/distribute",
            post(distribution::distribute_bill),
        )
        .route(
            "/periods/:period_id/payments",
            post(payments::record_payment).delete(payments::reverse_payment),
        )
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// A bound listener plus the state the router serves.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Connect to PostgreSQL, apply pending migrations and bind the
    /// listener. Port `0` binds an ephemeral port (see [`Self::http_port`]).
    pub async fn build(config: BillingConfig) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        db.run_migrations().await?;

        let db = Arc::new(db);
        let state = AppState {
            distribution: DistributionService::new(db.clone(), config.distribution.clone()),
            db,
            config: config.clone(),
        };

        let http_addr: SocketAddr = format!("{}:{}", config.common.host, config.common.port)
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid listen address: {}", e)))?;
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Cannot bind billing API listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Serve the billing API until the listener fails or the future is dropped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(http_port = self.http_port, "Billing API listening");

        axum::serve(self.http_listener, router(self.state))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Billing API server stopped");
                e
            })
    }
}
