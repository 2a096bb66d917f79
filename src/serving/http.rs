//! Online scoring over HTTP
//!
//! The bundle is loaded once, before the listener binds, and shared
//! read-only by every request.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use super::schema::{ErrorDetail, HealthStatus, PredictionRequest, PredictionResponse};
use crate::error::Result;
use crate::inference::{records_to_frame, HousingPipeline};
use crate::lineage::{ModelReference, ModelRegistry};

/// Listener address and the bundle to serve
#[derive(Debug, Clone, PartialEq)]
pub struct ServeConfig {
    pub addr: SocketAddr,
    pub reference: ModelReference,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            reference: ModelReference::new("CaliforniaHousingRegressor", "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<HousingPipeline>,
}

/// JSON error body with a status code
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorDetail { detail: self.detail })).into_response()
    }
}

/// Resolve and load the bundle; any failure here is fatal for startup
pub fn load_pipeline(registry: &dyn ModelRegistry, reference: &ModelReference) -> Result<Arc<HousingPipeline>> {
    registry.load_bundle(reference).map(Arc::new)
}

pub fn router(pipeline: Arc<HousingPipeline>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .with_state(AppState { pipeline })
}

async fn health() -> Json<HealthStatus> {
    Json(HealthStatus::ok())
}

async fn predict(
    State(state): State<AppState>,
    payload: std::result::Result<Json<PredictionRequest>, JsonRejection>,
) -> std::result::Result<Json<PredictionResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected prediction request");
        ApiError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: rejection.body_text(),
        }
    })?;

    let rows = request.data.len();
    let pipeline = Arc::clone(&state.pipeline);
    let scored = tokio::task::spawn_blocking(move || {
        let df = records_to_frame(&request.data)?;
        pipeline.predict(&df)
    })
    .await;

    match scored {
        Ok(Ok(predictions)) => {
            info!(rows, "Scored prediction request");
            Ok(Json(PredictionResponse { predictions }))
        }
        Ok(Err(e)) => {
            error!(rows, error = %e, "Prediction failed");
            Err(ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: e.to_string(),
            })
        }
        Err(join_err) => {
            error!(error = %join_err, "Prediction task aborted");
            Err(ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                detail: "prediction task aborted".to_string(),
            })
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Bind `addr` and serve until interrupted
pub async fn serve(pipeline: Arc<HousingPipeline>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await
}
