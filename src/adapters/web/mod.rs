//! HTTP adapter.
//!
//! JSON API over the forecasting, training and pricing operations.

pub mod dto;
mod error;
mod handlers;

pub use error::{WebError, status_from_error};
pub use handlers::SERVICE_NAME;

use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::domain::error::ForecastError;
use crate::domain::orchestrator::ForecastOrchestrator;
use crate::domain::training::TrainingCoordinator;

pub struct AppState {
    pub orchestrator: ForecastOrchestrator,
    pub training: TrainingCoordinator,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/forecast", post(handlers::forecast))
        .route("/train", post(handlers::train))
        .route("/train/status/{job_id}", get(handlers::training_status))
        .route("/optimize-price", post(handlers::optimize_price))
        .fallback(handlers::not_found)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(Arc::new(state))
}

/// Binds `addr` and serves until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), ForecastError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
