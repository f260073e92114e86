//! HTTP request handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::domain::error::ForecastError;
use crate::domain::orchestrator::{ForecastMetric, ForecastRequest, inclusive_days};
use crate::domain::pricing::{PriceRecommendation, optimize_price as recommend_price};
use crate::domain::series::{build_series, parse_date};

use super::dto::{
    ForecastRequestBody, ForecastResponseBody, HealthBody, OptimizePriceRequestBody,
    TrainRequestBody, TrainResponseBody,
};
use super::{AppState, WebError};

pub const SERVICE_NAME: &str = "nexus-forecast";

pub async fn health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        service: SERVICE_NAME.to_string(),
    })
}

fn parse_forecast_request(body: ForecastRequestBody) -> Result<ForecastRequest, ForecastError> {
    let start = parse_date(&body.start_date)?;
    let end = parse_date(&body.end_date)?;
    inclusive_days(start, end)?;
    let metric: ForecastMetric = body.model_type.parse()?;
    let history = body
        .historical_data
        .as_deref()
        .map(build_series)
        .transpose()?;
    Ok(ForecastRequest {
        property_id: body.property_id,
        start,
        end,
        metric,
        history,
    })
}

/// Malformed input is a 422; anything raised while forecasting is a 500.
pub async fn forecast(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ForecastRequestBody>,
) -> Result<Json<ForecastResponseBody>, WebError> {
    let request = parse_forecast_request(body).map_err(|e| WebError::unprocessable(e.to_string()))?;

    let outcome = tokio::task::spawn_blocking(move || state.orchestrator.forecast(&request))
        .await
        .map_err(|e| WebError::internal(e.to_string()))?
        .map_err(|e| WebError::internal(e.to_string()))?;

    Ok(Json(ForecastResponseBody::from(&outcome)))
}

pub async fn train(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TrainRequestBody>,
) -> Result<Json<TrainResponseBody>, WebError> {
    let job = state.training.submit(body.into())?;
    Ok(Json(TrainResponseBody::from(&job)))
}

pub async fn training_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<TrainResponseBody>, WebError> {
    let job = state.training.status(&job_id)?;
    Ok(Json(TrainResponseBody::from(&job)))
}

fn context_number(body: &OptimizePriceRequestBody, key: &str) -> Result<Option<f64>, WebError> {
    match body.context.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| WebError::unprocessable(format!("context.{key} must be a number"))),
    }
}

pub async fn optimize_price(
    Json(body): Json<OptimizePriceRequestBody>,
) -> Result<Json<PriceRecommendation>, WebError> {
    let base_price = context_number(&body, "basePrice")?;
    let occupancy = context_number(&body, "currentOccupancy")?;
    tracing::debug!(property_id = %body.property_id, date = %body.date, "price optimization");
    Ok(Json(recommend_price(base_price, occupancy)))
}

pub async fn not_found() -> WebError {
    WebError::not_found("Not Found")
}
