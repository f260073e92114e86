//! Synchronous forecast requests: fit on supplied history or fall back.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::ForecastError;
use crate::domain::fallback::fallback_forecast;
use crate::domain::forecaster::{ForecastContext, Forecaster, TrainingParameters};
use crate::domain::seasonal_trend::SeasonalTrendForecaster;
use crate::domain::series::{ForecastPoint, Series};

/// Accuracy reported when no model was fit.
pub const NOMINAL_ACCURACY: f64 = 0.8;
pub const NOMINAL_MAPE: f64 = 0.2;

/// Quantity being forecast. Informational only: every metric runs the
/// same pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastMetric {
    Demand,
    Occupancy,
    Revenue,
}

impl ForecastMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            ForecastMetric::Demand => "demand",
            ForecastMetric::Occupancy => "occupancy",
            ForecastMetric::Revenue => "revenue",
        }
    }
}

impl fmt::Display for ForecastMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ForecastMetric {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "demand" => Ok(ForecastMetric::Demand),
            "occupancy" => Ok(ForecastMetric::Occupancy),
            "revenue" => Ok(ForecastMetric::Revenue),
            other => Err(ForecastError::validation(format!(
                "modelType must be one of demand, occupancy, revenue; got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForecastRequest {
    pub property_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub metric: ForecastMetric,
    /// `None` or an empty series selects the fallback heuristic.
    pub history: Option<Series>,
}

#[derive(Debug, Clone)]
pub struct ForecastOutcome {
    pub property_id: String,
    pub metric: ForecastMetric,
    pub points: Vec<ForecastPoint>,
    pub accuracy: Option<f64>,
    pub mape: Option<f64>,
    pub generated_at: DateTime<Utc>,
    pub used_fallback: bool,
}

/// Number of calendar days in `[start, end]`.
pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> Result<usize, ForecastError> {
    if end < start {
        return Err(ForecastError::validation(format!(
            "endDate {end} is before startDate {start}"
        )));
    }
    Ok((end - start).num_days() as usize + 1)
}

#[derive(Debug, Clone, Default)]
pub struct ForecastOrchestrator {
    /// Seasonal-trend hyperparameters applied to every synchronous fit.
    defaults: TrainingParameters,
}

impl ForecastOrchestrator {
    pub fn new(defaults: TrainingParameters) -> Self {
        Self { defaults }
    }

    pub fn forecast(&self, request: &ForecastRequest) -> Result<ForecastOutcome, ForecastError> {
        let periods = inclusive_days(request.start, request.end)?;

        let (points, accuracy, mape, used_fallback) = match &request.history {
            Some(series) if !series.is_empty() => {
                let mut model = SeasonalTrendForecaster::new();
                let metrics = model.train(series, &self.defaults)?;
                // Predictions cover every observed date plus `periods` days
                // past the end of history. Dates of the window that fall
                // inside history get in-sample fitted values.
                let points: Vec<ForecastPoint> = model
                    .forecast(periods, &ForecastContext::default())?
                    .into_iter()
                    .filter(|p| p.timestamp >= request.start && p.timestamp <= request.end)
                    .collect();
                (points, metrics.accuracy, metrics.mape, false)
            }
            _ => {
                tracing::warn!(
                    property_id = %request.property_id,
                    "no historical data provided, using fallback forecast"
                );
                let points = fallback_forecast(request.start, request.end)?;
                (points, NOMINAL_ACCURACY, NOMINAL_MAPE, true)
            }
        };

        tracing::info!(
            property_id = %request.property_id,
            metric = %request.metric,
            points = points.len(),
            used_fallback,
            "forecast generated"
        );

        Ok(ForecastOutcome {
            property_id: request.property_id.clone(),
            metric: request.metric,
            points,
            accuracy: Some(accuracy),
            mape: Some(mape),
            generated_at: Utc::now(),
            used_fallback,
        })
    }
}
