//! Forecast bodies shared by the CLI output and the HTTP service.
//! Field names are camelCase and dates are `YYYY-MM-DD`.

use serde::{Deserialize, Serialize};

use crate::domain::orchestrator::ForecastOutcome;
use crate::domain::series::ForecastPoint;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPointBody {
    pub date: String,
    pub predicted_value: f64,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub confidence: f64,
}

impl From<&ForecastPoint> for ForecastPointBody {
    fn from(p: &ForecastPoint) -> Self {
        Self {
            date: p.timestamp.format("%Y-%m-%d").to_string(),
            predicted_value: p.predicted_value,
            lower_bound: p.lower_bound,
            upper_bound: p.upper_bound,
            confidence: p.confidence,
        }
    }
}

pub fn point_bodies(points: &[ForecastPoint]) -> Vec<ForecastPointBody> {
    points.iter().map(ForecastPointBody::from).collect()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastResponseBody {
    pub property_id: String,
    pub model_type: String,
    pub forecast: Vec<ForecastPointBody>,
    pub accuracy: Option<f64>,
    pub mape: Option<f64>,
    pub generated_at: String,
}

impl From<&ForecastOutcome> for ForecastResponseBody {
    fn from(o: &ForecastOutcome) -> Self {
        Self {
            property_id: o.property_id.clone(),
            model_type: o.metric.to_string(),
            forecast: point_bodies(&o.points),
            accuracy: o.accuracy,
            mape: o.mape,
            generated_at: o.generated_at.to_rfc3339(),
        }
    }
}
