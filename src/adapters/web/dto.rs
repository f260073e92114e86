//! Wire types. Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use crate::adapters::report::{ForecastPointBody, ForecastResponseBody};
use crate::domain::forecaster::{ModelType, TrainingParameters};
use crate::domain::series::DataPoint;
use crate::domain::training::{JobStatus, TrainingJob, TrainingRequest};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastRequestBody {
    pub property_id: String,
    pub start_date: String,
    pub end_date: String,
    pub model_type: String,
    #[serde(default)]
    pub historical_data: Option<Vec<DataPoint>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainRequestBody {
    pub model_type: ModelType,
    #[serde(default)]
    pub property_id: Option<String>,
    pub training_data: Vec<DataPoint>,
    #[serde(default)]
    pub parameters: Option<TrainingParameters>,
}

impl From<TrainRequestBody> for TrainingRequest {
    fn from(body: TrainRequestBody) -> Self {
        Self {
            model_type: body.model_type,
            property_id: body.property_id,
            training_data: body.training_data,
            parameters: body.parameters.unwrap_or_default(),
        }
    }
}

/// Shared by the submit response and the status endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainResponseBody {
    pub job_id: String,
    pub model_type: ModelType,
    pub status: JobStatus,
    pub accuracy: Option<f64>,
    pub mape: Option<f64>,
    pub error_message: Option<String>,
}

impl From<&TrainingJob> for TrainResponseBody {
    fn from(job: &TrainingJob) -> Self {
        Self {
            job_id: job.job_id.clone(),
            model_type: job.model_type,
            status: job.status,
            accuracy: job.accuracy,
            mape: job.mape,
            error_message: job.error_message.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizePriceRequestBody {
    pub property_id: String,
    pub date: String,
    #[serde(default)]
    pub context: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthBody {
    pub status: String,
    pub timestamp: String,
    pub service: String,
}
