//! Common contract for forecasting strategies.
//!
//! Both strategies train on a [`Series`], forecast a number of periods and
//! persist their fitted state. Callers pick a strategy through [`ModelType`]
//! and then work only against `dyn Forecaster`.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::error::ForecastError;
use crate::domain::metrics::TrainingMetrics;
use crate::domain::seasonal_trend::SeasonalTrendForecaster;
use crate::domain::sequence_window::SequenceWindowForecaster;
use crate::domain::series::{ForecastPoint, Frequency, Series};

pub trait Forecaster: Send {
    fn model_type(&self) -> ModelType;

    /// Fits internal state from `series`.
    fn train(
        &mut self,
        series: &Series,
        parameters: &TrainingParameters,
    ) -> Result<TrainingMetrics, ForecastError>;

    /// Projects `periods` steps ahead, ordered by timestamp.
    fn forecast(
        &self,
        periods: usize,
        context: &ForecastContext,
    ) -> Result<Vec<ForecastPoint>, ForecastError>;

    /// Persists fitted state. A no-op on an untrained instance.
    fn save(&self, path: &Path) -> Result<(), ForecastError>;

    fn load(&mut self, path: &Path) -> Result<(), ForecastError>;

    fn is_trained(&self) -> bool;
}

/// Model type named in a training request.
///
/// `Optimization` is accepted on the wire but has no trainable strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    #[serde(rename = "seasonal-trend", alias = "prophet")]
    SeasonalTrend,
    #[serde(rename = "sequence-window", alias = "lstm")]
    SequenceWindow,
    #[serde(rename = "optimization")]
    Optimization,
}

impl ModelType {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::SeasonalTrend => "seasonal-trend",
            ModelType::SequenceWindow => "sequence-window",
            ModelType::Optimization => "optimization",
        }
    }

    /// Prefix used for artifact file names.
    pub fn artifact_prefix(self) -> &'static str {
        match self {
            ModelType::SeasonalTrend => "seasonal_trend",
            ModelType::SequenceWindow => "sequence_window",
            ModelType::Optimization => "optimization",
        }
    }

    /// Instantiates an untrained strategy for this model type.
    pub fn new_forecaster(self) -> Result<Box<dyn Forecaster>, ForecastError> {
        match self {
            ModelType::SeasonalTrend => Ok(Box::new(SeasonalTrendForecaster::new())),
            ModelType::SequenceWindow => Ok(Box::new(SequenceWindowForecaster::default())),
            ModelType::Optimization => Err(ForecastError::UnknownModelType {
                model_type: self.as_str().to_string(),
            }),
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "seasonal-trend" | "prophet" => Ok(ModelType::SeasonalTrend),
            "sequence-window" | "lstm" => Ok(ModelType::SequenceWindow),
            "optimization" => Ok(ModelType::Optimization),
            other => Err(ForecastError::validation(format!(
                "modelType must be one of seasonal-trend, sequence-window, optimization; got {other}"
            ))),
        }
    }
}

/// Free-form hyperparameter overrides supplied with a training request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainingParameters(Map<String, Value>);

impl TrainingParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Numeric override for `key`. A present value of the wrong type is an
    /// error rather than a silent default.
    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64, ForecastError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => v.as_f64().ok_or_else(|| {
                ForecastError::validation(format!("parameter {key} must be a number"))
            }),
        }
    }

    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize, ForecastError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => v
                .as_u64()
                .map(|n| n as usize)
                .or_else(|| {
                    v.as_f64()
                        .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                        .map(|f| f as usize)
                })
                .ok_or_else(|| {
                    ForecastError::validation(format!(
                        "parameter {key} must be a non-negative integer"
                    ))
                }),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, ForecastError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| {
                ForecastError::validation(format!("parameter {key} must be a boolean"))
            }),
        }
    }
}

impl From<Map<String, Value>> for TrainingParameters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Per-call forecasting options.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastContext {
    pub frequency: Frequency,
    /// Seasonal-trend: also emit fitted points over the training window.
    pub include_history: bool,
    /// Overrides the strategy's nominal confidence.
    pub confidence: Option<f64>,
    /// Sequence-window: most recent raw values to condition on.
    pub recent_values: Option<Vec<f64>>,
    /// Sequence-window: timestamp of the last value in `recent_values`.
    pub anchor: Option<NaiveDate>,
}

impl Default for ForecastContext {
    fn default() -> Self {
        Self {
            frequency: Frequency::Daily,
            include_history: true,
            confidence: None,
            recent_values: None,
            anchor: None,
        }
    }
}

impl ForecastContext {
    pub fn future_only() -> Self {
        Self {
            include_history: false,
            ..Self::default()
        }
    }
}
