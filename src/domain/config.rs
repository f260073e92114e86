//! Service settings read through [`ConfigPort`] and validated up front.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::domain::error::ForecastError;
use crate::domain::forecaster::TrainingParameters;
use crate::domain::seasonal_trend::{
    DEFAULT_CHANGEPOINT_PRIOR_SCALE, DEFAULT_INTERVAL_WIDTH, DEFAULT_SEASONALITY_PRIOR_SCALE,
};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8000";
pub const DEFAULT_MODELS_DIR: &str = "/app/models";
pub const DEFAULT_LOG_FILTER: &str = "nexus_forecast=info,tower_http=info";
pub const MODELS_DIR_ENV: &str = "MODELS_DIR";

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub listen: SocketAddr,
    pub models_dir: PathBuf,
    pub log_filter: String,
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    pub interval_width: f64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            changepoint_prior_scale: DEFAULT_CHANGEPOINT_PRIOR_SCALE,
            seasonality_prior_scale: DEFAULT_SEASONALITY_PRIOR_SCALE,
            interval_width: DEFAULT_INTERVAL_WIDTH,
        }
    }
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> ForecastError {
    ForecastError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn read_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, ForecastError> {
    match config.get_f64(section, key) {
        None => Ok(default),
        Some(Ok(v)) => Ok(v),
        Some(Err(reason)) => Err(invalid(section, key, reason)),
    }
}

impl ServiceConfig {
    pub fn from_port(config: &dyn ConfigPort) -> Result<Self, ForecastError> {
        let d = Self::default();

        let listen_raw = config
            .get_string("service", "listen")
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen: SocketAddr = listen_raw
            .trim()
            .parse()
            .map_err(|e| invalid("service", "listen", format!("{listen_raw:?}: {e}")))?;

        let models_dir = match config.get_string("service", "models_dir") {
            Some(dir) if dir.trim().is_empty() => {
                return Err(invalid("service", "models_dir", "must not be empty"));
            }
            Some(dir) => PathBuf::from(dir.trim()),
            None => d.models_dir,
        };

        let log_filter = config
            .get_string("logging", "filter")
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(d.log_filter);

        let settings = Self {
            listen,
            models_dir,
            log_filter,
            changepoint_prior_scale: read_f64(
                config,
                "seasonal_trend",
                "changepoint_prior_scale",
                d.changepoint_prior_scale,
            )?,
            seasonality_prior_scale: read_f64(
                config,
                "seasonal_trend",
                "seasonality_prior_scale",
                d.seasonality_prior_scale,
            )?,
            interval_width: read_f64(config, "seasonal_trend", "interval_width", d.interval_width)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Applies `MODELS_DIR` when it is set and non-empty.
    pub fn with_models_dir_override(mut self, value: Option<String>) -> Self {
        if let Some(dir) = value.filter(|d| !d.trim().is_empty()) {
            self.models_dir = PathBuf::from(dir.trim());
        }
        self
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_models_dir_override(std::env::var(MODELS_DIR_ENV).ok())
    }

    fn validate(&self) -> Result<(), ForecastError> {
        for (key, value) in [
            ("changepoint_prior_scale", self.changepoint_prior_scale),
            ("seasonality_prior_scale", self.seasonality_prior_scale),
        ] {
            if value.is_nan() || value <= 0.0 {
                return Err(invalid("seasonal_trend", key, "must be positive"));
            }
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(invalid("seasonal_trend", "interval_width", "must be in (0, 1)"));
        }
        Ok(())
    }

    /// Seasonal-trend defaults for synchronous forecasts.
    pub fn seasonal_trend_parameters(&self) -> TrainingParameters {
        TrainingParameters::new()
            .with("changepoint_prior_scale", self.changepoint_prior_scale)
            .with("seasonality_prior_scale", self.seasonality_prior_scale)
            .with("interval_width", self.interval_width)
    }
}
