//! Sliding-window recurrent forecaster.
//!
//! Training normalises the series with a [`MinMaxScaler`], cuts it into
//! overlapping windows of length `L` each paired with the value that follows,
//! and fits a [`RecurrentNetwork`] on the first 80% of windows while the
//! remaining 20% drive early stopping. Forecasting feeds each prediction back
//! into the window, so step `k` is conditioned on steps `1..k`.

mod network;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

pub use network::{FitConfig, FitOutcome, NetworkShape, RecurrentNetwork};

use crate::domain::artifact::{read_artifact, write_artifact};
use crate::domain::error::ForecastError;
use crate::domain::forecaster::{ForecastContext, Forecaster, ModelType, TrainingParameters};
use crate::domain::metrics::{TrainingMetrics, mape, rmse};
use crate::domain::scaler::MinMaxScaler;
use crate::domain::series::{ForecastPoint, Series};

/// Upper bound on any layer width.
pub const MAX_UNITS: usize = 1024;
pub const DEFAULT_SEQUENCE_LENGTH: usize = 30;
pub const DEFAULT_EPOCHS: usize = 50;
pub const DEFAULT_BATCH_SIZE: usize = 32;
pub const DEFAULT_LEARNING_RATE: f64 = 0.001;
pub const DEFAULT_PATIENCE: usize = 10;
pub const DEFAULT_SEED: u64 = 42;
/// Confidence attached to sequence-window points, which carry no interval.
pub const NOMINAL_CONFIDENCE: f64 = 0.8;
const TRAIN_FRACTION: f64 = 0.8;

/// One supervised example: `input` is a window, `target` the value after it.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowExample {
    pub input: Vec<f64>,
    pub target: f64,
}

/// Overlapping windows of length `window` with their next value.
///
/// Yields `values.len() - window` examples, or none when the series is not
/// longer than the window.
pub fn sliding_windows(values: &[f64], window: usize) -> Vec<WindowExample> {
    let count = values.len().saturating_sub(window);
    (0..count)
        .map(|i| WindowExample {
            input: values[i..i + window].to_vec(),
            target: values[i + window],
        })
        .collect()
}

/// Chronological train/validation split. The training share is at least one
/// example; the validation share may be empty.
pub fn chronological_split(
    examples: &[WindowExample],
    train_fraction: f64,
) -> (&[WindowExample], &[WindowExample]) {
    let n = examples.len();
    let split = ((n as f64 * train_fraction).floor() as usize).max(1).min(n);
    examples.split_at(split)
}

/// Predicts `periods` values one at a time, sliding each prediction into
/// the window before the next call to `predict_next`.
pub fn autoregressive_rollout<F>(window: &[f64], periods: usize, mut predict_next: F) -> Vec<f64>
where
    F: FnMut(&[f64]) -> f64,
{
    let mut current: VecDeque<f64> = window.iter().copied().collect();
    let mut predictions = Vec::with_capacity(periods);
    for _ in 0..periods {
        let next = predict_next(current.make_contiguous());
        predictions.push(next);
        current.pop_front();
        current.push_back(next);
    }
    predictions
}

/// Companion file holding the fitted scaler for a model artifact:
/// `models/x.json` -> `models/x_scaler.json`.
pub fn scaler_path(model_path: &Path) -> PathBuf {
    let stem = model_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match model_path.extension() {
        Some(ext) => format!("{stem}_scaler.{}", ext.to_string_lossy()),
        None => format!("{stem}_scaler"),
    };
    model_path.with_file_name(file_name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceWindowSettings {
    pub sequence_length: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub patience: usize,
    pub seed: u64,
    pub shape: NetworkShape,
}

impl SequenceWindowSettings {
    fn from_parameters(
        params: &TrainingParameters,
        sequence_length: usize,
    ) -> Result<Self, ForecastError> {
        let d = NetworkShape::default();
        let settings = Self {
            sequence_length: params.usize_or("sequence_length", sequence_length)?,
            epochs: params.usize_or("epochs", DEFAULT_EPOCHS)?,
            batch_size: params.usize_or("batch_size", DEFAULT_BATCH_SIZE)?,
            learning_rate: params.f64_or("learning_rate", DEFAULT_LEARNING_RATE)?,
            patience: params.usize_or("patience", DEFAULT_PATIENCE)?,
            seed: params.usize_or("seed", DEFAULT_SEED as usize)? as u64,
            shape: NetworkShape {
                units_1: params.usize_or("units_1", d.units_1)?,
                units_2: params.usize_or("units_2", d.units_2)?,
                dense_units: params.usize_or("dense_units", d.dense_units)?,
                dropout: params.f64_or("dropout", d.dropout)?,
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ForecastError> {
        let counts = [
            ("sequence_length", self.sequence_length),
            ("epochs", self.epochs),
            ("batch_size", self.batch_size),
            ("units_1", self.shape.units_1),
            ("units_2", self.shape.units_2),
            ("dense_units", self.shape.dense_units),
        ];
        if let Some((key, _)) = counts.iter().find(|(_, v)| *v == 0) {
            return Err(ForecastError::validation(format!("{key} must be at least 1")));
        }
        let layers = [
            ("units_1", self.shape.units_1),
            ("units_2", self.shape.units_2),
            ("dense_units", self.shape.dense_units),
        ];
        if let Some((key, _)) = layers.iter().find(|(_, v)| *v > MAX_UNITS) {
            return Err(ForecastError::validation(format!(
                "{key} must be at most {MAX_UNITS}"
            )));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(ForecastError::validation("learning_rate must be positive"));
        }
        if self.shape.dropout.is_nan() || !(0.0..1.0).contains(&self.shape.dropout) {
            return Err(ForecastError::validation("dropout must be in [0, 1)"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedNetwork {
    settings: SequenceWindowSettings,
    network: RecurrentNetwork,
    /// Last `sequence_length` raw values of the training series.
    last_window: Vec<f64>,
    last_timestamp: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct SequenceWindowForecaster {
    sequence_length: usize,
    scaler: MinMaxScaler,
    fitted: Option<FittedNetwork>,
}

impl Default for SequenceWindowForecaster {
    fn default() -> Self {
        Self::new(DEFAULT_SEQUENCE_LENGTH)
    }
}

impl SequenceWindowForecaster {
    pub fn new(sequence_length: usize) -> Self {
        Self {
            sequence_length,
            scaler: MinMaxScaler::new(),
            fitted: None,
        }
    }

    /// Raw-scale predictions for the `periods` steps after `recent`, which
    /// must hold at least one window of raw values.
    pub fn forecast_values(&self, recent: &[f64], periods: usize) -> Result<Vec<f64>, ForecastError> {
        let fitted = self.fitted.as_ref().ok_or(ForecastError::ModelNotTrained)?;
        let window_len = fitted.settings.sequence_length;
        if recent.len() < window_len {
            return Err(ForecastError::validation(format!(
                "need at least {window_len} recent values, got {}",
                recent.len()
            )));
        }
        let scaled = self.scaler.transform(&recent[recent.len() - window_len..])?;
        let predictions =
            autoregressive_rollout(&scaled, periods, |w| fitted.network.predict(w));
        if predictions.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::numerical("sequence-window forecast is not finite"));
        }
        self.scaler.inverse_transform(&predictions)
    }
}

impl Forecaster for SequenceWindowForecaster {
    fn model_type(&self) -> ModelType {
        ModelType::SequenceWindow
    }

    /// Windows are cut from the series in timestamp order, which
    /// [`Series::new`] establishes regardless of the order values arrived in.
    fn train(
        &mut self,
        series: &Series,
        parameters: &TrainingParameters,
    ) -> Result<TrainingMetrics, ForecastError> {
        let settings = SequenceWindowSettings::from_parameters(parameters, self.sequence_length)?;
        let window_len = settings.sequence_length;
        if series.len() <= window_len {
            return Err(ForecastError::InsufficientData {
                observations: series.len(),
                window: window_len,
            });
        }
        let last_timestamp = series.last_timestamp().ok_or(ForecastError::InsufficientData {
            observations: 0,
            window: window_len,
        })?;

        let values = series.values();
        let mut scaler = MinMaxScaler::new();
        let scaled = scaler.fit_transform(&values)?;
        let examples = sliding_windows(&scaled, window_len);
        let (train, validation) = chronological_split(&examples, TRAIN_FRACTION);
        // tiny series leave nothing held out; monitor the training set instead
        let validation = if validation.is_empty() { train } else { validation };

        tracing::info!(
            observations = series.len(),
            train = train.len(),
            validation = validation.len(),
            window = window_len,
            "training sequence-window model"
        );

        let mut rng = StdRng::seed_from_u64(settings.seed);
        let mut network = RecurrentNetwork::new(settings.shape, &mut rng);
        let outcome = network.fit(
            train,
            validation,
            FitConfig {
                epochs: settings.epochs,
                batch_size: settings.batch_size,
                learning_rate: settings.learning_rate,
                patience: settings.patience,
            },
            &mut rng,
        )?;

        let predicted: Vec<f64> = validation.iter().map(|e| network.predict(&e.input)).collect();
        let targets: Vec<f64> = validation.iter().map(|e| e.target).collect();
        let normalized_rmse = rmse(&targets, &predicted);
        let raw_mape = mape(
            &scaler.inverse_transform(&targets)?,
            &scaler.inverse_transform(&predicted)?,
        );
        let metrics = TrainingMetrics::from_errors(raw_mape, normalized_rmse);

        tracing::info!(
            epochs_run = outcome.epochs_run,
            best_epoch = outcome.best_epoch,
            mape = metrics.mape,
            rmse = metrics.rmse,
            "sequence-window training complete"
        );

        self.sequence_length = window_len;
        self.scaler = scaler;
        self.fitted = Some(FittedNetwork {
            settings,
            network,
            last_window: values[values.len() - window_len..].to_vec(),
            last_timestamp,
        });
        Ok(metrics)
    }

    fn forecast(
        &self,
        periods: usize,
        context: &ForecastContext,
    ) -> Result<Vec<ForecastPoint>, ForecastError> {
        let fitted = self.fitted.as_ref().ok_or(ForecastError::ModelNotTrained)?;
        let recent = context.recent_values.as_deref().unwrap_or(&fitted.last_window);
        let values = self.forecast_values(recent, periods)?;
        let anchor = context.anchor.unwrap_or(fitted.last_timestamp);
        let confidence = context.confidence.unwrap_or(NOMINAL_CONFIDENCE);

        values
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let timestamp = context
                    .frequency
                    .advance(anchor, i + 1)
                    .ok_or_else(|| ForecastError::validation("forecast horizon out of range"))?;
                Ok(ForecastPoint {
                    timestamp,
                    predicted_value: value,
                    lower_bound: None,
                    upper_bound: None,
                    confidence,
                })
            })
            .collect()
    }

    fn save(&self, path: &Path) -> Result<(), ForecastError> {
        let Some(fitted) = &self.fitted else {
            return Ok(());
        };
        // scaler first, so a model file never exists without its companion
        let scaler_file = scaler_path(path);
        write_artifact(&scaler_file, ModelType::SequenceWindow, &self.scaler)?;
        if let Err(e) = write_artifact(path, ModelType::SequenceWindow, fitted) {
            if let Err(cleanup) = std::fs::remove_file(&scaler_file) {
                tracing::warn!(
                    path = %scaler_file.display(),
                    error = %cleanup,
                    "could not remove scaler file"
                );
            }
            return Err(e);
        }
        tracing::info!(path = %path.display(), "sequence-window model saved");
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<(), ForecastError> {
        let fitted: FittedNetwork = read_artifact(path, ModelType::SequenceWindow)?;
        let scaler: MinMaxScaler = read_artifact(&scaler_path(path), ModelType::SequenceWindow)?;
        if !scaler.is_fitted() {
            return Err(ForecastError::ArtifactLoad {
                path: scaler_path(path).display().to_string(),
                reason: "scaler was saved unfitted".to_string(),
            });
        }
        self.sequence_length = fitted.settings.sequence_length;
        self.scaler = scaler;
        self.fitted = Some(fitted);
        tracing::info!(path = %path.display(), "sequence-window model loaded");
        Ok(())
    }

    fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }
}
