//! Additive seasonal-trend decomposition forecaster.
//!
//! `y(t) = trend(t) + yearly(t) + weekly(t) [+ daily(t)]`
//!
//! - Time is scaled to [0, 1] over the history and the target is divided by
//!   its largest magnitude.
//! - The trend is piecewise linear: `k*t + m + sum(delta_j * max(t - s_j, 0))`
//!   with changepoints `s_j` spread over the first part of the history.
//! - Each seasonality is a Fourier series `sum(a_n sin(2pi n d / P) + b_n cos(...))`
//!   over `d` days since the first observation.
//! - Coefficients are the MAP estimate under Gaussian priors: a ridge system
//!   whose per-column penalty is `sigma^2 / prior_scale^2`, with `sigma^2`
//!   taken from a plain linear fit.
//! - Intervals combine observation noise with the variance of trend changes
//!   that could occur past the end of the history.

use std::path::Path;

use chrono::NaiveDate;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::domain::artifact::{read_artifact, write_artifact};
use crate::domain::error::ForecastError;
use crate::domain::forecaster::{ForecastContext, Forecaster, ModelType, TrainingParameters};
use crate::domain::metrics::TrainingMetrics;
use crate::domain::series::{ForecastPoint, Series};

pub const MIN_OBSERVATIONS: usize = 2;
pub const DEFAULT_CHANGEPOINT_PRIOR_SCALE: f64 = 0.05;
pub const DEFAULT_SEASONALITY_PRIOR_SCALE: f64 = 10.0;
pub const DEFAULT_INTERVAL_WIDTH: f64 = 0.8;
const DEFAULT_N_CHANGEPOINTS: usize = 25;
const DEFAULT_CHANGEPOINT_RANGE: f64 = 0.8;

/// Penalty on intercept and slope; keeps degenerate histories solvable
/// while staying well below the seasonal penalty.
const BASE_PENALTY: f64 = 1e-8;
/// Floor on the scaled noise variance used to derive penalties.
const MIN_NOISE_VARIANCE: f64 = 1e-4;
const PIVOT_TOLERANCE: f64 = 1e-14;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalTrendSettings {
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    pub yearly_seasonality: bool,
    pub weekly_seasonality: bool,
    pub daily_seasonality: bool,
    pub n_changepoints: usize,
    pub changepoint_range: f64,
    pub interval_width: f64,
}

impl Default for SeasonalTrendSettings {
    fn default() -> Self {
        Self {
            changepoint_prior_scale: DEFAULT_CHANGEPOINT_PRIOR_SCALE,
            seasonality_prior_scale: DEFAULT_SEASONALITY_PRIOR_SCALE,
            yearly_seasonality: true,
            weekly_seasonality: true,
            daily_seasonality: false,
            n_changepoints: DEFAULT_N_CHANGEPOINTS,
            changepoint_range: DEFAULT_CHANGEPOINT_RANGE,
            interval_width: DEFAULT_INTERVAL_WIDTH,
        }
    }
}

impl SeasonalTrendSettings {
    pub fn from_parameters(params: &TrainingParameters) -> Result<Self, ForecastError> {
        let d = Self::default();
        let settings = Self {
            changepoint_prior_scale: params
                .f64_or("changepoint_prior_scale", d.changepoint_prior_scale)?,
            seasonality_prior_scale: params
                .f64_or("seasonality_prior_scale", d.seasonality_prior_scale)?,
            yearly_seasonality: params.bool_or("yearly_seasonality", d.yearly_seasonality)?,
            weekly_seasonality: params.bool_or("weekly_seasonality", d.weekly_seasonality)?,
            daily_seasonality: params.bool_or("daily_seasonality", d.daily_seasonality)?,
            n_changepoints: params.usize_or("n_changepoints", d.n_changepoints)?,
            changepoint_range: params.f64_or("changepoint_range", d.changepoint_range)?,
            interval_width: params.f64_or("interval_width", d.interval_width)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ForecastError> {
        if self.changepoint_prior_scale.is_nan() || self.changepoint_prior_scale <= 0.0 {
            return Err(ForecastError::validation(
                "changepoint_prior_scale must be positive",
            ));
        }
        if self.seasonality_prior_scale.is_nan() || self.seasonality_prior_scale <= 0.0 {
            return Err(ForecastError::validation(
                "seasonality_prior_scale must be positive",
            ));
        }
        if self.changepoint_range.is_nan()
            || self.changepoint_range <= 0.0
            || self.changepoint_range > 1.0
        {
            return Err(ForecastError::validation(
                "changepoint_range must be in (0, 1]",
            ));
        }
        validate_interval_width(self.interval_width)
    }
}

fn validate_interval_width(width: f64) -> Result<(), ForecastError> {
    if width > 0.0 && width < 1.0 {
        Ok(())
    } else {
        Err(ForecastError::validation(format!(
            "interval width must be in (0, 1), got {width}"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Seasonality {
    period_days: f64,
    order: usize,
}

impl Seasonality {
    const YEARLY: Self = Self {
        period_days: 365.25,
        order: 10,
    };
    const WEEKLY: Self = Self {
        period_days: 7.0,
        order: 3,
    };
    const DAILY: Self = Self {
        period_days: 1.0,
        order: 4,
    };

    fn columns(&self) -> usize {
        2 * self.order
    }

    fn push_features(&self, day: f64, row: &mut Vec<f64>) {
        for n in 1..=self.order {
            let angle = 2.0 * std::f64::consts::PI * n as f64 * day / self.period_days;
            row.push(angle.sin());
            row.push(angle.cos());
        }
    }
}

/// Fitted state, persisted as the artifact payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedModel {
    settings: SeasonalTrendSettings,
    start: NaiveDate,
    end: NaiveDate,
    history_dates: Vec<NaiveDate>,
    span_days: f64,
    y_scale: f64,
    changepoints: Vec<f64>,
    seasonalities: Vec<Seasonality>,
    /// `[m, k, delta_1..delta_c, seasonal...]`
    coefficients: Vec<f64>,
    sigma_obs: f64,
}

impl FittedModel {
    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (date - self.start).num_days() as f64 / self.span_days
    }

    fn day_offset(&self, date: NaiveDate) -> f64 {
        (date - self.start).num_days() as f64
    }

    fn predict_scaled(&self, date: NaiveDate) -> f64 {
        let row = design_row(
            self.scaled_time(date),
            self.day_offset(date),
            &self.changepoints,
            &self.seasonalities,
        );
        ArrayView1::from(row.as_slice()).dot(&ArrayView1::from(self.coefficients.as_slice()))
    }

    fn predict(&self, date: NaiveDate) -> f64 {
        self.predict_scaled(date) * self.y_scale
    }

    /// Variance of the trend at scaled time `t` from changepoints that may
    /// occur after the history ends. Changes arrive at the historical rate
    /// with Laplace-distributed magnitude, so the variance grows with the
    /// cube of the horizon.
    fn trend_variance(&self, t: f64) -> f64 {
        let horizon = t - 1.0;
        if horizon <= 0.0 || self.changepoints.is_empty() {
            return 0.0;
        }
        let deltas = &self.coefficients[2..2 + self.changepoints.len()];
        let laplace_scale =
            deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64 + 1e-8;
        let rate = self.changepoints.len() as f64;
        rate * 2.0 * laplace_scale.powi(2) * horizon.powi(3) / 3.0
    }
}

fn design_row(t: f64, day: f64, changepoints: &[f64], seasonalities: &[Seasonality]) -> Vec<f64> {
    let mut row = Vec::with_capacity(
        2 + changepoints.len() + seasonalities.iter().map(Seasonality::columns).sum::<usize>(),
    );
    row.push(1.0);
    row.push(t);
    for &s in changepoints {
        row.push((t - s).max(0.0));
    }
    for season in seasonalities {
        season.push_features(day, &mut row);
    }
    row
}

/// Changepoint locations in scaled time: evenly spaced indices over the
/// first `range` fraction of the history, first index excluded.
fn select_changepoints(t: &[f64], requested: usize, range: f64) -> Vec<f64> {
    let hist_size = ((t.len() as f64) * range).floor() as usize;
    let count = requested.min(hist_size.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }
    let last = (hist_size - 1) as f64;
    (1..=count)
        .map(|i| {
            let idx = (last * i as f64 / count as f64).round() as usize;
            t[idx]
        })
        .collect()
}

/// Stacks design rows into an `n x columns` matrix.
fn design_matrix(rows: &[Vec<f64>], columns: usize) -> Array2<f64> {
    let mut x = Array2::zeros((rows.len(), columns));
    for (mut target, row) in x.rows_mut().into_iter().zip(rows) {
        target.assign(&ArrayView1::from(row.as_slice()));
    }
    x
}

/// Solves `(X'X + diag(penalties)) b = X'y` by Gauss-Jordan elimination
/// with partial pivoting.
fn solve_ridge(
    x: &Array2<f64>,
    y: &Array1<f64>,
    penalties: &Array1<f64>,
) -> Result<Array1<f64>, ForecastError> {
    let p = penalties.len();
    let mut a = x.t().dot(x);
    let mut diag = a.diag_mut();
    diag += penalties;
    let mut b = x.t().dot(y);

    for col in 0..p {
        let pivot_row = (col..p)
            .max_by(|&r1, &r2| a[[r1, col]].abs().total_cmp(&a[[r2, col]].abs()))
            .unwrap_or(col);
        if a[[pivot_row, col]].abs() < PIVOT_TOLERANCE {
            return Err(ForecastError::numerical("singular design matrix"));
        }
        if pivot_row != col {
            for j in 0..p {
                a.swap([col, j], [pivot_row, j]);
            }
            b.swap(col, pivot_row);
        }

        let inv = 1.0 / a[[col, col]];
        a.row_mut(col).mapv_inplace(|v| v * inv);
        b[col] *= inv;

        let pivot = a.row(col).to_owned();
        let pivot_b = b[col];
        for r in 0..p {
            if r == col {
                continue;
            }
            let factor = a[[r, col]];
            if factor == 0.0 {
                continue;
            }
            a.row_mut(r).scaled_add(-factor, &pivot);
            b[r] -= factor * pivot_b;
        }
    }

    if b.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::numerical("non-finite coefficients"));
    }
    Ok(b)
}

fn residual_variance(x: &Array2<f64>, y: &Array1<f64>, coefficients: &Array1<f64>) -> f64 {
    let residuals = y - &x.dot(coefficients);
    residuals.mapv(|r| r * r).sum() / y.len().max(1) as f64
}

#[derive(Debug, Clone, Default)]
pub struct SeasonalTrendForecaster {
    fitted: Option<FittedModel>,
}

impl SeasonalTrendForecaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn fit(series: &Series, settings: SeasonalTrendSettings) -> Result<FittedModel, ForecastError> {
        let observations = series.observations();
        let start = observations[0].timestamp;
        let end = observations[observations.len() - 1].timestamp;
        let span_days = ((end - start).num_days() as f64).max(1.0);

        let y_raw = series.values();
        if y_raw.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::validation("training values must be finite"));
        }
        let max_abs = y_raw.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let y_scale = if max_abs > 0.0 { max_abs } else { 1.0 };
        let y: Array1<f64> = y_raw.iter().map(|v| v / y_scale).collect();

        let t: Vec<f64> = observations
            .iter()
            .map(|o| (o.timestamp - start).num_days() as f64 / span_days)
            .collect();
        let days: Vec<f64> = observations
            .iter()
            .map(|o| (o.timestamp - start).num_days() as f64)
            .collect();

        let changepoints =
            select_changepoints(&t, settings.n_changepoints, settings.changepoint_range);

        let mut seasonalities = Vec::new();
        if settings.yearly_seasonality {
            seasonalities.push(Seasonality::YEARLY);
        }
        if settings.weekly_seasonality {
            seasonalities.push(Seasonality::WEEKLY);
        }
        if settings.daily_seasonality {
            seasonalities.push(Seasonality::DAILY);
        }

        // Noise estimate from a plain linear trend.
        let linear_rows: Vec<Vec<f64>> = t.iter().map(|&ti| vec![1.0, ti]).collect();
        let linear_x = design_matrix(&linear_rows, 2);
        let linear = solve_ridge(&linear_x, &y, &Array1::from_elem(2, BASE_PENALTY))?;
        let noise = residual_variance(&linear_x, &y, &linear).max(MIN_NOISE_VARIANCE);

        let rows: Vec<Vec<f64>> = t
            .iter()
            .zip(&days)
            .map(|(&ti, &di)| design_row(ti, di, &changepoints, &seasonalities))
            .collect();
        let seasonal_columns: usize = seasonalities.iter().map(Seasonality::columns).sum();
        let mut penalties = vec![BASE_PENALTY, BASE_PENALTY];
        penalties.extend(
            std::iter::repeat_n(noise / settings.changepoint_prior_scale.powi(2), changepoints.len()),
        );
        penalties.extend(
            std::iter::repeat_n(noise / settings.seasonality_prior_scale.powi(2), seasonal_columns),
        );

        let x = design_matrix(&rows, penalties.len());
        let coefficients = solve_ridge(&x, &y, &Array1::from(penalties))?;
        let sigma_obs = residual_variance(&x, &y, &coefficients).sqrt();
        let coefficients = coefficients.to_vec();

        let mut history_dates: Vec<NaiveDate> = observations.iter().map(|o| o.timestamp).collect();
        history_dates.dedup();

        Ok(FittedModel {
            settings,
            start,
            end,
            history_dates,
            span_days,
            y_scale,
            changepoints,
            seasonalities,
            coefficients,
            sigma_obs,
        })
    }
}

impl Forecaster for SeasonalTrendForecaster {
    fn model_type(&self) -> ModelType {
        ModelType::SeasonalTrend
    }

    fn train(
        &mut self,
        series: &Series,
        parameters: &TrainingParameters,
    ) -> Result<TrainingMetrics, ForecastError> {
        if series.len() < MIN_OBSERVATIONS {
            return Err(ForecastError::UntrainedData {
                model: ModelType::SeasonalTrend.to_string(),
                observations: series.len(),
                minimum: MIN_OBSERVATIONS,
            });
        }
        tracing::info!(observations = series.len(), "training seasonal-trend model");

        let settings = SeasonalTrendSettings::from_parameters(parameters)?;
        let model = Self::fit(series, settings)?;

        // In-sample evaluation over the training window.
        let actual = series.values();
        let predicted: Vec<f64> = series
            .observations()
            .iter()
            .map(|o| model.predict(o.timestamp))
            .collect();
        let metrics = TrainingMetrics::compute(&actual, &predicted);

        tracing::info!(
            mape = metrics.mape,
            rmse = metrics.rmse,
            changepoints = model.changepoints.len(),
            "seasonal-trend training complete"
        );
        self.fitted = Some(model);
        Ok(metrics)
    }

    fn forecast(
        &self,
        periods: usize,
        context: &ForecastContext,
    ) -> Result<Vec<ForecastPoint>, ForecastError> {
        let model = self.fitted.as_ref().ok_or(ForecastError::ModelNotTrained)?;
        let width = context.confidence.unwrap_or(model.settings.interval_width);
        validate_interval_width(width)?;

        let normal = Normal::new(0.0, 1.0).map_err(|e| ForecastError::numerical(e.to_string()))?;
        let z = normal.inverse_cdf(0.5 + width / 2.0);

        let mut dates = if context.include_history {
            model.history_dates.clone()
        } else {
            Vec::new()
        };
        dates.reserve(periods);
        for step in 1..=periods {
            let date = context
                .frequency
                .advance(model.end, step)
                .ok_or_else(|| ForecastError::validation("forecast horizon out of range"))?;
            dates.push(date);
        }

        let points = dates
            .into_iter()
            .map(|date| {
                let predicted = model.predict(date);
                let variance =
                    model.sigma_obs.powi(2) + model.trend_variance(model.scaled_time(date));
                let margin = z * variance.sqrt() * model.y_scale;
                ForecastPoint {
                    timestamp: date,
                    predicted_value: predicted,
                    lower_bound: Some(predicted - margin),
                    upper_bound: Some(predicted + margin),
                    confidence: width,
                }
            })
            .collect();
        Ok(points)
    }

    fn save(&self, path: &Path) -> Result<(), ForecastError> {
        let Some(model) = &self.fitted else {
            return Ok(());
        };
        write_artifact(path, ModelType::SeasonalTrend, model)?;
        tracing::info!(path = %path.display(), "seasonal-trend model saved");
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<(), ForecastError> {
        let model: FittedModel = read_artifact(path, ModelType::SeasonalTrend)?;
        self.fitted = Some(model);
        tracing::info!(path = %path.display(), "seasonal-trend model loaded");
        Ok(())
    }

    fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }
}
