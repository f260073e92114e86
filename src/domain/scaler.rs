//! Min-max scaling into [0, 1].

use serde::{Deserialize, Serialize};

use crate::domain::error::ForecastError;

/// Min-max scaler: `(x - min) / (max - min)`.
///
/// A constant series has zero range; it transforms to zeros and inverse
/// transforms back to the constant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Option<f64>,
    max: Option<f64>,
}

impl MinMaxScaler {
    const EPSILON: f64 = 1e-12;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.min.is_some() && self.max.is_some()
    }

    pub fn fit(&mut self, values: &[f64]) -> Result<(), ForecastError> {
        if values.is_empty() {
            return Err(ForecastError::validation("cannot fit scaler on empty values"));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::numerical("cannot fit scaler on non-finite values"));
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        self.min = Some(min);
        self.max = Some(max);
        Ok(())
    }

    fn bounds(&self) -> Result<(f64, f64), ForecastError> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Ok((min, max)),
            _ => Err(ForecastError::ModelNotTrained),
        }
    }

    pub fn transform(&self, values: &[f64]) -> Result<Vec<f64>, ForecastError> {
        let (min, max) = self.bounds()?;
        let range = max - min;
        if range < Self::EPSILON {
            return Ok(vec![0.0; values.len()]);
        }
        Ok(values.iter().map(|v| (v - min) / range).collect())
    }

    pub fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>, ForecastError> {
        let (min, max) = self.bounds()?;
        let range = max - min;
        if range < Self::EPSILON {
            return Ok(vec![min; values.len()]);
        }
        Ok(values.iter().map(|v| v * range + min).collect())
    }

    pub fn fit_transform(&mut self, values: &[f64]) -> Result<Vec<f64>, ForecastError> {
        self.fit(values)?;
        self.transform(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fit_transform_maps_into_unit_interval() {
        let mut scaler = MinMaxScaler::new();
        let scaled = scaler.fit_transform(&[10.0, 20.0, 30.0]).unwrap();
        assert_relative_eq!(scaled[0], 0.0);
        assert_relative_eq!(scaled[1], 0.5);
        assert_relative_eq!(scaled[2], 1.0);
    }

    #[test]
    fn inverse_restores_original_scale() {
        let mut scaler = MinMaxScaler::new();
        scaler.fit(&[50.0, 150.0]).unwrap();
        let restored = scaler.inverse_transform(&[0.25, 1.2]).unwrap();
        assert_relative_eq!(restored[0], 75.0);
        // values outside the fitted range extrapolate linearly
        assert_relative_eq!(restored[1], 170.0);
    }

    #[test]
    fn constant_series() {
        let mut scaler = MinMaxScaler::new();
        let scaled = scaler.fit_transform(&[7.0, 7.0, 7.0]).unwrap();
        assert_eq!(scaled, vec![0.0, 0.0, 0.0]);
        assert_eq!(scaler.inverse_transform(&[0.3]).unwrap(), vec![7.0]);
    }

    #[test]
    fn unfitted_scaler_errors() {
        let scaler = MinMaxScaler::new();
        assert!(matches!(
            scaler.transform(&[1.0]),
            Err(ForecastError::ModelNotTrained)
        ));
    }

    #[test]
    fn rejects_empty_and_non_finite() {
        let mut scaler = MinMaxScaler::new();
        assert!(scaler.fit(&[]).is_err());
        assert!(scaler.fit(&[1.0, f64::NAN]).is_err());
    }
}
