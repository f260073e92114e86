//! Observations, series and forecast points.

use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::error::ForecastError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: NaiveDate,
    pub value: f64,
    pub metadata: Option<Map<String, Value>>,
}

impl Observation {
    pub fn new(timestamp: NaiveDate, value: f64) -> Self {
        Self {
            timestamp,
            value,
            metadata: None,
        }
    }
}

/// Ordered sequence of observations for one property and metric.
///
/// Duplicate timestamps are kept as supplied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    observations: Vec<Observation>,
}

impl Series {
    /// Builds a series ordered by timestamp. The sort is stable, so
    /// observations sharing a timestamp keep their input order.
    pub fn new(mut observations: Vec<Observation>) -> Self {
        observations.sort_by_key(|o| o.timestamp);
        Self { observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn values(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.value).collect()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.timestamp)
    }
}

/// Observation as supplied by a caller, before date parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub date: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl DataPoint {
    pub fn new(date: impl Into<String>, value: f64) -> Self {
        Self {
            date: date.into(),
            value,
            metadata: None,
        }
    }
}

impl From<&Observation> for DataPoint {
    fn from(o: &Observation) -> Self {
        Self {
            date: o.timestamp.format("%Y-%m-%d").to_string(),
            value: o.value,
            metadata: o.metadata.clone(),
        }
    }
}

impl TryFrom<&DataPoint> for Observation {
    type Error = ForecastError;

    fn try_from(point: &DataPoint) -> Result<Self, Self::Error> {
        if !point.value.is_finite() {
            return Err(ForecastError::validation(format!(
                "value for {} is not finite",
                point.date
            )));
        }
        Ok(Observation {
            timestamp: parse_date(&point.date)?,
            value: point.value,
            metadata: point.metadata.clone(),
        })
    }
}

/// Parses caller-supplied points into a series; any bad date fails the lot.
pub fn build_series(points: &[DataPoint]) -> Result<Series, ForecastError> {
    let observations = points
        .iter()
        .map(Observation::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Series::new(observations))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: NaiveDate,
    pub predicted_value: f64,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub confidence: f64,
}

impl ForecastPoint {
    /// Whether the bounds, when present, bracket the predicted value.
    pub fn is_bracketed(&self) -> bool {
        let lower_ok = self.lower_bound.is_none_or(|l| l <= self.predicted_value);
        let upper_ok = self.upper_bound.is_none_or(|u| self.predicted_value <= u);
        lower_ok && upper_ok
    }
}

/// Spacing between generated forecast timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
}

impl Frequency {
    pub fn step_days(self) -> u64 {
        match self {
            Frequency::Daily => 1,
            Frequency::Weekly => 7,
        }
    }

    /// Timestamp `steps` periods after `from`.
    pub fn advance(self, from: NaiveDate, steps: usize) -> Option<NaiveDate> {
        from.checked_add_days(Days::new(self.step_days() * steps as u64))
    }

    pub fn parse(code: &str) -> Result<Self, ForecastError> {
        match code.trim().to_uppercase().as_str() {
            "D" | "DAILY" => Ok(Frequency::Daily),
            "W" | "WEEKLY" => Ok(Frequency::Weekly),
            other => Err(ForecastError::validation(format!(
                "unsupported frequency: {other}"
            ))),
        }
    }
}

/// Parses a calendar date from `YYYY-MM-DD` or an ISO-8601 timestamp,
/// keeping only the date part of the latter.
pub fn parse_date(input: &str) -> Result<NaiveDate, ForecastError> {
    let trimmed = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.date_naive());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(dt.date());
        }
    }
    Err(ForecastError::validation(format!("invalid date: {trimmed}")))
}
