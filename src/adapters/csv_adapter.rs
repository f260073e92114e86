//! CSV file series adapter.
//!
//! One file per property, `<base>/<property_id>.csv`, with a header row and
//! `date,value` columns. Extra columns are ignored.

use crate::domain::error::ForecastError;
use crate::domain::series::{Observation, Series, parse_date};
use crate::ports::series_port::SeriesPort;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, property_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", property_id))
    }
}

impl SeriesPort for CsvAdapter {
    fn fetch_series(&self, property_id: &str) -> Result<Series, ForecastError> {
        let path = self.csv_path(property_id);
        let content = fs::read_to_string(&path).map_err(|e| {
            ForecastError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read {}: {}", path.display(), e),
            ))
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut observations = Vec::new();

        for (row, result) in rdr.records().enumerate() {
            // header is line 1
            let line = row + 2;
            let record = result
                .map_err(|e| ForecastError::validation(format!("CSV parse error: {}", e)))?;

            let date_str = record.get(0).ok_or_else(|| {
                ForecastError::validation(format!("line {line}: missing date column"))
            })?;
            let date = parse_date(date_str)
                .map_err(|e| ForecastError::validation(format!("line {line}: {e}")))?;

            let value: f64 = record
                .get(1)
                .ok_or_else(|| {
                    ForecastError::validation(format!("line {line}: missing value column"))
                })?
                .trim()
                .parse()
                .map_err(|e| {
                    ForecastError::validation(format!("line {line}: invalid value: {}", e))
                })?;
            if !value.is_finite() {
                return Err(ForecastError::validation(format!(
                    "line {line}: value is not finite"
                )));
            }

            observations.push(Observation::new(date, value));
        }

        tracing::debug!(
            property_id,
            observations = observations.len(),
            path = %path.display(),
            "series loaded"
        );
        Ok(Series::new(observations))
    }
}
