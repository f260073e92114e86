#![allow(dead_code)]

use chrono::NaiveDate;
use nexus_forecast::domain::error::ForecastError;
use nexus_forecast::domain::forecaster::TrainingParameters;
use nexus_forecast::domain::series::{DataPoint, Observation, Series};
use nexus_forecast::domain::training::{TrainingCoordinator, TrainingJob};
use nexus_forecast::ports::series_port::SeriesPort;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct MockSeriesPort {
    pub data: HashMap<String, Series>,
}

impl MockSeriesPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn with_series(mut self, property_id: &str, series: Series) -> Self {
        self.data.insert(property_id.to_string(), series);
        self
    }
}

impl SeriesPort for MockSeriesPort {
    fn fetch_series(&self, property_id: &str) -> Result<Series, ForecastError> {
        self.data
            .get(property_id)
            .cloned()
            .ok_or_else(|| ForecastError::validation(format!("no series for {property_id}")))
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Daily occupancy-like values with a weekend bump and slow upward drift.
pub fn weekly_values(days: usize) -> Vec<f64> {
    (0..days)
        .map(|i| {
            let weekend = matches!(i % 7, 5 | 6);
            60.0 + 0.1 * i as f64 + if weekend { 12.0 } else { 0.0 }
        })
        .collect()
}

pub fn daily_points(start: &str, values: &[f64]) -> Vec<DataPoint> {
    let start = date(start);
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let d = start + chrono::Days::new(i as u64);
            DataPoint::new(d.format("%Y-%m-%d").to_string(), v)
        })
        .collect()
}

pub fn daily_series(start: &str, values: &[f64]) -> Series {
    let start = date(start);
    Series::new(
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Observation::new(start + chrono::Days::new(i as u64), v))
            .collect(),
    )
}

pub fn write_csv(dir: &std::path::Path, property_id: &str, points: &[DataPoint]) {
    let mut content = String::from("date,value\n");
    for p in points {
        content.push_str(&format!("{},{}\n", p.date, p.value));
    }
    std::fs::write(dir.join(format!("{property_id}.csv")), content).unwrap();
}

/// Small sequence-window network so tests train in well under a second.
pub fn quick_sequence_params() -> TrainingParameters {
    TrainingParameters::new()
        .with("sequence_length", 7)
        .with("epochs", 3)
        .with("batch_size", 8)
        .with("units_1", 6)
        .with("units_2", 4)
        .with("dense_units", 4)
}

/// Polls until the job leaves PENDING / IN_PROGRESS.
pub fn wait_for_terminal(coordinator: &TrainingCoordinator, job_id: &str) -> TrainingJob {
    let deadline = Instant::now() + Duration::from_secs(60);
    loop {
        let job = coordinator.status(job_id).unwrap();
        if job.status.is_terminal() {
            return job;
        }
        assert!(Instant::now() < deadline, "job {job_id} did not finish");
        std::thread::sleep(Duration::from_millis(20));
    }
}
