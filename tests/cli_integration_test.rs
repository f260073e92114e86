//! CLI integration tests.
//!
//! Tests cover:
//! - Service config loading from INI files on disk
//! - CSV history through the train command into model artifacts
//! - Forecast orchestration over CSV history with INI defaults
//! - Predict from a saved artifact

mod common;

use clap::Parser;
use common::*;
use nexus_forecast::adapters::csv_adapter::CsvAdapter;
use nexus_forecast::adapters::model_storage::ModelStorage;
use nexus_forecast::adapters::report::{ForecastResponseBody, point_bodies};
use nexus_forecast::cli::{self, Cli};
use nexus_forecast::domain::error::ForecastError;
use nexus_forecast::domain::forecaster::{ForecastContext, ModelType};
use nexus_forecast::domain::orchestrator::{ForecastMetric, ForecastOrchestrator, ForecastRequest};
use nexus_forecast::domain::series::Frequency;
use nexus_forecast::ports::series_port::SeriesPort;
use std::io::Write;
use std::path::{Path, PathBuf};

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const VALID_INI: &str = r#"
[service]
listen = 127.0.0.1:9100
models_dir = /tmp/nexus-models

[logging]
filter = nexus_forecast=debug

[seasonal_trend]
changepoint_prior_scale = 0.1
seasonality_prior_scale = 5.0
interval_width = 0.9
"#;

fn artifacts(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    files
}

fn run_cli(args: &[&str]) {
    let mut argv = vec!["nexus-forecast"];
    argv.extend_from_slice(args);
    let _ = cli::run(Cli::try_parse_from(argv).unwrap());
}

mod config_loading {
    use super::*;

    #[test]
    fn valid_ini_populates_service_config() {
        let file = write_temp_ini(VALID_INI);
        let config = cli::load_config(file.path()).unwrap();

        assert_eq!(config.listen.to_string(), "127.0.0.1:9100");
        assert_eq!(config.log_filter, "nexus_forecast=debug");
        assert!((config.changepoint_prior_scale - 0.1).abs() < 1e-12);
        assert!((config.seasonality_prior_scale - 5.0).abs() < 1e-12);
        assert!((config.interval_width - 0.9).abs() < 1e-12);
        if std::env::var("MODELS_DIR").map_or(true, |v| v.trim().is_empty()) {
            assert_eq!(config.models_dir, PathBuf::from("/tmp/nexus-models"));
        }
    }

    #[test]
    fn empty_ini_uses_defaults() {
        let file = write_temp_ini("");
        let config = cli::load_config(file.path()).unwrap();
        assert_eq!(config.listen.to_string(), "0.0.0.0:8000");
        assert!((config.interval_width - 0.8).abs() < 1e-12);
    }

    #[test]
    fn bad_listen_address_is_rejected() {
        let file = write_temp_ini("[service]\nlisten = not-an-address\n");
        let err = cli::load_config(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::ConfigInvalid { ref section, ref key, .. }
                if section == "service" && key == "listen"
        ));
    }

    #[test]
    fn interval_width_out_of_range_is_rejected() {
        let file = write_temp_ini("[seasonal_trend]\ninterval_width = 1.5\n");
        assert!(matches!(
            cli::load_config(file.path()),
            Err(ForecastError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn missing_file_is_parse_error() {
        assert!(matches!(
            cli::load_config(Path::new("/nonexistent/nexus.ini")),
            Err(ForecastError::ConfigParse { .. })
        ));
    }
}

mod train_command {
    use super::*;

    #[test]
    fn seasonal_trend_writes_one_artifact() {
        let data = tempfile::tempdir().unwrap();
        let models = tempfile::tempdir().unwrap();
        write_csv(data.path(), "villa-1", &daily_points("2024-01-01", &weekly_values(60)));

        run_cli(&[
            "train",
            "--data-dir",
            data.path().to_str().unwrap(),
            "--property",
            "villa-1",
            "--model",
            "prophet",
            "--models-dir",
            models.path().to_str().unwrap(),
        ]);

        let files = artifacts(models.path());
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("seasonal_trend_villa-1_"), "{name}");
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn sequence_window_params_flow_through() {
        let data = tempfile::tempdir().unwrap();
        let models = tempfile::tempdir().unwrap();
        write_csv(data.path(), "villa-2", &daily_points("2024-01-01", &weekly_values(40)));

        run_cli(&[
            "train",
            "--data-dir",
            data.path().to_str().unwrap(),
            "--property",
            "villa-2",
            "--model",
            "lstm",
            "--params",
            r#"{"sequence_length": 7, "epochs": 2, "units_1": 4, "units_2": 3, "dense_units": 3}"#,
            "--models-dir",
            models.path().to_str().unwrap(),
        ]);

        let files = artifacts(models.path());
        assert_eq!(files.len(), 2, "{files:?}");
        assert!(files.iter().any(|f| f.to_string_lossy().ends_with("_scaler.json")));
    }

    #[test]
    fn short_history_leaves_no_artifact() {
        let data = tempfile::tempdir().unwrap();
        let models = tempfile::tempdir().unwrap();
        write_csv(data.path(), "tiny", &daily_points("2024-01-01", &[1.0, 2.0, 3.0]));

        run_cli(&[
            "train",
            "--data-dir",
            data.path().to_str().unwrap(),
            "--property",
            "tiny",
            "--model",
            "sequence-window",
            "--models-dir",
            models.path().to_str().unwrap(),
        ]);

        assert!(artifacts(models.path()).is_empty());
    }

    #[test]
    fn missing_csv_leaves_no_artifact() {
        let data = tempfile::tempdir().unwrap();
        let models = tempfile::tempdir().unwrap();
        run_cli(&[
            "train",
            "--data-dir",
            data.path().to_str().unwrap(),
            "--property",
            "ghost",
            "--model",
            "prophet",
            "--models-dir",
            models.path().to_str().unwrap(),
        ]);
        assert!(artifacts(models.path()).is_empty());
    }
}

mod forecast_pipeline {
    use super::*;

    #[test]
    fn csv_history_with_ini_defaults() {
        let data = tempfile::tempdir().unwrap();
        write_csv(data.path(), "villa-1", &daily_points("2024-01-01", &weekly_values(56)));
        let ini = write_temp_ini(VALID_INI);
        let config = cli::load_config(ini.path()).unwrap();

        let adapter = CsvAdapter::new(data.path().to_path_buf());
        let history = adapter.fetch_series("villa-1").unwrap();

        let outcome = ForecastOrchestrator::new(config.seasonal_trend_parameters())
            .forecast(&ForecastRequest {
                property_id: "villa-1".to_string(),
                start: date("2024-02-26"),
                end: date("2024-03-03"),
                metric: ForecastMetric::Revenue,
                history: Some(history),
            })
            .unwrap();

        assert!(!outcome.used_fallback);
        assert_eq!(outcome.points.len(), 7);
        assert_eq!(outcome.points[0].timestamp, date("2024-02-26"));
        assert!(outcome.points.iter().all(|p| p.is_bracketed()));
    }

    #[test]
    fn forecast_output_uses_camel_case_points() {
        let outcome = ForecastOrchestrator::default()
            .forecast(&ForecastRequest {
                property_id: "villa-1".to_string(),
                start: date("2024-07-06"),
                end: date("2024-07-07"),
                metric: ForecastMetric::Demand,
                history: None,
            })
            .unwrap();
        let body = serde_json::to_value(ForecastResponseBody::from(&outcome)).unwrap();

        assert_eq!(body["propertyId"], "villa-1");
        assert_eq!(body["modelType"], "demand");
        assert!(body["generatedAt"].is_string());
        let first = &body["forecast"][0];
        assert_eq!(first["date"], "2024-07-06");
        for key in ["predictedValue", "lowerBound", "upperBound", "confidence"] {
            assert!(first[key].is_number(), "{key} missing in {first}");
        }
        assert!(first.get("timestamp").is_none());
        assert!(first.get("predicted_value").is_none());
    }

    #[test]
    fn forecast_command_without_history_runs() {
        run_cli(&[
            "forecast",
            "--start",
            "2024-07-06",
            "--end",
            "2024-07-08",
            "--metric",
            "demand",
        ]);
    }
}

mod predict_command {
    use super::*;

    #[test]
    fn saved_artifact_forecasts_weekly() {
        let data = tempfile::tempdir().unwrap();
        let models = tempfile::tempdir().unwrap();
        write_csv(data.path(), "villa-1", &daily_points("2024-01-01", &weekly_values(60)));
        run_cli(&[
            "train",
            "--data-dir",
            data.path().to_str().unwrap(),
            "--property",
            "villa-1",
            "--model",
            "seasonal-trend",
            "--models-dir",
            models.path().to_str().unwrap(),
        ]);
        let artifact = artifacts(models.path()).remove(0);

        let model = ModelStorage::new(models.path())
            .load(ModelType::SeasonalTrend, &artifact)
            .unwrap();
        let context = ForecastContext {
            frequency: Frequency::parse("W").unwrap(),
            ..ForecastContext::future_only()
        };
        let points = model.forecast(3, &context).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].timestamp, date("2024-03-07"));
        assert_eq!(points[1].timestamp, date("2024-03-14"));

        let body = serde_json::to_value(point_bodies(&points)).unwrap();
        assert_eq!(body[0]["date"], "2024-03-07");
        assert_eq!(body[1]["date"], "2024-03-14");
        assert_eq!(body[0]["predictedValue"], points[0].predicted_value);
        assert!(body[0]["lowerBound"].is_number());
        assert!(body[0]["upperBound"].is_number());

        run_cli(&[
            "predict",
            "--model",
            "prophet",
            "--artifact",
            artifact.to_str().unwrap(),
            "--periods",
            "3",
        ]);
    }
}
