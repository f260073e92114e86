//! End-to-end tests over the domain and in-process adapters.
//!
//! Tests cover:
//! - Training job lifecycle: submit, poll, terminal state, artifact reload
//! - Failure capture for bad data and unsupported model types
//! - Concurrent submissions get distinct ids and artifacts
//! - Background execution inside a tokio runtime
//! - Forecast orchestration fed from a series port

mod common;

use common::*;
use nexus_forecast::adapters::memory_job_store::InMemoryJobStore;
use nexus_forecast::adapters::model_storage::ModelStorage;
use nexus_forecast::domain::error::ForecastError;
use nexus_forecast::domain::forecaster::{ForecastContext, ModelType, TrainingParameters};
use nexus_forecast::domain::orchestrator::{ForecastMetric, ForecastOrchestrator, ForecastRequest};
use nexus_forecast::domain::sequence_window::scaler_path;
use nexus_forecast::domain::series::DataPoint;
use nexus_forecast::domain::training::{JobStatus, TrainingCoordinator, TrainingRequest};
use nexus_forecast::ports::series_port::SeriesPort;
use std::collections::HashSet;
use std::sync::Arc;

fn coordinator(dir: &std::path::Path) -> TrainingCoordinator {
    TrainingCoordinator::new(Arc::new(InMemoryJobStore::new()), dir)
}

fn request(model_type: ModelType, data: Vec<DataPoint>, params: TrainingParameters) -> TrainingRequest {
    TrainingRequest {
        model_type,
        property_id: Some("villa-1".to_string()),
        training_data: data,
        parameters: params,
    }
}

mod training_lifecycle {
    use super::*;

    #[test]
    fn seasonal_trend_job_completes_and_artifact_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());

        let job = coordinator
            .submit(request(
                ModelType::SeasonalTrend,
                daily_points("2024-01-01", &weekly_values(60)),
                TrainingParameters::new(),
            ))
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let done = wait_for_terminal(&coordinator, &job.job_id);
        assert_eq!(done.status, JobStatus::Completed, "{:?}", done.error_message);
        assert!(done.completed_at.is_some());
        assert!(done.accuracy.unwrap() > 0.9);
        assert!(done.mape.is_some() && done.rmse.is_some());

        let path = done.model_path.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("seasonal_trend_villa-1_"), "{name}");

        let model = ModelStorage::new(dir.path())
            .load(ModelType::SeasonalTrend, &path)
            .unwrap();
        let points = model.forecast(14, &ForecastContext::future_only()).unwrap();
        assert_eq!(points.len(), 14);
        assert_eq!(points[0].timestamp, date("2024-03-01"));
        assert!(points.iter().all(|p| p.is_bracketed()));
    }

    #[test]
    fn sequence_window_job_writes_model_and_scaler() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());

        let job = coordinator
            .submit(request(
                ModelType::SequenceWindow,
                daily_points("2024-01-01", &weekly_values(40)),
                quick_sequence_params(),
            ))
            .unwrap();
        let done = wait_for_terminal(&coordinator, &job.job_id);
        assert_eq!(done.status, JobStatus::Completed, "{:?}", done.error_message);

        let path = done.model_path.unwrap();
        assert!(path.exists());
        assert!(scaler_path(&path).exists());

        let model = ModelStorage::new(dir.path())
            .load(ModelType::SequenceWindow, &path)
            .unwrap();
        let points = model.forecast(5, &ForecastContext::default()).unwrap();
        assert_eq!(points.len(), 5);
        assert_eq!(points[0].timestamp, date("2024-02-10"));
    }

    #[test]
    fn short_history_for_default_window_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());

        let job = coordinator
            .submit(request(
                ModelType::SequenceWindow,
                daily_points("2024-01-01", &[1.0, 2.0, 3.0, 4.0, 5.0]),
                TrainingParameters::new(),
            ))
            .unwrap();
        let done = wait_for_terminal(&coordinator, &job.job_id);

        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.failed_at.is_some());
        assert!(done.model_path.is_none());
        let message = done.error_message.unwrap();
        assert!(message.contains("insufficient data"), "{message}");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn oversized_network_fails_job_instead_of_hanging() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());

        let job = coordinator
            .submit(request(
                ModelType::SequenceWindow,
                daily_points("2024-01-01", &weekly_values(40)),
                quick_sequence_params().with("units_1", 1u64 << 62),
            ))
            .unwrap();
        let done = wait_for_terminal(&coordinator, &job.job_id);

        assert_eq!(done.status, JobStatus::Failed);
        let message = done.error_message.unwrap();
        assert!(message.contains("units_1"), "{message}");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn optimization_type_has_no_trainer() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        let done = coordinator
            .run(request(
                ModelType::Optimization,
                daily_points("2024-01-01", &weekly_values(10)),
                TrainingParameters::new(),
            ))
            .unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error_message.unwrap().contains("unknown model type"));
    }

    #[test]
    fn unparseable_date_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        let mut data = daily_points("2024-01-01", &weekly_values(10));
        data.push(DataPoint::new("31/12/2024", 5.0));

        let done = coordinator
            .run(request(ModelType::SeasonalTrend, data, TrainingParameters::new()))
            .unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error_message.unwrap().contains("31/12/2024"));
    }

    #[test]
    fn unknown_job_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            coordinator(dir.path()).status("does-not-exist"),
            Err(ForecastError::JobNotFound { .. })
        ));
    }

    #[test]
    fn observed_statuses_only_move_forward() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        let job = coordinator
            .submit(request(
                ModelType::SeasonalTrend,
                daily_points("2023-01-01", &weekly_values(400)),
                TrainingParameters::new(),
            ))
            .unwrap();

        let rank = |s: JobStatus| match s {
            JobStatus::Pending => 0,
            JobStatus::InProgress => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        };
        let mut last = 0;
        loop {
            let status = coordinator.status(&job.job_id).unwrap().status;
            assert!(rank(status) >= last);
            last = rank(status);
            if status.is_terminal() {
                assert_eq!(status, JobStatus::Completed);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    #[test]
    fn concurrent_jobs_get_distinct_ids_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());

        let ids: Vec<String> = (0..4)
            .map(|_| {
                coordinator
                    .submit(request(
                        ModelType::SeasonalTrend,
                        daily_points("2024-01-01", &weekly_values(30)),
                        TrainingParameters::new(),
                    ))
                    .unwrap()
                    .job_id
            })
            .collect();
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 4);

        let paths: HashSet<_> = ids
            .iter()
            .map(|id| {
                let done = wait_for_terminal(&coordinator, id);
                assert_eq!(done.status, JobStatus::Completed);
                done.model_path.unwrap()
            })
            .collect();
        assert_eq!(paths.len(), 4);
        assert!(paths.iter().all(|p| p.exists()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn submit_inside_runtime_uses_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path());
        let job = coordinator
            .submit(request(
                ModelType::SeasonalTrend,
                daily_points("2024-01-01", &weekly_values(30)),
                TrainingParameters::new(),
            ))
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(60);
        loop {
            let current = coordinator.status(&job.job_id).unwrap();
            if current.status.is_terminal() {
                assert_eq!(current.status, JobStatus::Completed);
                break;
            }
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }
}

mod forecast_pipeline {
    use super::*;

    #[test]
    fn series_port_history_feeds_orchestrator() {
        let port = MockSeriesPort::new()
            .with_series("villa-1", daily_series("2024-01-01", &weekly_values(56)));
        let history = port.fetch_series("villa-1").unwrap();

        let outcome = ForecastOrchestrator::default()
            .forecast(&ForecastRequest {
                property_id: "villa-1".to_string(),
                start: date("2024-02-26"),
                end: date("2024-03-10"),
                metric: ForecastMetric::Demand,
                history: Some(history),
            })
            .unwrap();

        assert!(!outcome.used_fallback);
        assert_eq!(outcome.points.len(), 14);
        // weekend dates keep their bump
        let saturday = outcome
            .points
            .iter()
            .find(|p| p.timestamp == date("2024-03-02"))
            .unwrap();
        let tuesday = outcome
            .points
            .iter()
            .find(|p| p.timestamp == date("2024-02-27"))
            .unwrap();
        assert!(saturday.predicted_value > tuesday.predicted_value + 5.0);
    }

    #[test]
    fn missing_history_falls_back() {
        let port = MockSeriesPort::new();
        assert!(port.fetch_series("nowhere").is_err());

        let outcome = ForecastOrchestrator::default()
            .forecast(&ForecastRequest {
                property_id: "nowhere".to_string(),
                start: date("2024-07-06"),
                end: date("2024-07-06"),
                metric: ForecastMetric::Occupancy,
                history: None,
            })
            .unwrap();
        assert!(outcome.used_fallback);
        let p = &outcome.points[0];
        assert!((p.predicted_value - 0.81).abs() < 1e-9);
        assert!((p.lower_bound.unwrap() - 0.71).abs() < 1e-9);
        assert!((p.upper_bound.unwrap() - 0.91).abs() < 1e-9);
    }
}
