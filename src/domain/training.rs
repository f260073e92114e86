//! Asynchronous training jobs.
//!
//! ```text
//! submit() --insert PENDING--> store
//!    |
//!    +--spawn--> execute(): IN_PROGRESS -> train -> save -> COMPLETED
//!                                   \___ any error or panic ___/-> FAILED
//! ```
//!
//! `submit` returns as soon as the PENDING record is stored. The spawned
//! task is the only writer of its job record from then on.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::ForecastError;
use crate::domain::forecaster::{ModelType, TrainingParameters};
use crate::domain::metrics::TrainingMetrics;
use crate::domain::series::{DataPoint, build_series};
use crate::ports::job_store::JobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Forward transitions only. `Pending -> Failed` covers jobs whose
    /// worker could not be started.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress) | (Pending, Failed) | (InProgress, Completed) | (InProgress, Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingJob {
    pub job_id: String,
    pub model_type: ModelType,
    pub property_id: Option<String>,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub accuracy: Option<f64>,
    pub mape: Option<f64>,
    pub rmse: Option<f64>,
    pub error_message: Option<String>,
    pub model_path: Option<PathBuf>,
}

impl TrainingJob {
    pub fn new(model_type: ModelType, property_id: Option<String>) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            model_type,
            property_id,
            status: JobStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            accuracy: None,
            mape: None,
            rmse: None,
            error_message: None,
            model_path: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), ForecastError> {
        if !self.status.can_transition_to(next) {
            return Err(ForecastError::validation(format!(
                "job {} cannot move from {:?} to {:?}",
                self.job_id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_in_progress(&mut self) -> Result<(), ForecastError> {
        self.transition(JobStatus::InProgress)
    }

    pub fn mark_completed(
        &mut self,
        metrics: TrainingMetrics,
        model_path: PathBuf,
    ) -> Result<(), ForecastError> {
        self.transition(JobStatus::Completed)?;
        self.completed_at = Some(Utc::now());
        self.accuracy = Some(metrics.accuracy);
        self.mape = Some(metrics.mape);
        self.rmse = Some(metrics.rmse);
        self.model_path = Some(model_path);
        Ok(())
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<(), ForecastError> {
        self.transition(JobStatus::Failed)?;
        self.failed_at = Some(Utc::now());
        self.error_message = Some(message.into());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRequest {
    pub model_type: ModelType,
    pub property_id: Option<String>,
    pub training_data: Vec<DataPoint>,
    pub parameters: TrainingParameters,
}

/// `{dir}/{prefix}_{property|global}_{YYYYmmdd_HHMMSS}_{job8}.json`.
///
/// The job-id suffix keeps two submissions in the same second apart.
pub fn artifact_path(
    models_dir: &Path,
    model_type: ModelType,
    property_id: Option<&str>,
    submitted_at: DateTime<Utc>,
    job_id: &str,
) -> PathBuf {
    let property = property_id.filter(|p| !p.is_empty()).unwrap_or("global");
    let short_id: String = job_id.chars().filter(|c| *c != '-').take(8).collect();
    models_dir.join(format!(
        "{}_{}_{}_{}.json",
        model_type.artifact_prefix(),
        sanitize(property),
        submitted_at.format("%Y%m%d_%H%M%S"),
        short_id
    ))
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Creates jobs, runs them in the background and answers status queries.
#[derive(Clone)]
pub struct TrainingCoordinator {
    store: Arc<dyn JobStore>,
    models_dir: PathBuf,
}

impl TrainingCoordinator {
    pub fn new(store: Arc<dyn JobStore>, models_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            models_dir: models_dir.into(),
        }
    }

    /// Stores a PENDING job and starts training without waiting for it.
    ///
    /// Inside a tokio runtime the work goes to the blocking pool, otherwise
    /// to a dedicated thread.
    pub fn submit(&self, request: TrainingRequest) -> Result<TrainingJob, ForecastError> {
        let job = TrainingJob::new(request.model_type, request.property_id.clone());
        self.store.insert(job.clone())?;
        tracing::info!(
            job_id = %job.job_id,
            model_type = %job.model_type,
            tracked_jobs = self.store.job_count(),
            "training job submitted"
        );

        let worker = self.clone();
        let pending = job.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || worker.execute(pending, request));
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name(format!("train-{}", &job.job_id[..8.min(job.job_id.len())]))
                    .spawn(move || worker.execute(pending, request));
                if let Err(e) = spawned {
                    let mut failed = job.clone();
                    failed.mark_failed(format!("failed to start training worker: {e}"))?;
                    self.store.update(failed)?;
                }
            }
        }
        Ok(job)
    }

    /// Runs a job to completion on the calling thread and returns its
    /// terminal record.
    pub fn run(&self, request: TrainingRequest) -> Result<TrainingJob, ForecastError> {
        let job = TrainingJob::new(request.model_type, request.property_id.clone());
        self.store.insert(job.clone())?;
        Ok(self.execute(job, request))
    }

    pub fn status(&self, job_id: &str) -> Result<TrainingJob, ForecastError> {
        self.store
            .get(job_id)?
            .ok_or_else(|| ForecastError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    fn execute(&self, job: TrainingJob, request: TrainingRequest) -> TrainingJob {
        self.execute_with(job, |job| self.train_and_save(job, &request))
    }

    /// Drives `job` through IN_PROGRESS to a terminal state around `work`.
    /// A panic inside `work` is recorded as a failure.
    fn execute_with<F>(&self, mut job: TrainingJob, work: F) -> TrainingJob
    where
        F: FnOnce(&TrainingJob) -> Result<(TrainingMetrics, PathBuf), ForecastError>,
    {
        let job_id = job.job_id.clone();
        if let Err(e) = job.mark_in_progress().and_then(|_| self.store.update(job.clone())) {
            tracing::error!(job_id = %job_id, error = %e, "could not start training job");
            if job.mark_failed(format!("could not start training job: {e}")).is_ok() {
                if let Err(e) = self.store.update(job.clone()) {
                    tracing::error!(job_id = %job_id, error = %e, "could not record job failure");
                }
            }
            return job;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(&job)))
            .unwrap_or_else(|payload| {
                Err(ForecastError::WorkerPanic {
                    reason: panic_message(payload.as_ref()),
                })
            });

        match outcome {
            Ok((metrics, path)) => {
                tracing::info!(
                    job_id = %job_id,
                    accuracy = metrics.accuracy,
                    path = %path.display(),
                    "training job completed"
                );
                if let Err(e) = job.mark_completed(metrics, path) {
                    tracing::error!(job_id = %job_id, error = %e, "invalid job transition");
                }
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "training job failed");
                if let Err(t) = job.mark_failed(e.to_string()) {
                    tracing::error!(job_id = %job_id, error = %t, "invalid job transition");
                }
            }
        }

        if let Err(e) = self.store.update(job.clone()) {
            tracing::error!(job_id = %job_id, error = %e, "could not record job outcome");
        }
        job
    }

    fn train_and_save(
        &self,
        job: &TrainingJob,
        request: &TrainingRequest,
    ) -> Result<(TrainingMetrics, PathBuf), ForecastError> {
        let series = build_series(&request.training_data)?;
        let mut forecaster = request.model_type.new_forecaster()?;
        let metrics = forecaster.train(&series, &request.parameters)?;

        let path = artifact_path(
            &self.models_dir,
            request.model_type,
            request.property_id.as_deref(),
            job.started_at,
            &job.job_id,
        );
        forecaster.save(&path)?;
        Ok((metrics, path))
    }
}
