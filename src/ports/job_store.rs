//! Training-job persistence.
//!
//! Each job id has a single writer: the background task that owns it.
//! Stores only need last-writer-wins per key, plus refusal of status
//! regressions.

use crate::domain::error::ForecastError;
use crate::domain::training::TrainingJob;

pub trait JobStore: Send + Sync {
    /// Records a freshly submitted job. Fails if the id is already taken.
    fn insert(&self, job: TrainingJob) -> Result<(), ForecastError>;

    fn get(&self, job_id: &str) -> Result<Option<TrainingJob>, ForecastError>;

    /// Replaces the stored job. Fails with `JobNotFound` for an unknown id
    /// and with `Validation` if the status would move backwards.
    fn update(&self, job: TrainingJob) -> Result<(), ForecastError>;

    /// Number of jobs tracked, in any status.
    fn job_count(&self) -> usize;
}
