//! Process-local job store.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::error::ForecastError;
use crate::domain::training::TrainingJob;
use crate::ports::job_store::JobStore;

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, TrainingJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> ForecastError {
    ForecastError::Io(std::io::Error::other("job store lock poisoned"))
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: TrainingJob) -> Result<(), ForecastError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        if jobs.contains_key(&job.job_id) {
            return Err(ForecastError::validation(format!(
                "job id {} already exists",
                job.job_id
            )));
        }
        jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    fn get(&self, job_id: &str) -> Result<Option<TrainingJob>, ForecastError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs.get(job_id).cloned())
    }

    fn update(&self, job: TrainingJob) -> Result<(), ForecastError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let existing = jobs
            .get_mut(&job.job_id)
            .ok_or_else(|| ForecastError::JobNotFound {
                job_id: job.job_id.clone(),
            })?;
        if !existing.status.can_transition_to(job.status) {
            return Err(ForecastError::validation(format!(
                "job {} cannot move from {:?} to {:?}",
                job.job_id, existing.status, job.status
            )));
        }
        *existing = job;
        Ok(())
    }

    fn job_count(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }
}
