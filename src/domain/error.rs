//! Domain error types.

/// Top-level error type for the forecasting service.
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error("invalid request: {reason}")]
    Validation { reason: String },

    #[error("not enough data to train {model}: have {observations} observations, need {minimum}")]
    UntrainedData {
        model: String,
        observations: usize,
        minimum: usize,
    },

    #[error(
        "insufficient data for window length {window}: have {observations} observations, need at least {}",
        window + 1
    )]
    InsufficientData { observations: usize, window: usize },

    #[error("model not trained. call train() first")]
    ModelNotTrained,

    #[error("failed to load model artifact {path}: {reason}")]
    ArtifactLoad { path: String, reason: String },

    #[error("training job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("unknown model type: {model_type}")]
    UnknownModelType { model_type: String },

    #[error("numerical failure: {reason}")]
    Numerical { reason: String },

    #[error("training worker panicked: {reason}")]
    WorkerPanic { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ForecastError {
    pub fn validation(reason: impl Into<String>) -> Self {
        ForecastError::Validation {
            reason: reason.into(),
        }
    }

    pub fn numerical(reason: impl Into<String>) -> Self {
        ForecastError::Numerical {
            reason: reason.into(),
        }
    }
}

impl From<&ForecastError> for std::process::ExitCode {
    fn from(err: &ForecastError) -> Self {
        let code: u8 = match err {
            ForecastError::Io(_) => 1,
            ForecastError::ConfigParse { .. } | ForecastError::ConfigInvalid { .. } => 2,
            ForecastError::Validation { .. }
            | ForecastError::UnknownModelType { .. }
            | ForecastError::JobNotFound { .. } => 3,
            ForecastError::UntrainedData { .. } | ForecastError::InsufficientData { .. } => 4,
            ForecastError::ModelNotTrained
            | ForecastError::ArtifactLoad { .. }
            | ForecastError::Numerical { .. }
            | ForecastError::WorkerPanic { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
