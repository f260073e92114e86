//! Model artifact directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::error::ForecastError;
use crate::domain::forecaster::{Forecaster, ModelType};

pub struct ModelStorage {
    dir: PathBuf,
}

impl ModelStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the directory if missing.
    pub fn ensure_dir(&self) -> Result<(), ForecastError> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Restores a trained forecaster of `model_type` from `path`.
    pub fn load(&self, model_type: ModelType, path: &Path) -> Result<Box<dyn Forecaster>, ForecastError> {
        let mut forecaster = model_type.new_forecaster()?;
        forecaster.load(path)?;
        Ok(forecaster)
    }
}
