//! On-disk envelope for fitted model state.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::error::ForecastError;
use crate::domain::forecaster::ModelType;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    model_type: ModelType,
    format_version: u32,
    payload: T,
}

pub fn write_artifact<T: Serialize>(
    path: &Path,
    model_type: ModelType,
    payload: &T,
) -> Result<(), ForecastError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let envelope = Envelope {
        model_type,
        format_version: FORMAT_VERSION,
        payload,
    };
    let json = serde_json::to_vec(&envelope).map_err(std::io::Error::other)?;
    fs::write(path, json)?;
    Ok(())
}

/// Reads an artifact written by [`write_artifact`], rejecting a payload
/// saved by a different strategy or format version.
pub fn read_artifact<T: DeserializeOwned>(
    path: &Path,
    expected: ModelType,
) -> Result<T, ForecastError> {
    let load_error = |reason: String| ForecastError::ArtifactLoad {
        path: path.display().to_string(),
        reason,
    };

    let bytes = fs::read(path).map_err(|e| load_error(e.to_string()))?;
    let envelope: Envelope<T> =
        serde_json::from_slice(&bytes).map_err(|e| load_error(e.to_string()))?;

    if envelope.model_type != expected {
        return Err(load_error(format!(
            "artifact holds a {} model, expected {}",
            envelope.model_type, expected
        )));
    }
    if envelope.format_version != FORMAT_VERSION {
        return Err(load_error(format!(
            "unsupported format version {}",
            envelope.format_version
        )));
    }
    Ok(envelope.payload)
}
