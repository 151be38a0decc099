//! Self-describing JSON persistence for [`Model`].
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ClassifierKind, Model, ModelParams};
use crate::error::{PipelineError, Result};
use crate::features::Vocabulary;

pub const FORMAT: &str = "cca-core/model";
pub const VERSION: u32 = 1;

#[derive(Serialize)]
struct ModelFileRef<'a> {
    format: &'static str,
    version: u32,
    kind: ClassifierKind,
    labels: &'a [String],
    vocabulary: &'a Vocabulary,
    params: &'a ModelParams,
    trained_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ModelFile {
    format: String,
    version: u32,
    kind: ClassifierKind,
    labels: Vec<String>,
    vocabulary: Vocabulary,
    params: ModelParams,
    trained_at: DateTime<Utc>,
}

/// Serializes `model` to its JSON document.
///
/// # Errors
/// Fails only when serialization itself fails.
pub fn to_json(model: &Model) -> std::result::Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&ModelFileRef {
        format: FORMAT,
        version: VERSION,
        kind: model.kind(),
        labels: model.labels(),
        vocabulary: model.vocabulary(),
        params: model.params(),
        trained_at: model.trained_at(),
    })
}

/// Parses and validates a JSON model document.
///
/// # Errors
/// Returns a description of the first problem found.
pub fn from_json(raw: &str) -> std::result::Result<Model, String> {
    let file: ModelFile =
        serde_json::from_str(raw).map_err(|error| format!("invalid model json: {error}"))?;
    if file.format != FORMAT {
        return Err(format!("unexpected format {:?}, expected {FORMAT:?}", file.format));
    }
    if file.version != VERSION {
        return Err(format!(
            "unsupported model version {}, expected {VERSION}",
            file.version
        ));
    }
    if file.kind != file.params.kind() {
        return Err(format!(
            "model kind {} does not match its parameters ({})",
            file.kind,
            file.params.kind()
        ));
    }
    Model::from_parts(file.labels, file.vocabulary, file.params, file.trained_at)
}

/// Writes `model` to `path`. The file is written next to the target and
/// renamed into place so readers never see a partial model.
///
/// # Errors
/// Returns [`PipelineError::ModelSave`] when serialization or I/O fails.
pub fn save(model: &Model, path: &Path) -> Result<()> {
    let save_error = |reason: String| PipelineError::ModelSave {
        path: path.to_path_buf(),
        reason,
    };
    let json = to_json(model).map_err(|error| save_error(error.to_string()))?;

    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    fs::write(&staging, json).map_err(|error| save_error(error.to_string()))?;
    fs::rename(&staging, path).map_err(|error| save_error(error.to_string()))?;

    tracing::info!(
        path = %path.display(),
        kind = %model.kind(),
        labels = model.labels().len(),
        features = model.vocabulary().len(),
        "model saved"
    );
    Ok(())
}

/// Reads a model previously written by [`save`].
///
/// # Errors
/// Returns [`PipelineError::ModelLoad`] when the file is missing, not a model
/// document, or internally inconsistent.
pub fn load(path: &Path) -> Result<Model> {
    let load_error = |reason: String| PipelineError::ModelLoad {
        path: path.to_path_buf(),
        reason,
    };
    let raw = fs::read_to_string(path).map_err(|error| load_error(error.to_string()))?;
    let model = from_json(&raw).map_err(load_error)?;
    tracing::info!(
        path = %path.display(),
        kind = %model.kind(),
        trained_at = %model.trained_at(),
        "model loaded"
    );
    Ok(model)
}
