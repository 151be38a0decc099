//! Error taxonomy shared by the pipeline stages.
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single translation call.
///
/// Always recoverable from the pipeline's point of view: the router retries
/// once and then falls back to the untranslated text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("translation service unavailable: {0}")]
    Unavailable(String),
    #[error("translation timed out after {0}ms")]
    Timeout(u64),
    #[error("translation quota exceeded")]
    QuotaExceeded,
    #[error("unsupported language pair {source_lang} -> {target_lang}")]
    UnsupportedLanguage {
        source_lang: String,
        target_lang: String,
    },
    #[error("invalid translation response: {0}")]
    InvalidResponse(String),
}

/// Lexicon resources could not be loaded. Fatal at pipeline construction.
#[derive(Debug, Error)]
pub enum LexiconLoadError {
    #[error("failed to read lexicon from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed lexicon entry at line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("lexicon contains no entries")]
    Empty,
    #[error("no bundled lexicon for language {0}")]
    UnknownLanguage(String),
    #[error("failed to build lexicon matcher: {0}")]
    Matcher(String),
}

/// Errors surfaced by the classification pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("insufficient training data: {0}")]
    InsufficientTrainingData(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("model is not ready; fit or load a model before predicting")]
    ModelNotReady,
    #[error("document {id} is malformed: {reason}")]
    MalformedDocument { id: String, reason: String },
    #[error(transparent)]
    Lexicon(#[from] LexiconLoadError),
    #[error("failed to load model from {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("failed to save model to {path}: {reason}")]
    ModelSave { path: PathBuf, reason: String },
    #[error("feature dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("tabular data error: {0}")]
    Tabular(String),
    #[error("worker task failed: {0}")]
    Worker(String),
}

impl PipelineError {
    /// True for errors that only concern a single document of a batch.
    #[must_use]
    pub fn is_per_document(&self) -> bool {
        matches!(self, Self::MalformedDocument { .. })
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
