#![deny(warnings, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Text processing and classification for civic input: normalization,
//! language routing with translation, lexicon scoring, feature extraction
//! and a trainable classifier, assembled by [`pipeline::Pipeline`].

pub mod classifier;
pub mod config;
pub mod error;
pub mod features;
pub mod language;
pub mod lexicon;
pub mod normalizer;
pub mod observability;
pub mod pipeline;
pub mod router;
pub mod tabular;
pub mod translation;
pub mod util;

pub use error::{LexiconLoadError, PipelineError, Result, TranslationError};
pub use language::Language;
pub use pipeline::{
    BatchReport, CombinationRule, Document, FitSummary, Pipeline, PipelineBuilder, PipelineConfig,
    Prediction,
};
