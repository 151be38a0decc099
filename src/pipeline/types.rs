use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::language::Language;

/// One input text. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// External identifier; when empty the batch position is used instead.
    pub id: String,
    pub text: String,
    /// Language tag supplied with the input (`es`, `pt-BR`, ...).
    #[serde(default)]
    pub declared_language: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            declared_language: None,
        }
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.declared_language = Some(language.into());
        self
    }

    /// Identifier used in reports: the external id, or the batch position.
    #[must_use]
    pub fn display_id(&self, index: usize) -> String {
        if self.id.trim().is_empty() {
            index.to_string()
        } else {
            self.id.clone()
        }
    }
}

/// Classification outcome for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub id: String,
    /// Position of the document in the input batch.
    pub index: usize,
    pub label: String,
    pub confidence: f32,
    pub raw_lexicon_score: f32,
    pub categories: BTreeMap<String, f32>,
    pub lexicon_matches: usize,
    /// Language the text was written in, as declared or detected.
    pub language: Language,
    pub translated: bool,
}

/// A document that could not be classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    pub id: String,
    pub index: usize,
    pub reason: String,
}

/// Non-fatal degradation attached to a document (e.g. translation fallback).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchWarning {
    pub id: String,
    pub index: usize,
    pub message: String,
}
