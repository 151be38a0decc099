use serde::Serialize;
use uuid::Uuid;

use super::types::{BatchWarning, DocumentFailure, Prediction};

/// Result of a predict batch: every input document appears exactly once,
/// either as a prediction or as a failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    /// Ordered by input position.
    pub predictions: Vec<Prediction>,
    /// Ordered by input position.
    pub failures: Vec<DocumentFailure>,
    pub warnings: Vec<BatchWarning>,
}

impl BatchReport {
    #[must_use]
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            predictions: Vec::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.predictions.len() + self.failures.len()
    }

    /// True when every document produced a prediction.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Share of documents recorded as failures, in `[0, 1]`.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.failures.len() as f64 / total as f64;
        rate
    }

    #[must_use]
    pub fn prediction_for(&self, id: &str) -> Option<&Prediction> {
        self.predictions.iter().find(|prediction| prediction.id == id)
    }

    #[must_use]
    pub fn warnings_for(&self, id: &str) -> Vec<&BatchWarning> {
        self.warnings.iter().filter(|warning| warning.id == id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    fn prediction(id: &str, index: usize) -> Prediction {
        Prediction {
            id: id.to_string(),
            index,
            label: "positive".to_string(),
            confidence: 0.8,
            raw_lexicon_score: 0.1,
            categories: Default::default(),
            lexicon_matches: 1,
            language: Language::Spanish,
            translated: false,
        }
    }

    #[test]
    fn failure_rate_counts_failures_over_total() {
        let mut report = BatchReport::new(Uuid::new_v4());
        report.predictions.push(prediction("a", 0));
        report.failures.push(DocumentFailure {
            id: "b".to_string(),
            index: 1,
            reason: "contains NUL characters".to_string(),
        });
        assert_eq!(report.total(), 2);
        assert!(!report.is_complete());
        assert!((report.failure_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_report_is_complete() {
        let report = BatchReport::new(Uuid::new_v4());
        assert!(report.is_complete());
        assert!(report.failure_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn lookups_by_id() {
        let mut report = BatchReport::new(Uuid::new_v4());
        report.predictions.push(prediction("a", 0));
        report.warnings.push(BatchWarning {
            id: "a".to_string(),
            index: 0,
            message: "translation fallback".to_string(),
        });
        assert!(report.prediction_for("a").is_some());
        assert_eq!(report.warnings_for("a").len(), 1);
        assert!(report.prediction_for("z").is_none());
    }
}
