//! Multinomial naive Bayes with additive smoothing.
use serde::{Deserialize, Serialize};

use crate::features::FeatureVector;

const MIN_ALPHA: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NaiveBayesParams {
    pub alpha: f64,
    /// `ln P(class)`, one entry per label.
    pub class_log_prior: Vec<f64>,
    /// `ln P(feature | class)`, one row per label.
    pub feature_log_prob: Vec<Vec<f64>>,
}

impl NaiveBayesParams {
    pub(crate) fn fit(
        vectors: &[FeatureVector],
        targets: &[usize],
        classes: usize,
        dim: usize,
        alpha: f64,
    ) -> Self {
        let alpha = alpha.max(MIN_ALPHA);
        let mut class_counts = vec![0usize; classes];
        let mut feature_sums = vec![vec![0.0f64; dim]; classes];

        for (vector, &class) in vectors.iter().zip(targets) {
            class_counts[class] += 1;
            for (sum, value) in feature_sums[class].iter_mut().zip(vector.as_slice()) {
                *sum += f64::from(value.max(0.0));
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let total = vectors.len() as f64;
        #[allow(clippy::cast_precision_loss)]
        let class_log_prior = class_counts
            .iter()
            .map(|&count| (count as f64 / total).ln())
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let smoothing = alpha * dim as f64;
        let feature_log_prob = feature_sums
            .into_iter()
            .map(|sums| {
                let denominator = (sums.iter().sum::<f64>() + smoothing).ln();
                sums.into_iter()
                    .map(|sum| (sum + alpha).ln() - denominator)
                    .collect()
            })
            .collect();

        Self {
            alpha,
            class_log_prior,
            feature_log_prob,
        }
    }

    pub(crate) fn check_shape(&self, labels: usize, dim: usize) -> Result<(), String> {
        if self.class_log_prior.len() != labels || self.feature_log_prob.len() != labels {
            return Err(format!(
                "naive bayes parameters cover {} classes, expected {labels}",
                self.class_log_prior.len()
            ));
        }
        if let Some(row) = self.feature_log_prob.iter().find(|row| row.len() != dim) {
            return Err(format!(
                "naive bayes row has {} features, expected {dim}",
                row.len()
            ));
        }
        let finite = self.class_log_prior.iter().all(|value| value.is_finite())
            && self.feature_log_prob.iter().flatten().all(|value| value.is_finite());
        if !finite {
            return Err("naive bayes parameters contain non-finite values".to_string());
        }
        Ok(())
    }

    /// Posterior distribution over labels for `features`.
    pub(crate) fn posterior(&self, features: &[f32]) -> Vec<f64> {
        let joint: Vec<f64> = self
            .class_log_prior
            .iter()
            .zip(&self.feature_log_prob)
            .map(|(prior, row)| {
                prior
                    + row
                        .iter()
                        .zip(features)
                        .filter(|(_, value)| **value > 0.0)
                        .map(|(log_prob, value)| log_prob * f64::from(*value))
                        .sum::<f64>()
            })
            .collect();
        softmax(&joint)
    }
}

/// Numerically stable softmax over log-space scores.
pub(crate) fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|score| (score - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|value| value / total).collect()
}
