//! Rocchio classifier: one L2-normalized centroid per label, cosine similarity
//! at prediction time.
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use super::argmax;
use super::naive_bayes::softmax;
use crate::features::FeatureVector;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidParams {
    /// Slope of the logistic mapping the best-vs-runner-up margin to a
    /// confidence.
    pub margin_scale: f64,
    /// Unit-length centroid per label. A label whose examples were all empty
    /// keeps a zero centroid.
    pub centroids: Vec<Vec<f32>>,
}

impl CentroidParams {
    pub(crate) fn fit(
        vectors: &[FeatureVector],
        targets: &[usize],
        labels: &[String],
        dim: usize,
        margin_scale: f64,
    ) -> Self {
        let mut sums = vec![Array1::<f32>::zeros(dim); labels.len()];
        let mut counts = vec![0usize; labels.len()];

        for (vector, &class) in vectors.iter().zip(targets) {
            let view = ArrayView1::from(vector.as_slice());
            let norm = view.dot(&view).sqrt();
            if norm > 0.0 {
                sums[class] = &sums[class] + &(&view / norm);
                counts[class] += 1;
            }
        }

        let centroids = sums
            .into_iter()
            .zip(&counts)
            .zip(labels)
            .map(|((sum, &count), label)| {
                if count == 0 {
                    tracing::warn!(label = %label, "no non-empty training vectors for label; centroid left at zero");
                    return sum.to_vec();
                }
                let norm = sum.dot(&sum).sqrt();
                if norm > 0.0 { (&sum / norm).to_vec() } else { sum.to_vec() }
            })
            .collect();

        Self {
            margin_scale,
            centroids,
        }
    }

    pub(crate) fn check_shape(&self, labels: usize, dim: usize) -> Result<(), String> {
        if self.centroids.len() != labels {
            return Err(format!(
                "centroid parameters cover {} classes, expected {labels}",
                self.centroids.len()
            ));
        }
        if let Some(row) = self.centroids.iter().find(|row| row.len() != dim) {
            return Err(format!("centroid has {} features, expected {dim}", row.len()));
        }
        if !self.margin_scale.is_finite() || self.margin_scale <= 0.0 {
            return Err(format!("invalid margin scale {}", self.margin_scale));
        }
        if self.centroids.iter().flatten().any(|value| !value.is_finite()) {
            return Err("centroids contain non-finite values".to_string());
        }
        Ok(())
    }

    fn similarities(&self, features: &[f32]) -> Vec<f64> {
        let target = ArrayView1::from(features);
        let norm = target.dot(&target).sqrt();
        if norm <= 0.0 {
            return vec![0.0; self.centroids.len()];
        }
        self.centroids
            .iter()
            .map(|centroid| f64::from(ArrayView1::from(centroid.as_slice()).dot(&target) / norm))
            .collect()
    }

    /// Best label index and a confidence that grows with the margin over the
    /// runner-up: `1 / (1 + exp(-scale * margin))`.
    pub(crate) fn decide(&self, features: &[f32]) -> (usize, f64) {
        let similarities = self.similarities(features);
        let best = argmax(&similarities);
        let runner_up = similarities
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != best)
            .map(|(_, value)| *value)
            .fold(f64::NEG_INFINITY, f64::max);
        let margin = (similarities[best] - runner_up).max(0.0);
        (best, 1.0 / (1.0 + (-self.margin_scale * margin).exp()))
    }

    pub(crate) fn distribution(&self, features: &[f32]) -> Vec<f64> {
        let scaled: Vec<f64> = self
            .similarities(features)
            .into_iter()
            .map(|similarity| similarity * self.margin_scale)
            .collect();
        softmax(&scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    fn params() -> CentroidParams {
        let vectors = vec![
            FeatureVector::from(vec![1.0, 0.0]),
            FeatureVector::from(vec![2.0, 0.1]),
            FeatureVector::from(vec![0.0, 1.0]),
        ];
        CentroidParams::fit(&vectors, &[0, 0, 1], &labels(), 2, 10.0)
    }

    #[test]
    fn centroids_are_unit_length() {
        for centroid in &params().centroids {
            let norm: f32 = centroid.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn confidence_grows_with_margin() {
        let params = params();
        let (clear, clear_confidence) = params.decide(&[1.0, 0.0]);
        let (close, close_confidence) = params.decide(&[1.0, 0.9]);
        assert_eq!(clear, 0);
        assert_eq!(close, 0);
        assert!(clear_confidence > close_confidence);
        assert!(close_confidence >= 0.5);
    }

    #[test]
    fn zero_vector_ties_to_first_label() {
        let (index, confidence) = params().decide(&[0.0, 0.0]);
        assert_eq!(index, 0);
        assert!((confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn label_without_examples_keeps_zero_centroid() {
        let vectors = vec![FeatureVector::from(vec![1.0, 0.0]), FeatureVector::from(vec![0.0, 0.0])];
        let params = CentroidParams::fit(&vectors, &[0, 1], &labels(), 2, 10.0);
        assert_eq!(params.centroids[1], vec![0.0, 0.0]);
    }
}
