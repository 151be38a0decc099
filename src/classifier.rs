//! Trainable text classifier over [`FeatureVector`]s.
//!
//! A [`Model`] bundles the fitted parameters with the vocabulary snapshot and
//! label set it was trained on. [`Classifier`] wraps the model lifecycle so
//! that predicting before a fit or load fails with
//! [`PipelineError::ModelNotReady`] instead of producing garbage.
pub mod centroid;
pub mod naive_bayes;
pub mod persist;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::features::{FeatureVector, Vocabulary};

pub use centroid::CentroidParams;
pub use naive_bayes::NaiveBayesParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// Multinomial naive Bayes; confidence is the posterior probability.
    #[default]
    NaiveBayes,
    /// Nearest class centroid by cosine similarity; confidence is derived
    /// from the margin to the runner-up.
    Centroid,
}

impl FromStr for ClassifierKind {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_lowercase().replace('-', "_").as_str() {
            "naive_bayes" | "nb" | "bayes" => Ok(Self::NaiveBayes),
            "centroid" | "rocchio" => Ok(Self::Centroid),
            other => Err(format!("unknown classifier kind: {other}")),
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NaiveBayes => f.write_str("naive_bayes"),
            Self::Centroid => f.write_str("centroid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
    pub kind: ClassifierKind,
    /// Additive (Laplace) smoothing for naive Bayes.
    pub alpha: f64,
    /// Slope of the logistic applied to the centroid margin.
    pub margin_scale: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            kind: ClassifierKind::NaiveBayes,
            alpha: 1.0,
            margin_scale: 10.0,
        }
    }
}

impl ClassifierConfig {
    /// Checks the numeric parameters of both algorithms.
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidConfig`] when `alpha` or
    /// `margin_scale` is not a positive finite number.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("alpha", self.alpha), ("margin_scale", self.margin_scale)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "classifier {name} must be positive and finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Algorithm specific parameters, one row per label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelParams {
    NaiveBayes(NaiveBayesParams),
    Centroid(CentroidParams),
}

impl ModelParams {
    #[must_use]
    pub fn kind(&self) -> ClassifierKind {
        match self {
            Self::NaiveBayes(_) => ClassifierKind::NaiveBayes,
            Self::Centroid(_) => ClassifierKind::Centroid,
        }
    }

    fn check_shape(&self, labels: usize, dim: usize) -> std::result::Result<(), String> {
        match self {
            Self::NaiveBayes(params) => params.check_shape(labels, dim),
            Self::Centroid(params) => params.check_shape(labels, dim),
        }
    }
}

/// Fitted classifier: parameters plus the vocabulary and labels they refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    labels: Vec<String>,
    vocabulary: Vocabulary,
    params: ModelParams,
    trained_at: DateTime<Utc>,
}

impl Model {
    pub(crate) fn from_parts(
        labels: Vec<String>,
        vocabulary: Vocabulary,
        params: ModelParams,
        trained_at: DateTime<Utc>,
    ) -> std::result::Result<Self, String> {
        if labels.len() < 2 {
            return Err(format!("model needs at least two labels, found {}", labels.len()));
        }
        if labels.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err("labels must be unique and sorted".to_string());
        }
        params.check_shape(labels.len(), vocabulary.len())?;
        Ok(Self {
            labels,
            vocabulary,
            params,
            trained_at,
        })
    }

    #[must_use]
    pub fn kind(&self) -> ClassifierKind {
        self.params.kind()
    }

    /// Label set, sorted ascending.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[must_use]
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    #[must_use]
    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    #[must_use]
    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Most likely label and its confidence in `[0, 1]`.
    ///
    /// # Errors
    /// Returns [`PipelineError::DimensionMismatch`] when `vector` was not built
    /// from this model's vocabulary.
    pub fn predict(&self, vector: &FeatureVector) -> Result<(String, f32)> {
        self.check_dimension(vector)?;
        let (index, confidence) = match &self.params {
            ModelParams::NaiveBayes(params) => {
                let posterior = params.posterior(vector.as_slice());
                let best = argmax(&posterior);
                (best, posterior[best])
            }
            ModelParams::Centroid(params) => params.decide(vector.as_slice()),
        };
        #[allow(clippy::cast_possible_truncation)]
        let confidence = confidence.clamp(0.0, 1.0) as f32;
        Ok((self.labels[index].clone(), confidence))
    }

    /// Per-label confidence. Values sum to one.
    ///
    /// # Errors
    /// See [`predict`](Self::predict).
    pub fn predict_proba(&self, vector: &FeatureVector) -> Result<BTreeMap<String, f32>> {
        self.check_dimension(vector)?;
        let distribution = match &self.params {
            ModelParams::NaiveBayes(params) => params.posterior(vector.as_slice()),
            ModelParams::Centroid(params) => params.distribution(vector.as_slice()),
        };
        #[allow(clippy::cast_possible_truncation)]
        let proba = self
            .labels
            .iter()
            .cloned()
            .zip(distribution.into_iter().map(|value| value as f32))
            .collect();
        Ok(proba)
    }

    fn check_dimension(&self, vector: &FeatureVector) -> Result<()> {
        if vector.len() != self.vocabulary.len() {
            return Err(PipelineError::DimensionMismatch {
                expected: self.vocabulary.len(),
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Trains a model on `vectors` built from `vocabulary`.
///
/// # Errors
/// Returns [`PipelineError::InvalidConfig`] for a bad `config`, and
/// [`PipelineError::InsufficientTrainingData`] when the inputs differ in
/// length, are empty, contain fewer than two distinct labels, or when a
/// vector does not match the vocabulary dimension.
pub fn fit(
    config: &ClassifierConfig,
    vocabulary: Vocabulary,
    vectors: &[FeatureVector],
    labels: &[String],
) -> Result<Model> {
    config.validate()?;
    let classes = validate_training_set(&vocabulary, vectors, labels)?;
    let targets: Vec<usize> = labels
        .iter()
        .map(|label| classes.binary_search(label).unwrap_or_default())
        .collect();

    let params = match config.kind {
        ClassifierKind::NaiveBayes => ModelParams::NaiveBayes(NaiveBayesParams::fit(
            vectors,
            &targets,
            classes.len(),
            vocabulary.len(),
            config.alpha,
        )),
        ClassifierKind::Centroid => ModelParams::Centroid(CentroidParams::fit(
            vectors,
            &targets,
            &classes,
            vocabulary.len(),
            config.margin_scale,
        )),
    };

    tracing::info!(
        kind = %config.kind,
        examples = vectors.len(),
        classes = classes.len(),
        features = vocabulary.len(),
        "classifier fitted"
    );

    Model::from_parts(classes, vocabulary, params, Utc::now())
        .map_err(PipelineError::InsufficientTrainingData)
}

/// Free-function form of [`Model::predict`].
///
/// # Errors
/// See [`Model::predict`].
pub fn predict(model: &Model, vector: &FeatureVector) -> Result<(String, f32)> {
    model.predict(vector)
}

fn validate_training_set(
    vocabulary: &Vocabulary,
    vectors: &[FeatureVector],
    labels: &[String],
) -> Result<Vec<String>> {
    let insufficient = |reason: String| Err(PipelineError::InsufficientTrainingData(reason));

    if vectors.len() != labels.len() {
        return insufficient(format!(
            "{} feature vectors but {} labels",
            vectors.len(),
            labels.len()
        ));
    }
    if vectors.is_empty() {
        return insufficient("no training examples".to_string());
    }
    if vocabulary.is_empty() {
        return insufficient("training documents produced an empty vocabulary".to_string());
    }
    if labels.iter().any(|label| label.trim().is_empty()) {
        return insufficient("training labels must not be empty".to_string());
    }
    if let Some((position, vector)) = vectors
        .iter()
        .enumerate()
        .find(|(_, vector)| vector.len() != vocabulary.len())
    {
        return insufficient(format!(
            "vector {position} has dimension {} but the vocabulary has {} terms",
            vector.len(),
            vocabulary.len()
        ));
    }

    let classes: BTreeSet<&String> = labels.iter().collect();
    if classes.len() < 2 {
        return insufficient(format!(
            "at least two distinct labels are required, found {}",
            classes.len()
        ));
    }
    Ok(classes.into_iter().cloned().collect())
}

/// Index of the largest value; ties resolve to the lowest index, which is the
/// lexicographically smallest label.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (index, value) in values.iter().enumerate().skip(1) {
        if *value > values[best] {
            best = index;
        }
    }
    best
}

/// Accuracy summary produced by [`Classifier::evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    /// `(correct, support)` per expected label.
    pub per_label: BTreeMap<String, (usize, usize)>,
}

/// Lifecycle state of a [`Classifier`].
#[derive(Debug, Clone, Default)]
pub enum ModelState {
    #[default]
    Untrained,
    Fitted(Arc<Model>),
    Loaded(Arc<Model>),
}

impl ModelState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Untrained => "untrained",
            Self::Fitted(_) => "fitted",
            Self::Loaded(_) => "loaded",
        }
    }
}

/// Classifier with an explicit `Untrained → Fitted → Loaded` lifecycle.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
    state: ModelState,
}

impl Classifier {
    #[must_use]
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            state: ModelState::Untrained,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> &ModelState {
        &self.state
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        !matches!(self.state, ModelState::Untrained)
    }

    /// The current model.
    ///
    /// # Errors
    /// Returns [`PipelineError::ModelNotReady`] before a fit or load.
    pub fn model(&self) -> Result<&Arc<Model>> {
        match &self.state {
            ModelState::Untrained => Err(PipelineError::ModelNotReady),
            ModelState::Fitted(model) | ModelState::Loaded(model) => Ok(model),
        }
    }

    /// Trains a new model. On error the previous state is kept.
    ///
    /// # Errors
    /// See [`fit`].
    pub fn fit(
        &mut self,
        vocabulary: Vocabulary,
        vectors: &[FeatureVector],
        labels: &[String],
    ) -> Result<Arc<Model>> {
        let model = Arc::new(fit(&self.config, vocabulary, vectors, labels)?);
        self.state = ModelState::Fitted(Arc::clone(&model));
        Ok(model)
    }

    /// Replaces the current model with one read from `path`, keeping this
    /// classifier's configuration for later fits. On error the previous state
    /// is kept.
    ///
    /// # Errors
    /// Returns [`PipelineError::ModelLoad`] when the file is missing, malformed
    /// or internally inconsistent.
    pub fn load_model(&mut self, path: &Path) -> Result<Arc<Model>> {
        let model = Arc::new(persist::load(path)?);
        self.state = ModelState::Loaded(Arc::clone(&model));
        Ok(model)
    }

    /// Installs an already built model.
    pub fn set_model(&mut self, model: Arc<Model>) {
        self.state = ModelState::Loaded(model);
    }

    /// # Errors
    /// [`PipelineError::ModelNotReady`] before a fit or load, otherwise see
    /// [`Model::predict`].
    pub fn predict(&self, vector: &FeatureVector) -> Result<(String, f32)> {
        self.model()?.predict(vector)
    }

    /// # Errors
    /// See [`predict`](Self::predict).
    pub fn predict_proba(&self, vector: &FeatureVector) -> Result<BTreeMap<String, f32>> {
        self.model()?.predict_proba(vector)
    }

    /// Accuracy of the current model on a labelled set.
    ///
    /// # Errors
    /// [`PipelineError::ModelNotReady`] before a fit or load,
    /// [`PipelineError::InsufficientTrainingData`] when the inputs differ in
    /// length or are empty.
    pub fn evaluate(&self, vectors: &[FeatureVector], labels: &[String]) -> Result<Evaluation> {
        let model = self.model()?;
        if vectors.len() != labels.len() || vectors.is_empty() {
            return Err(PipelineError::InsufficientTrainingData(format!(
                "cannot evaluate {} vectors against {} labels",
                vectors.len(),
                labels.len()
            )));
        }

        let mut per_label: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        let mut correct = 0;
        for (vector, expected) in vectors.iter().zip(labels) {
            let (predicted, _) = model.predict(vector)?;
            let stats = per_label.entry(expected.clone()).or_default();
            stats.1 += 1;
            if &predicted == expected {
                stats.0 += 1;
                correct += 1;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let accuracy = correct as f64 / vectors.len() as f64;
        Ok(Evaluation {
            total: vectors.len(),
            correct,
            accuracy,
            per_label,
        })
    }

    /// Persists the current model.
    ///
    /// # Errors
    /// [`PipelineError::ModelNotReady`] before a fit or load,
    /// [`PipelineError::ModelSave`] when writing fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        persist::save(self.model()?, path)
    }
}
