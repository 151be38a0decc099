//! End-to-end classification pipeline.
//!
//! `predict` routes every document (async, bounded translation), then runs
//! normalization, lexicon scoring, feature extraction and classification on
//! a blocking thread with rayon data parallelism. Output order always
//! matches input order, and a document that cannot be processed is recorded
//! in [`BatchReport::failures`] without aborting the batch.
pub mod report;
pub mod types;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use xxhash_rust::xxh3::xxh3_64;

use crate::classifier::{Classifier, ClassifierConfig, Model};
use crate::error::{PipelineError, Result};
use crate::features::{FeatureConfig, FeatureExtractor, FeatureVector};
use crate::lexicon::{Lexicon, LexiconScore, LexiconScorer};
use crate::normalizer::{MalformedText, NormalizerConfig, TextNormalizer};
use crate::observability::PipelineMetrics;
use crate::router::{LanguageRouter, RoutedDocument, RouterConfig};
use crate::translation::{PassthroughTranslator, Translator};

pub use report::BatchReport;
pub use types::{BatchWarning, Document, DocumentFailure, Prediction};

/// How the lexicon signal and the classifier output are combined.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum CombinationRule {
    /// The classifier decides; the lexicon score is reported alongside.
    #[default]
    ClassifierOnly,
    /// A strong lexicon signal that disagrees with the classifier wins, with
    /// confidence `min(1, |raw_score|)`.
    LexiconOverride {
        min_abs_score: f32,
        positive_label: String,
        negative_label: String,
    },
    /// The polarity labels' probabilities are mixed with the lexicon's
    /// polarity `(1 + clamp(raw_score, -1, 1)) / 2`, weighted by
    /// `lexicon_weight`, and the label is recomputed.
    Blend {
        lexicon_weight: f32,
        positive_label: String,
        negative_label: String,
    },
}

impl CombinationRule {
    fn needs_probabilities(&self) -> bool {
        matches!(self, Self::Blend { .. })
    }

    /// Labels this rule requires the model to know about.
    fn required_labels(&self) -> Vec<&str> {
        match self {
            Self::ClassifierOnly => Vec::new(),
            Self::LexiconOverride {
                positive_label,
                negative_label,
                ..
            }
            | Self::Blend {
                positive_label,
                negative_label,
                ..
            } => vec![positive_label.as_str(), negative_label.as_str()],
        }
    }

    /// Final `(label, confidence)` for one document.
    #[must_use]
    pub fn apply(
        &self,
        label: String,
        confidence: f32,
        probabilities: Option<&BTreeMap<String, f32>>,
        lexicon: &LexiconScore,
    ) -> (String, f32) {
        match self {
            Self::ClassifierOnly => (label, confidence),
            Self::LexiconOverride {
                min_abs_score,
                positive_label,
                negative_label,
            } => {
                let raw = lexicon.raw_score;
                if raw == 0.0 || raw.abs() < *min_abs_score {
                    return (label, confidence);
                }
                let polarity = if raw > 0.0 { positive_label } else { negative_label };
                if *polarity == label {
                    (label, confidence)
                } else {
                    (polarity.clone(), raw.abs().min(1.0))
                }
            }
            Self::Blend {
                lexicon_weight,
                positive_label,
                negative_label,
            } => {
                let Some(probabilities) = probabilities else {
                    return (label, confidence);
                };
                let weight = lexicon_weight.clamp(0.0, 1.0);
                let lexicon_positive = (1.0 + lexicon.raw_score.clamp(-1.0, 1.0)) / 2.0;

                let mut best: Option<(&String, f32)> = None;
                for (candidate, probability) in probabilities {
                    let lexicon_part = if candidate == positive_label {
                        lexicon_positive
                    } else if candidate == negative_label {
                        1.0 - lexicon_positive
                    } else {
                        0.0
                    };
                    let blended = (1.0 - weight) * probability + weight * lexicon_part;
                    if best.is_none_or(|(_, current)| blended > current) {
                        best = Some((candidate, blended));
                    }
                }
                best.map_or((label, confidence), |(candidate, blended)| {
                    (candidate.clone(), blended.clamp(0.0, 1.0))
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// The normalizer's language is the pipeline's target language.
    pub normalizer: NormalizerConfig,
    pub router: RouterConfig,
    pub features: FeatureConfig,
    pub classifier: ClassifierConfig,
    pub combination: CombinationRule,
    /// Reuse normalized tokens for texts seen earlier by this pipeline.
    pub cache_normalized: bool,
    pub cache_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            router: RouterConfig::default(),
            features: FeatureConfig::default(),
            classifier: ClassifierConfig::default(),
            combination: CombinationRule::default(),
            cache_normalized: false,
            cache_capacity: 10_000,
        }
    }
}

/// Outcome of [`Pipeline::fit`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitSummary {
    pub run_id: Uuid,
    /// Documents used for training.
    pub examples: usize,
    /// Training documents rejected as malformed.
    pub skipped: Vec<DocumentFailure>,
    pub labels: Vec<String>,
    pub vocabulary_size: usize,
}

#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    lexicon: Option<Arc<Lexicon>>,
    translator: Option<Arc<dyn Translator>>,
    metrics: Option<Arc<PipelineMetrics>>,
    model: Option<Arc<Model>>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Lexicon to score with; defaults to the bundled lexicon of the target
    /// language.
    #[must_use]
    pub fn lexicon(mut self, lexicon: Arc<Lexicon>) -> Self {
        self.lexicon = Some(lexicon);
        self
    }

    /// Defaults to [`PassthroughTranslator`].
    #[must_use]
    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Starts the pipeline with an already trained model.
    #[must_use]
    pub fn model(mut self, model: Arc<Model>) -> Self {
        self.model = Some(model);
        self
    }

    /// # Errors
    /// Returns [`PipelineError::InvalidConfig`] for bad classifier parameters,
    /// [`PipelineError::Lexicon`] when the lexicon cannot be loaded or
    /// matched, and [`PipelineError::Worker`] when metrics cannot be registered.
    pub fn build(self) -> Result<Pipeline> {
        let config = self.config;
        config.classifier.validate()?;
        let target = config.normalizer.language;
        let normalizer = Arc::new(TextNormalizer::new(config.normalizer.clone()));

        let lexicon = match self.lexicon {
            Some(lexicon) => lexicon,
            None => Arc::new(Lexicon::bundled(target)?),
        };
        let scorer = Arc::new(LexiconScorer::new(&lexicon, &normalizer)?);

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(
                PipelineMetrics::new()
                    .map_err(|error| PipelineError::Worker(format!("metrics registration: {error}")))?,
            ),
        };
        let translator = self
            .translator
            .unwrap_or_else(|| Arc::new(PassthroughTranslator));
        let router = LanguageRouter::new(config.router.clone(), target, translator)
            .with_metrics(Arc::clone(&metrics));

        let mut classifier = Classifier::new(config.classifier);
        if let Some(model) = self.model {
            classifier.set_model(model);
        }

        info!(
            target_language = %target,
            lexicon = lexicon.name(),
            lexicon_terms = scorer.len(),
            combination = ?config.combination,
            "pipeline built"
        );

        Ok(Pipeline {
            extractor: FeatureExtractor::new(config.features.clone()),
            cache: config
                .cache_normalized
                .then(|| Arc::new(NormalizationCache::new(config.cache_capacity))),
            config,
            normalizer,
            lexicon,
            scorer,
            router,
            classifier,
            metrics,
        })
    }
}

type CachedTokens = std::result::Result<Arc<Vec<String>>, MalformedText>;

/// Normalized tokens keyed by the xxh3 hash of the routed text. Each entry
/// keeps its text so a hash collision is a miss, never a wrong hit.
#[derive(Debug)]
struct NormalizationCache {
    capacity: usize,
    entries: RwLock<FxHashMap<u64, (Box<str>, CachedTokens)>>,
}

impl NormalizationCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    fn get(&self, text: &str) -> Option<CachedTokens> {
        let entries = self.entries.read().ok()?;
        let (stored, tokens) = entries.get(&xxh3_64(text.as_bytes()))?;
        (stored.as_ref() == text).then(|| tokens.clone())
    }

    fn insert(&self, text: &str, value: CachedTokens) {
        if let Ok(mut entries) = self.entries.write()
            && entries.len() < self.capacity
        {
            entries
                .entry(xxh3_64(text.as_bytes()))
                .or_insert_with(|| (Box::from(text), value));
        }
    }

    fn len(&self) -> usize {
        self.entries.read().map_or(0, |entries| entries.len())
    }
}

/// Shared, read-only state used by the CPU stages of a batch.
struct Stages {
    normalizer: Arc<TextNormalizer>,
    scorer: Arc<LexiconScorer>,
    cache: Option<Arc<NormalizationCache>>,
    metrics: Arc<PipelineMetrics>,
}

impl Stages {
    fn tokens(&self, text: &str) -> CachedTokens {
        let Some(cache) = &self.cache else {
            return self.normalizer.try_normalize(text).map(Arc::new);
        };
        if let Some(hit) = cache.get(text) {
            self.metrics.normalization_cache_hits.inc();
            return hit;
        }
        let tokens = self.normalizer.try_normalize(text).map(Arc::new);
        cache.insert(text, tokens.clone());
        tokens
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    normalizer: Arc<TextNormalizer>,
    lexicon: Arc<Lexicon>,
    scorer: Arc<LexiconScorer>,
    router: LanguageRouter,
    extractor: FeatureExtractor,
    classifier: Classifier,
    metrics: Arc<PipelineMetrics>,
    cache: Option<Arc<NormalizationCache>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("lexicon", &self.lexicon.name())
            .field("router", &self.router)
            .field("model_state", &self.classifier.state().name())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    #[must_use]
    pub fn lexicon(&self) -> &Arc<Lexicon> {
        &self.lexicon
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.classifier.is_ready()
    }

    /// # Errors
    /// [`PipelineError::ModelNotReady`] before a fit or load.
    pub fn model(&self) -> Result<&Arc<Model>> {
        self.classifier.model()
    }

    /// Number of cached normalized documents (0 when caching is off).
    #[must_use]
    pub fn cached_documents(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.len())
    }

    /// Normalizes `text` with the pipeline's normalizer.
    #[must_use]
    pub fn normalize(&self, text: &str) -> Vec<String> {
        self.normalizer.normalize(text)
    }

    /// Lexicon score of an untranslated text.
    #[must_use]
    pub fn score_text(&self, text: &str) -> LexiconScore {
        self.scorer.score(&self.normalizer.normalize(text))
    }

    fn stages(&self) -> Stages {
        Stages {
            normalizer: Arc::clone(&self.normalizer),
            scorer: Arc::clone(&self.scorer),
            cache: self.cache.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Trains a new model on labelled documents.
    ///
    /// Malformed training documents are skipped and listed in the summary.
    /// On error the previously fitted or loaded model stays in place.
    ///
    /// # Errors
    /// [`PipelineError::InsufficientTrainingData`] when `documents` and
    /// `labels` differ in length or the usable examples cover fewer than two
    /// labels.
    pub async fn fit(&mut self, documents: &[Document], labels: &[String]) -> Result<FitSummary> {
        if documents.len() != labels.len() {
            return Err(PipelineError::InsufficientTrainingData(format!(
                "{} documents but {} labels",
                documents.len(),
                labels.len()
            )));
        }
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(%run_id, documents = documents.len(), "fit started");

        let routed = self.router.route_batch(documents).await;
        let stages = self.stages();
        let ids: Vec<String> = documents
            .iter()
            .enumerate()
            .map(|(index, document)| document.display_id(index))
            .collect();
        let normalized = tokio::task::spawn_blocking(move || {
            routed
                .par_iter()
                .map(|routed| stages.tokens(&routed.text))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|error| PipelineError::Worker(error.to_string()))?;

        let mut corpus = Vec::with_capacity(documents.len());
        let mut targets = Vec::with_capacity(documents.len());
        let mut skipped = Vec::new();
        for (index, (tokens, label)) in normalized.into_iter().zip(labels).enumerate() {
            match tokens {
                Ok(tokens) => {
                    corpus.push(Vec::clone(&tokens));
                    targets.push(label.clone());
                }
                Err(reason) => {
                    warn!(%run_id, doc_id = %ids[index], %reason, "training document skipped");
                    skipped.push(DocumentFailure {
                        id: ids[index].clone(),
                        index,
                        reason: reason.to_string(),
                    });
                }
            }
        }

        let extractor = self.extractor.clone();
        let (vocabulary, vectors) = tokio::task::spawn_blocking(move || {
            let vocabulary = extractor.fit(&corpus);
            let vectors: Vec<FeatureVector> = corpus
                .par_iter()
                .map(|tokens| vocabulary.transform(tokens))
                .collect();
            (vocabulary, vectors)
        })
        .await
        .map_err(|error| PipelineError::Worker(error.to_string()))?;

        let model = self.classifier.fit(vocabulary, &vectors, &targets)?;
        self.metrics
            .fit_duration
            .observe(started.elapsed().as_secs_f64());
        info!(
            %run_id,
            examples = vectors.len(),
            skipped = skipped.len(),
            labels = ?model.labels(),
            vocabulary = model.vocabulary().len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "fit completed"
        );

        Ok(FitSummary {
            run_id,
            examples: vectors.len(),
            skipped,
            labels: model.labels().to_vec(),
            vocabulary_size: model.vocabulary().len(),
        })
    }

    /// Classifies a batch of documents.
    ///
    /// # Errors
    /// [`PipelineError::ModelNotReady`] before a fit or load, and
    /// [`PipelineError::Worker`] when a processing task panics. Per-document
    /// problems never fail the batch.
    pub async fn predict(&self, documents: &[Document]) -> Result<BatchReport> {
        let model = Arc::clone(self.classifier.model()?);
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(%run_id, documents = documents.len(), "predict started");

        let mut report = BatchReport::new(run_id);
        let mut combination = self.config.combination.clone();
        let missing: Vec<&str> = combination
            .required_labels()
            .into_iter()
            .filter(|label| !model.labels().iter().any(|known| known.as_str() == *label))
            .collect();
        if !missing.is_empty() {
            warn!(%run_id, ?missing, "combination labels unknown to the model; using classifier output only");
            report.warnings.push(BatchWarning {
                id: String::new(),
                index: 0,
                message: format!(
                    "combination rule labels {missing:?} are not model labels; classifier output used"
                ),
            });
            combination = CombinationRule::ClassifierOnly;
        }

        let routed = self.router.route_batch(documents).await;
        let ids: Vec<String> = documents
            .iter()
            .enumerate()
            .map(|(index, document)| document.display_id(index))
            .collect();
        for (index, routed) in routed.iter().enumerate() {
            if let Some(message) = &routed.warning {
                report.warnings.push(BatchWarning {
                    id: ids[index].clone(),
                    index,
                    message: message.clone(),
                });
            }
        }

        let stages = self.stages();
        let outcomes = tokio::task::spawn_blocking(move || {
            routed
                .into_par_iter()
                .zip(ids.into_par_iter())
                .enumerate()
                .map(|(index, (routed, id))| {
                    classify_one(&stages, &model, &combination, index, id, routed)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|error| PipelineError::Worker(error.to_string()))?;

        for outcome in outcomes {
            match outcome {
                Ok(prediction) => report.predictions.push(prediction),
                Err(failure) => {
                    warn!(%run_id, doc_id = %failure.id, reason = %failure.reason, "document failed");
                    report.failures.push(failure);
                }
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let (processed, failed) = (
            report.predictions.len() as f64,
            report.failures.len() as f64,
        );
        self.metrics.documents_processed.inc_by(processed);
        self.metrics.documents_failed.inc_by(failed);
        self.metrics
            .batch_duration
            .observe(started.elapsed().as_secs_f64());
        info!(
            %run_id,
            predictions = report.predictions.len(),
            failures = report.failures.len(),
            warnings = report.warnings.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "predict completed"
        );
        Ok(report)
    }

    /// # Errors
    /// [`PipelineError::ModelNotReady`] before a fit or load,
    /// [`PipelineError::ModelSave`] when writing fails.
    pub fn save_model(&self, path: &Path) -> Result<()> {
        self.classifier.save(path)
    }

    /// Replaces the current model with one read from `path`. On error the
    /// current model is kept.
    ///
    /// # Errors
    /// [`PipelineError::ModelLoad`] when the file is missing or invalid.
    pub fn load_model(&mut self, path: &Path) -> Result<()> {
        self.classifier.load_model(path)?;
        Ok(())
    }
}

fn classify_one(
    stages: &Stages,
    model: &Model,
    combination: &CombinationRule,
    index: usize,
    id: String,
    routed: RoutedDocument,
) -> std::result::Result<Prediction, DocumentFailure> {
    let failure = |id: String, reason: String| DocumentFailure { id, index, reason };

    let tokens = match stages.tokens(&routed.text) {
        Ok(tokens) => tokens,
        Err(reason) => {
            let error = PipelineError::MalformedDocument {
                id: id.clone(),
                reason: reason.to_string(),
            };
            return Err(failure(id, error.to_string()));
        }
    };

    let lexicon = stages.scorer.score(&tokens);
    let vector = model.vocabulary().transform(&tokens);
    let (label, confidence) = match model.predict(&vector) {
        Ok(decision) => decision,
        Err(error) => return Err(failure(id, error.to_string())),
    };
    let probabilities = if combination.needs_probabilities() {
        match model.predict_proba(&vector) {
            Ok(probabilities) => Some(probabilities),
            Err(error) => return Err(failure(id, error.to_string())),
        }
    } else {
        None
    };
    let (label, confidence) =
        combination.apply(label, confidence, probabilities.as_ref(), &lexicon);

    Ok(Prediction {
        id,
        index,
        label,
        confidence,
        raw_lexicon_score: lexicon.raw_score,
        categories: lexicon.categories,
        lexicon_matches: lexicon.matched,
        language: routed.language,
        translated: routed.translated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(raw_score: f32) -> LexiconScore {
        LexiconScore {
            raw_score,
            ..LexiconScore::default()
        }
    }

    fn override_rule() -> CombinationRule {
        CombinationRule::LexiconOverride {
            min_abs_score: 0.3,
            positive_label: "positive".to_string(),
            negative_label: "negative".to_string(),
        }
    }

    #[test]
    fn classifier_only_keeps_classifier_output() {
        let (label, confidence) =
            CombinationRule::ClassifierOnly.apply("negative".into(), 0.7, None, &score(0.9));
        assert_eq!(label, "negative");
        assert!((confidence - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn strong_disagreeing_lexicon_overrides() {
        let (label, confidence) = override_rule().apply("negative".into(), 0.6, None, &score(0.5));
        assert_eq!(label, "positive");
        assert!((confidence - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn weak_lexicon_does_not_override() {
        let (label, _) = override_rule().apply("negative".into(), 0.6, None, &score(0.1));
        assert_eq!(label, "negative");
    }

    #[test]
    fn agreeing_lexicon_keeps_classifier_confidence() {
        let (label, confidence) = override_rule().apply("negative".into(), 0.6, None, &score(-2.0));
        assert_eq!(label, "negative");
        assert!((confidence - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn blend_mixes_lexicon_polarity() {
        let rule = CombinationRule::Blend {
            lexicon_weight: 0.5,
            positive_label: "positive".to_string(),
            negative_label: "negative".to_string(),
        };
        let probabilities = BTreeMap::from([
            ("negative".to_string(), 0.55f32),
            ("positive".to_string(), 0.45f32),
        ]);
        let (label, confidence) =
            rule.apply("negative".into(), 0.55, Some(&probabilities), &score(1.0));
        assert_eq!(label, "positive");
        assert!((confidence - 0.725).abs() < 1e-6);
    }

    #[test]
    fn cache_respects_capacity() {
        let cache = NormalizationCache::new(1);
        cache.insert("a", Ok(Arc::new(vec!["a".to_string()])));
        cache.insert("b", Ok(Arc::new(vec!["b".to_string()])));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
    }

    #[test]
    fn cache_ignores_entries_for_other_texts() {
        let cache = NormalizationCache::new(4);
        let key = xxh3_64(b"first text");
        cache
            .entries
            .write()
            .expect("cache lock")
            .insert(key, (Box::from("colliding text"), Ok(Arc::new(vec!["wrong".to_string()]))));

        assert!(cache.get("first text").is_none());
        assert!(cache.get("colliding text").is_none());
    }
}
