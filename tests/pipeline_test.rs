use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rstest::rstest;

use cca_core::classifier::{ClassifierConfig, ClassifierKind};
use cca_core::error::{PipelineError, TranslationError};
use cca_core::language::Language;
use cca_core::lexicon::Lexicon;
use cca_core::normalizer::NormalizerConfig;
use cca_core::pipeline::{CombinationRule, Document, Pipeline, PipelineConfig};
use cca_core::router::RouterConfig;
use cca_core::translation::Translator;
use cca_core::util::retry::RetryConfig;

const UNREACHABLE: &str = "[unreachable]";

/// Looks translations up in a phrase table; texts carrying the unreachable
/// marker always fail.
struct PhraseTranslator {
    phrases: HashMap<&'static str, &'static str>,
}

#[async_trait]
impl Translator for PhraseTranslator {
    async fn translate(
        &self,
        text: &str,
        _source_lang: Option<&str>,
        _target_lang: &str,
    ) -> Result<String, TranslationError> {
        if text.contains(UNREACHABLE) {
            return Err(TranslationError::Unavailable("connection refused".into()));
        }
        Ok(self
            .phrases
            .get(text)
            .map_or_else(|| text.to_string(), |phrase| (*phrase).to_string()))
    }

    fn name(&self) -> &'static str {
        "phrase-table"
    }
}

fn english_config() -> PipelineConfig {
    PipelineConfig {
        normalizer: NormalizerConfig::for_language(Language::English),
        router: RouterConfig {
            translation_timeout: Duration::from_millis(500),
            retry: RetryConfig::new(2, 1, 5),
            ..RouterConfig::default()
        },
        ..PipelineConfig::default()
    }
}

fn english_pipeline() -> Pipeline {
    Pipeline::builder()
        .config(english_config())
        .build()
        .expect("pipeline")
}

fn training_data() -> (Vec<Document>, Vec<String>) {
    let rows = [
        ("p1", "The new park is clean and beautiful, thank you", "positive"),
        ("p2", "Excellent garbage collection, always on time", "positive"),
        ("p3", "Great job fixing the lights, the street feels safe", "positive"),
        ("p4", "The bus service is fast and efficient now", "positive"),
        ("p5", "Thank you for the clean square and the new benches", "positive"),
        ("n1", "The street is dirty and the garbage is never collected", "negative"),
        ("n2", "Terrible potholes everywhere, nobody fixes them", "negative"),
        ("n3", "The bus is always late and the drivers are rude", "negative"),
        ("n4", "Dark streets and crime, we feel unsafe at night", "negative"),
        ("n5", "Flooding again, the drains are blocked and dirty", "negative"),
    ];
    let documents = rows
        .iter()
        .map(|(id, text, _)| Document::new(*id, *text).with_language("en"))
        .collect();
    let labels = rows.iter().map(|(_, _, label)| (*label).to_string()).collect();
    (documents, labels)
}

async fn trained_pipeline() -> Pipeline {
    let mut pipeline = english_pipeline();
    let (documents, labels) = training_data();
    pipeline.fit(&documents, &labels).await.expect("fit");
    pipeline
}

#[tokio::test]
async fn two_classes_of_five_examples_fit() {
    let mut pipeline = english_pipeline();
    let (documents, labels) = training_data();

    let summary = pipeline.fit(&documents, &labels).await.expect("fit");

    assert_eq!(summary.examples, 10);
    assert!(summary.skipped.is_empty());
    assert_eq!(summary.labels, vec!["negative".to_string(), "positive".to_string()]);
    assert!(summary.vocabulary_size > 0);
    assert!(pipeline.is_ready());
}

#[tokio::test]
async fn single_class_fit_fails_and_keeps_previous_model() {
    let mut pipeline = trained_pipeline().await;
    let sample = [Document::new("q", "clean park, thank you").with_language("en")];
    let before = pipeline.predict(&sample).await.expect("predict");

    let (documents, _) = training_data();
    let labels = vec!["positive".to_string(); documents.len()];
    let error = pipeline.fit(&documents, &labels).await.expect_err("one class");
    assert!(matches!(error, PipelineError::InsufficientTrainingData(_)));

    let after = pipeline.predict(&sample).await.expect("predict");
    assert_eq!(before.predictions, after.predictions);
}

#[tokio::test]
async fn mismatched_lengths_are_rejected() {
    let mut pipeline = english_pipeline();
    let (documents, mut labels) = training_data();
    labels.pop();
    let error = pipeline.fit(&documents, &labels).await.expect_err("length mismatch");
    assert!(matches!(error, PipelineError::InsufficientTrainingData(_)));
    assert!(!pipeline.is_ready());
}

#[tokio::test]
async fn predict_before_fit_is_model_not_ready() {
    let pipeline = english_pipeline();
    let error = pipeline
        .predict(&[Document::new("1", "hello")])
        .await
        .expect_err("untrained");
    assert!(matches!(error, PipelineError::ModelNotReady));
}

#[tokio::test]
async fn predictions_follow_training_signal() {
    let pipeline = trained_pipeline().await;
    let documents = [
        Document::new("a", "Thank you for the clean and beautiful park").with_language("en"),
        Document::new("b", "The streets are dirty and full of potholes").with_language("en"),
    ];

    let report = pipeline.predict(&documents).await.expect("predict");

    assert!(report.is_complete());
    assert_eq!(report.prediction_for("a").expect("a").label, "positive");
    assert_eq!(report.prediction_for("b").expect("b").label, "negative");
    for prediction in &report.predictions {
        assert!((0.0..=1.0).contains(&prediction.confidence));
    }
}

#[tokio::test]
async fn one_unreachable_translation_of_ten_degrades_to_warning() {
    let translator = Arc::new(PhraseTranslator {
        phrases: HashMap::from([
            ("el parque está limpio", "the park is clean"),
            ("la calle está sucia", "the street is dirty"),
        ]),
    });
    let mut pipeline = Pipeline::builder()
        .config(english_config())
        .translator(translator)
        .build()
        .expect("pipeline");
    let (documents, labels) = training_data();
    pipeline.fit(&documents, &labels).await.expect("fit");

    let documents: Vec<Document> = (0..10)
        .map(|i| {
            let text = match i {
                7 => format!("la calle está sucia {UNREACHABLE}"),
                i if i % 2 == 0 => "el parque está limpio".to_string(),
                _ => "la calle está sucia".to_string(),
            };
            Document::new(format!("doc-{i}"), text).with_language("es")
        })
        .collect();

    let report = pipeline.predict(&documents).await.expect("predict");

    assert_eq!(report.predictions.len(), 10);
    assert!(report.failures.is_empty());
    for (index, prediction) in report.predictions.iter().enumerate() {
        assert_eq!(prediction.index, index);
        assert_eq!(prediction.id, format!("doc-{index}"));
        assert_eq!(prediction.language, Language::Spanish);
        assert_eq!(prediction.translated, index != 7);
    }
    let warnings = report.warnings_for("doc-7");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("connection refused"));
    assert_eq!(report.warnings.len(), 1);
    assert!((pipeline.metrics().translation_fallbacks.get() - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn empty_document_gets_a_defined_prediction() {
    let pipeline = trained_pipeline().await;
    let report = pipeline
        .predict(&[Document::new("empty", "")])
        .await
        .expect("predict");

    let prediction = report.prediction_for("empty").expect("prediction");
    assert!(prediction.raw_lexicon_score.abs() < f32::EPSILON);
    assert_eq!(prediction.lexicon_matches, 0);
    assert!(["negative", "positive"].contains(&prediction.label.as_str()));
}

#[tokio::test]
async fn malformed_documents_are_recorded_without_aborting() {
    let pipeline = trained_pipeline().await;
    let documents = [
        Document::new("ok-1", "clean park").with_language("en"),
        Document::new("bad", "dirty\0street").with_language("en"),
        Document::new("ok-2", "dirty street").with_language("en"),
    ];

    let report = pipeline.predict(&documents).await.expect("predict");

    assert_eq!(report.total(), 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].id, "bad");
    assert_eq!(report.failures[0].index, 1);
    assert!(report.failures[0].reason.contains("NUL"));
    let ids: Vec<&str> = report.predictions.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["ok-1", "ok-2"]);
    assert!((pipeline.metrics().documents_failed.get() - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn predict_is_idempotent() {
    let pipeline = trained_pipeline().await;
    let (documents, _) = training_data();

    let first = pipeline.predict(&documents).await.expect("first");
    let second = pipeline.predict(&documents).await.expect("second");

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(first.predictions, second.predictions);
}

#[rstest]
#[case(ClassifierKind::NaiveBayes)]
#[case(ClassifierKind::Centroid)]
#[tokio::test]
async fn saved_model_predicts_identically_after_load(#[case] kind: ClassifierKind) {
    let config = PipelineConfig {
        classifier: ClassifierConfig {
            kind,
            ..ClassifierConfig::default()
        },
        ..english_config()
    };
    let mut pipeline = Pipeline::builder()
        .config(config.clone())
        .build()
        .expect("pipeline");
    let (documents, labels) = training_data();
    pipeline.fit(&documents, &labels).await.expect("fit");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("model.json");
    pipeline.save_model(&path).expect("save");

    let mut restored = Pipeline::builder().config(config).build().expect("pipeline");
    restored.load_model(&path).expect("load");

    let held_out = [
        Document::new("h1", "the benches in the square are great").with_language("en"),
        Document::new("h2", "crime and dark streets at night").with_language("en"),
        Document::new("h3", "the drivers were on time").with_language("en"),
    ];
    let original = pipeline.predict(&held_out).await.expect("original");
    let reloaded = restored.predict(&held_out).await.expect("reloaded");
    assert_eq!(original.predictions, reloaded.predictions);
}

#[tokio::test]
async fn loading_a_missing_model_keeps_the_current_one() {
    let mut pipeline = trained_pipeline().await;
    let error = pipeline
        .load_model(std::path::Path::new("/nonexistent/model.json"))
        .expect_err("missing");
    assert!(matches!(error, PipelineError::ModelLoad { .. }));
    assert!(pipeline.is_ready());
}

#[tokio::test]
async fn lexicon_scores_follow_polarity() {
    let lexicon = Lexicon::from_weights("polarity", [("excellent", 1.0), ("terrible", -1.0)])
        .expect("lexicon");
    let pipeline = Pipeline::builder()
        .config(english_config())
        .lexicon(Arc::new(lexicon))
        .build()
        .expect("pipeline");

    assert!(pipeline.score_text("This service is excellent").raw_score > 0.0);
    assert!(pipeline.score_text("This service is terrible").raw_score < 0.0);
    assert!(pipeline.score_text("This service is fine").raw_score.abs() < f32::EPSILON);
}

#[tokio::test]
async fn strong_lexicon_signal_overrides_classifier() {
    let lexicon = Lexicon::from_weights("polarity", [("wonderful", 1.0), ("dreadful", -1.0)])
        .expect("lexicon");
    let config = PipelineConfig {
        combination: CombinationRule::LexiconOverride {
            min_abs_score: 0.3,
            positive_label: "positive".to_string(),
            negative_label: "negative".to_string(),
        },
        ..english_config()
    };
    let mut pipeline = Pipeline::builder()
        .config(config)
        .lexicon(Arc::new(lexicon))
        .build()
        .expect("pipeline");
    let (documents, labels) = training_data();
    pipeline.fit(&documents, &labels).await.expect("fit");

    let report = pipeline
        .predict(&[Document::new("x", "dirty dreadful").with_language("en")])
        .await
        .expect("predict");
    let prediction = report.prediction_for("x").expect("prediction");
    assert_eq!(prediction.label, "negative");

    let report = pipeline
        .predict(&[Document::new("y", "dirty wonderful").with_language("en")])
        .await
        .expect("predict");
    let prediction = report.prediction_for("y").expect("prediction");
    assert_eq!(prediction.label, "positive");
    assert!((prediction.confidence - 0.5).abs() < 1e-6);
}

#[tokio::test]
async fn blend_with_unknown_labels_falls_back_with_warning() {
    let config = PipelineConfig {
        combination: CombinationRule::Blend {
            lexicon_weight: 0.5,
            positive_label: "favourable".to_string(),
            negative_label: "unfavourable".to_string(),
        },
        ..english_config()
    };
    let mut pipeline = Pipeline::builder().config(config).build().expect("pipeline");
    let (documents, labels) = training_data();
    pipeline.fit(&documents, &labels).await.expect("fit");

    let report = pipeline
        .predict(&[Document::new("z", "clean park").with_language("en")])
        .await
        .expect("predict");
    assert_eq!(report.predictions.len(), 1);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].message.contains("not model labels"));
}

#[tokio::test]
async fn lexicon_override_with_unknown_labels_keeps_classifier_label() {
    let lexicon = Lexicon::from_weights("polarity", [("wonderful", 1.0), ("dreadful", -1.0)])
        .expect("lexicon");
    let config = PipelineConfig {
        combination: CombinationRule::LexiconOverride {
            min_abs_score: 0.3,
            positive_label: "favourable".to_string(),
            negative_label: "unfavourable".to_string(),
        },
        ..english_config()
    };
    let mut pipeline = Pipeline::builder()
        .config(config)
        .lexicon(Arc::new(lexicon))
        .build()
        .expect("pipeline");
    let (documents, labels) = training_data();
    pipeline.fit(&documents, &labels).await.expect("fit");

    let report = pipeline
        .predict(&[Document::new("y", "dirty wonderful").with_language("en")])
        .await
        .expect("predict");
    let prediction = report.prediction_for("y").expect("prediction");
    assert!(labels.contains(&prediction.label), "label {} is not a model label", prediction.label);
    assert_eq!(prediction.label, "negative");
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].message.contains("not model labels"));
}

#[tokio::test]
async fn invalid_classifier_parameters_are_rejected_at_build() {
    let config = PipelineConfig {
        classifier: ClassifierConfig {
            kind: ClassifierKind::Centroid,
            margin_scale: 0.0,
            ..ClassifierConfig::default()
        },
        ..english_config()
    };
    let error = Pipeline::builder()
        .config(config)
        .build()
        .expect_err("zero margin scale");
    assert!(matches!(error, PipelineError::InvalidConfig(_)), "unexpected error: {error:?}");
}

#[tokio::test]
async fn normalization_cache_serves_repeated_texts() {
    let config = PipelineConfig {
        cache_normalized: true,
        ..english_config()
    };
    let mut pipeline = Pipeline::builder().config(config).build().expect("pipeline");
    let (documents, labels) = training_data();
    pipeline.fit(&documents, &labels).await.expect("fit");
    assert_eq!(pipeline.cached_documents(), documents.len());

    let report = pipeline.predict(&documents).await.expect("predict");
    assert_eq!(report.predictions.len(), documents.len());
    assert!(pipeline.metrics().normalization_cache_hits.get() >= 10.0);
}

#[tokio::test]
async fn pipelines_can_share_a_fitted_model() {
    let pipeline = trained_pipeline().await;
    let model = Arc::clone(pipeline.model().expect("model"));
    let sibling = Pipeline::builder()
        .config(english_config())
        .model(model)
        .build()
        .expect("pipeline");

    let (documents, _) = training_data();
    let ours = pipeline.predict(&documents).await.expect("predict");
    let theirs = sibling.predict(&documents).await.expect("predict");
    assert_eq!(ours.predictions, theirs.predictions);
    assert!(sibling.metrics().render().contains("documents_processed"));
}
