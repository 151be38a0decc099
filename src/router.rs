//! Language routing: decide each document's language and translate it into
//! the pipeline's target language when needed.
//!
//! Translation is the only I/O in the pipeline. Every call is bounded by a
//! semaphore and a timeout and retried once; when the retry fails as well
//! the original text passes through with a warning, so a flaky translator
//! degrades quality but never aborts a batch.
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::TranslationError;
use crate::language::{DetectionConfig, Language, detect};
use crate::observability::PipelineMetrics;
use crate::pipeline::Document;
use crate::translation::Translator;
use crate::util::retry::RetryConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    pub detection: DetectionConfig,
    /// When false, documents are never sent to the translator.
    pub translate: bool,
    pub translation_timeout: Duration,
    pub retry: RetryConfig,
    /// Upper bound on in-flight translation calls.
    pub max_concurrency: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            translate: true,
            translation_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
            max_concurrency: 8,
        }
    }
}

/// Document text ready for normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedDocument {
    pub text: String,
    /// Language the document was written in.
    pub language: Language,
    pub translated: bool,
    pub warning: Option<String>,
}

pub struct LanguageRouter {
    config: RouterConfig,
    target: Language,
    translator: Arc<dyn Translator>,
    limiter: Arc<Semaphore>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl std::fmt::Debug for LanguageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageRouter")
            .field("config", &self.config)
            .field("target", &self.target)
            .field("translator", &self.translator.name())
            .finish_non_exhaustive()
    }
}

impl LanguageRouter {
    #[must_use]
    pub fn new(mut config: RouterConfig, target: Language, translator: Arc<dyn Translator>) -> Self {
        // At most one retry per document.
        config.retry.max_attempts = config.retry.max_attempts.clamp(1, 2);
        let permits = config.max_concurrency.max(1);
        Self {
            config,
            target,
            translator,
            limiter: Arc::new(Semaphore::new(permits)),
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn target(&self) -> Language {
        self.target
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Routes one document. Never fails: translation problems are reported
    /// through [`RoutedDocument::warning`].
    pub async fn route(&self, document: &Document, index: usize) -> RoutedDocument {
        let doc_id = document.display_id(index);
        let declared = document
            .declared_language
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty());

        let (language, source_code) = match declared {
            Some(code) => {
                let language = Language::from_code(code);
                let source = if language == Language::Unknown {
                    code.to_string()
                } else {
                    language.code().to_string()
                };
                (language, Some(source))
            }
            None => {
                let (language, confidence) = detect(&document.text, &self.config.detection);
                debug!(doc_id = %doc_id, %language, confidence, "language detected");
                let source = (language != Language::Unknown).then(|| language.code().to_string());
                (language, source)
            }
        };

        let untouched = |warning: Option<String>| RoutedDocument {
            text: document.text.clone(),
            language,
            translated: false,
            warning,
        };

        // Undetected languages are treated as already being in the target.
        let Some(source_code) = source_code else {
            return untouched(None);
        };
        if language == self.target || !self.config.translate || document.text.trim().is_empty() {
            return untouched(None);
        }

        match self
            .translate_with_retry(&doc_id, &document.text, &source_code)
            .await
        {
            Ok(text) => RoutedDocument {
                text,
                language,
                translated: true,
                warning: None,
            },
            Err(error) => {
                warn!(
                    doc_id = %doc_id,
                    source = %source_code,
                    target = %self.target,
                    error = %error,
                    "translation failed; passing original text through"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.translation_fallbacks.inc();
                }
                untouched(Some(format!(
                    "translation {source_code} -> {} failed: {error}; original text used",
                    self.target
                )))
            }
        }
    }

    /// Routes every document concurrently. Results keep the input order.
    pub async fn route_batch(&self, documents: &[Document]) -> Vec<RoutedDocument> {
        join_all(
            documents
                .iter()
                .enumerate()
                .map(|(index, document)| self.route(document, index)),
        )
        .await
    }

    async fn translate_with_retry(
        &self,
        doc_id: &str,
        text: &str,
        source: &str,
    ) -> Result<String, TranslationError> {
        let target = self.target.code();
        let mut attempt = 0;
        loop {
            let error = match self.attempt(text, source, target).await {
                Ok(translated) => return Ok(translated),
                Err(error) => error,
            };
            attempt += 1;
            if let Some(metrics) = &self.metrics {
                metrics.translations_failed.inc();
            }
            if !self.config.retry.can_retry(attempt) {
                return Err(error);
            }

            let delay = self.config.retry.delay_for_attempt(attempt);
            warn!(
                doc_id = %doc_id,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "translation attempt failed; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, text: &str, source: &str, target: &str) -> Result<String, TranslationError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| TranslationError::Unavailable("translation limiter closed".to_string()))?;
        if let Some(metrics) = &self.metrics {
            metrics.translations_attempted.inc();
        }

        let started = Instant::now();
        let timeout = self.config.translation_timeout;
        let outcome = tokio::time::timeout(
            timeout,
            self.translator.translate(text, Some(source), target),
        )
        .await;
        if let Some(metrics) = &self.metrics {
            metrics
                .translation_latency
                .observe(started.elapsed().as_secs_f64());
        }

        match outcome {
            Ok(result) => result,
            Err(_) => Err(TranslationError::Timeout(
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }
}
