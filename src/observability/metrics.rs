use std::sync::Arc;

use prometheus::{
    Counter, Histogram, Registry, TextEncoder, register_counter_with_registry,
    register_histogram_with_registry,
};

/// Prometheus collectors for one pipeline. Each pipeline owns its registry so
/// several can coexist in a process.
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    registry: Arc<Registry>,

    pub documents_processed: Counter,
    pub documents_failed: Counter,
    pub translations_attempted: Counter,
    pub translations_failed: Counter,
    pub translation_fallbacks: Counter,
    pub normalization_cache_hits: Counter,

    pub batch_duration: Histogram,
    pub fit_duration: Histogram,
    pub translation_latency: Histogram,
}

impl PipelineMetrics {
    /// # Errors
    /// Fails when a collector cannot be registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// # Errors
    /// Fails when a collector cannot be registered, e.g. because `registry`
    /// already holds collectors with the same names.
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            documents_processed: register_counter_with_registry!(
                "cca_documents_processed_total",
                "Documents that produced a prediction",
                registry
            )?,
            documents_failed: register_counter_with_registry!(
                "cca_documents_failed_total",
                "Documents recorded as per-document failures",
                registry
            )?,
            translations_attempted: register_counter_with_registry!(
                "cca_translations_attempted_total",
                "Translation calls issued, retries included",
                registry
            )?,
            translations_failed: register_counter_with_registry!(
                "cca_translations_failed_total",
                "Translation calls that failed or timed out",
                registry
            )?,
            translation_fallbacks: register_counter_with_registry!(
                "cca_translation_fallbacks_total",
                "Documents passed through untranslated after retries were exhausted",
                registry
            )?,
            normalization_cache_hits: register_counter_with_registry!(
                "cca_normalization_cache_hits_total",
                "Documents served from the normalized-document cache",
                registry
            )?,
            batch_duration: register_histogram_with_registry!(
                "cca_batch_duration_seconds",
                "Duration of a predict batch",
                registry
            )?,
            fit_duration: register_histogram_with_registry!(
                "cca_fit_duration_seconds",
                "Duration of model training",
                registry
            )?,
            translation_latency: register_histogram_with_registry!(
                "cca_translation_latency_seconds",
                "Latency of individual translation calls",
                registry
            )?,
            registry,
        })
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Text exposition of every collector in this pipeline's registry.
    #[must_use]
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_counters() {
        let metrics = PipelineMetrics::new().expect("metrics");
        metrics.documents_processed.inc_by(3.0);
        let rendered = metrics.render();
        assert!(rendered.contains("cca_documents_processed_total 3"));
    }

    #[test]
    fn separate_pipelines_do_not_collide() {
        let first = PipelineMetrics::new().expect("first");
        let second = PipelineMetrics::new().expect("second");
        first.documents_failed.inc();
        assert!((second.documents_failed.get() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn shared_registry_rejects_duplicates() {
        let registry = Arc::new(Registry::new());
        PipelineMetrics::with_registry(Arc::clone(&registry)).expect("first");
        assert!(PipelineMetrics::with_registry(registry).is_err());
    }
}
