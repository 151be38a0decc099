//! Translation collaborator.
//!
//! The router only depends on the [`Translator`] trait; [`HttpTranslator`]
//! talks to a LibreTranslate-compatible service and
//! [`PassthroughTranslator`] keeps everything offline.
pub mod http;

use async_trait::async_trait;

use crate::error::TranslationError;

pub use http::{HttpTranslator, HttpTranslatorConfig};

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates `text` into `target_lang`. `source_lang` is `None` when the
    /// source language is unknown and the service should detect it.
    async fn translate(
        &self,
        text: &str,
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> Result<String, TranslationError>;

    /// Short identifier used in logs.
    fn name(&self) -> &'static str;
}

/// Returns the input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    async fn translate(
        &self,
        text: &str,
        _source_lang: Option<&str>,
        _target_lang: &str,
    ) -> Result<String, TranslationError> {
        Ok(text.to_string())
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passthrough_returns_input() {
        let translated = PassthroughTranslator
            .translate("bom dia", Some("pt"), "es")
            .await
            .expect("passthrough never fails");
        assert_eq!(translated, "bom dia");
    }
}
