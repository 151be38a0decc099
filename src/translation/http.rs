//! LibreTranslate-compatible HTTP client.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Translator;
use crate::error::TranslationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTranslatorConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpTranslatorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[derive(Debug, Clone)]
pub struct HttpTranslator {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    request_timeout: Duration,
}

impl HttpTranslator {
    /// # Errors
    /// Returns [`TranslationError::Unavailable`] when the base URL is invalid
    /// or the HTTP client cannot be built.
    pub fn new(config: HttpTranslatorConfig) -> Result<Self, TranslationError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| {
                TranslationError::Unavailable(format!("failed to build HTTP client: {error}"))
            })?;

        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)
            .and_then(|url| url.join("translate"))
            .map_err(|error| {
                TranslationError::Unavailable(format!(
                    "invalid translation base URL {}: {error}",
                    config.base_url
                ))
            })?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key,
            request_timeout: config.request_timeout,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn map_transport_error(&self, error: &reqwest::Error) -> TranslationError {
        if error.is_timeout() {
            let millis = u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX);
            return TranslationError::Timeout(millis);
        }
        TranslationError::Unavailable(error.to_string())
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(
        &self,
        text: &str,
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> Result<String, TranslationError> {
        let source = source_lang.unwrap_or("auto");
        let request = TranslateRequest {
            q: text,
            source,
            target: target_lang,
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|error| self.map_transport_error(&error))?;

        let status = response.status();
        debug!(%status, source, target = target_lang, "translation response received");
        match status {
            StatusCode::TOO_MANY_REQUESTS => return Err(TranslationError::QuotaExceeded),
            StatusCode::BAD_REQUEST => {
                return Err(TranslationError::UnsupportedLanguage {
                    source_lang: source.to_string(),
                    target_lang: target_lang.to_string(),
                });
            }
            status if status.is_server_error() => {
                return Err(TranslationError::Unavailable(format!(
                    "translation service returned {status}"
                )));
            }
            status if !status.is_success() => {
                return Err(TranslationError::InvalidResponse(format!(
                    "unexpected status {status}"
                )));
            }
            _ => {}
        }

        let body: TranslateResponse = response.json().await.map_err(|error| {
            if error.is_timeout() {
                self.map_transport_error(&error)
            } else {
                TranslationError::InvalidResponse(error.to_string())
            }
        })?;

        if body.translated_text.trim().is_empty() && !text.trim().is_empty() {
            return Err(TranslationError::InvalidResponse(
                "empty translation for non-empty input".to_string(),
            ));
        }
        Ok(body.translated_text)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
