use std::{env, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::classifier::{ClassifierConfig, ClassifierKind};
use crate::features::{FeatureConfig, Weighting};
use crate::language::{DetectionConfig, Language};
use crate::normalizer::{NormalizerConfig, StemmerKind, StopWords};
use crate::observability::LogFormat;
use crate::pipeline::{CombinationRule, PipelineConfig};
use crate::router::RouterConfig;
use crate::translation::HttpTranslatorConfig;
use crate::util::retry::RetryConfig;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

/// Process configuration assembled from `CCA_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pipeline: PipelineConfig,
    translator: Option<HttpTranslatorConfig>,
    lexicon_path: Option<PathBuf>,
    log_format: LogFormat,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// Reads the configuration from the environment. Every variable is
    /// optional except the polarity labels, which become required once a
    /// lexicon-aware combination rule is selected.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when a value fails to parse or a required
    /// variable is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let language = parse_language("CCA_LANGUAGE", "es")?;
        let normalizer = NormalizerConfig {
            language,
            stop_words: if parse_bool("CCA_STOP_WORDS", true)? {
                StopWords::Bundled
            } else {
                StopWords::None
            },
            stemmer: parse_from_str::<StemmerKind>("CCA_STEMMER", "snowball")?,
            min_token_length: parse_usize("CCA_MIN_TOKEN_LENGTH", 2)?,
            strip_markup: parse_bool("CCA_STRIP_MARKUP", true)?,
            strip_accents: parse_bool("CCA_STRIP_ACCENTS", true)?,
            max_chars: parse_optional_limit("CCA_MAX_CHARS", 50_000)?,
        };

        let router = RouterConfig {
            detection: DetectionConfig {
                min_chars: parse_usize("CCA_DETECTION_MIN_CHARS", 20)?,
                min_confidence: parse_unit_f64("CCA_DETECTION_MIN_CONFIDENCE", 0.5)?,
            },
            translate: parse_bool("CCA_TRANSLATE", true)?,
            translation_timeout: parse_duration_ms("CCA_TRANSLATION_TIMEOUT_MS", 5_000)?,
            retry: RetryConfig::new(
                RetryConfig::default().max_attempts,
                parse_u64("CCA_TRANSLATION_BACKOFF_BASE_MS", 200)?,
                parse_u64("CCA_TRANSLATION_BACKOFF_CAP_MS", 2_000)?,
            ),
            max_concurrency: parse_non_zero_usize("CCA_TRANSLATION_MAX_CONCURRENCY", 8)?,
        };

        let features = FeatureConfig {
            min_df: parse_usize("CCA_MIN_DF", 1)?,
            max_features: parse_optional_limit("CCA_MAX_FEATURES", 20_000)?,
            weighting: parse_weighting("CCA_WEIGHTING", "tfidf")?,
            bigrams: parse_bool("CCA_BIGRAMS", false)?,
        };

        let classifier = ClassifierConfig {
            kind: parse_from_str::<ClassifierKind>("CCA_CLASSIFIER", "naive_bayes")?,
            alpha: parse_positive_f64("CCA_NB_ALPHA", 1.0)?,
            margin_scale: parse_positive_f64("CCA_CENTROID_MARGIN_SCALE", 10.0)?,
        };

        let combination = parse_combination()?;

        let translator = match env::var("CCA_TRANSLATOR_URL") {
            Ok(base_url) if !base_url.trim().is_empty() => Some(HttpTranslatorConfig {
                base_url: base_url.trim().to_string(),
                api_key: env::var("CCA_TRANSLATOR_API_KEY")
                    .ok()
                    .filter(|key| !key.is_empty()),
                connect_timeout: parse_duration_ms("CCA_TRANSLATOR_CONNECT_TIMEOUT_MS", 2_000)?,
                request_timeout: parse_duration_ms("CCA_TRANSLATOR_REQUEST_TIMEOUT_MS", 10_000)?,
            }),
            _ => None,
        };

        Ok(Self {
            pipeline: PipelineConfig {
                normalizer,
                router,
                features,
                classifier,
                combination,
                cache_normalized: parse_bool("CCA_CACHE_NORMALIZED", false)?,
                cache_capacity: parse_usize("CCA_CACHE_CAPACITY", 10_000)?,
            },
            translator,
            lexicon_path: env::var("CCA_LEXICON_PATH")
                .ok()
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
            log_format: parse_from_str::<LogFormat>("CCA_LOG_FORMAT", "json")?,
        })
    }

    #[must_use]
    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    /// HTTP translator settings; `None` when `CCA_TRANSLATOR_URL` is unset and
    /// texts pass through untranslated.
    #[must_use]
    pub fn translator(&self) -> Option<&HttpTranslatorConfig> {
        self.translator.as_ref()
    }

    /// Lexicon file overriding the bundled one.
    #[must_use]
    pub fn lexicon_path(&self) -> Option<&PathBuf> {
        self.lexicon_path.as_ref()
    }

    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

#[allow(clippy::cast_possible_truncation)]
fn parse_combination() -> Result<CombinationRule, ConfigError> {
    const NAME: &str = "CCA_COMBINATION";
    let raw = env::var(NAME).unwrap_or_else(|_| "classifier_only".to_string());
    match raw.trim().to_lowercase().replace('-', "_").as_str() {
        "classifier_only" | "classifier" => Ok(CombinationRule::ClassifierOnly),
        "lexicon_override" | "override" => Ok(CombinationRule::LexiconOverride {
            min_abs_score: parse_positive_f64("CCA_LEXICON_OVERRIDE_THRESHOLD", 0.5)? as f32,
            positive_label: env_var("CCA_POSITIVE_LABEL")?,
            negative_label: env_var("CCA_NEGATIVE_LABEL")?,
        }),
        "blend" => Ok(CombinationRule::Blend {
            lexicon_weight: parse_unit_f64("CCA_LEXICON_WEIGHT", 0.3)? as f32,
            positive_label: env_var("CCA_POSITIVE_LABEL")?,
            negative_label: env_var("CCA_NEGATIVE_LABEL")?,
        }),
        other => Err(ConfigError::Invalid {
            name: NAME,
            source: anyhow::anyhow!("unknown combination rule: {other}"),
        }),
    }
}

fn parse_language(name: &'static str, default: &str) -> Result<Language, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match Language::from_code(&raw) {
        Language::Unknown => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("unsupported language code: {raw}"),
        }),
        language => Ok(language),
    }
}

fn parse_weighting(name: &'static str, default: &str) -> Result<Weighting, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.trim().to_lowercase().replace('-', "_").as_str() {
        "tf" | "term_frequency" => Ok(Weighting::TermFrequency),
        "tfidf" | "tf_idf" => Ok(Weighting::TfIdf),
        other => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("unknown weighting: {other}"),
        }),
    }
}

fn parse_from_str<T>(name: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = String>,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::anyhow!(error),
    })
}

fn parse_non_zero_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let value = parse_usize(name, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("value must be greater than zero"),
        });
    }
    Ok(value)
}

/// `0` disables the limit.
fn parse_optional_limit(name: &'static str, default: usize) -> Result<Option<usize>, ConfigError> {
    let value = parse_usize(name, default)?;
    Ok((value > 0).then_some(value))
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(parse_u64(name, default_ms)?))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<f64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_positive_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let value = parse_f64(name, default)?;
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("value must be a positive number, got {value}"),
        });
    }
    Ok(value)
}

fn parse_unit_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let value = parse_f64(name, default)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("value must be within 0.0..=1.0, got {value}"),
        });
    }
    Ok(value)
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid boolean value: {raw}"),
        }),
    }
}
