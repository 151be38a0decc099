//! Text normalization: markup stripping, tokenization, stop words and stemming.
pub mod stopwords;

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use rustc_hash::FxHashSet;
use thiserror::Error;
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};
use unicode_segmentation::UnicodeSegmentation;

use crate::language::Language;

static URL_OR_MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:https?://|www\.)\S+|@\w+").expect("compile url/mention pattern")
});

/// Root-form reduction applied to every surviving token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StemmerKind {
    /// Tokens are kept as written (after lowercasing).
    None,
    /// Cheap plural/gerund suffix stripping.
    Light,
    /// Snowball stemmer for the normalizer's language.
    Snowball,
}

impl FromStr for StemmerKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "light" => Ok(Self::Light),
            "snowball" | "porter" => Ok(Self::Snowball),
            other => Err(format!("unknown stemmer: {other}")),
        }
    }
}

/// Which tokens are discarded before stemming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopWords {
    /// The bundled list for the normalizer's language.
    Bundled,
    /// Keep every token.
    None,
    /// An explicit list.
    Custom(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizerConfig {
    pub language: Language,
    pub stop_words: StopWords,
    pub stemmer: StemmerKind,
    /// Tokens with fewer characters than this (after stemming) are dropped.
    pub min_token_length: usize,
    pub strip_markup: bool,
    /// Fold accents (`recolección` → `recoleccion`); informal submissions
    /// frequently omit them.
    pub strip_accents: bool,
    /// Longer documents are rejected as malformed by `try_normalize`.
    pub max_chars: Option<usize>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            language: Language::Spanish,
            stop_words: StopWords::Bundled,
            stemmer: StemmerKind::Snowball,
            min_token_length: 2,
            strip_markup: true,
            strip_accents: true,
            max_chars: Some(50_000),
        }
    }
}

impl NormalizerConfig {
    #[must_use]
    pub fn for_language(language: Language) -> Self {
        Self {
            language,
            ..Self::default()
        }
    }
}

/// Reasons a raw text cannot be normalized.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MalformedText {
    #[error("text contains undecodable byte sequences")]
    Undecodable,
    #[error("text contains NUL characters")]
    Nul,
    #[error("text exceeds {limit} characters")]
    TooLong { limit: usize },
}

/// Token sequence derived from one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDocument {
    pub tokens: Vec<String>,
    pub language: Language,
}

impl NormalizedDocument {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

struct SnowballAdapter {
    stemmer: Stemmer,
}

impl SnowballAdapter {
    fn new(language: Language) -> Option<Self> {
        let algorithm = match language {
            Language::Spanish => Algorithm::Spanish,
            Language::English => Algorithm::English,
            Language::Portuguese => Algorithm::Portuguese,
            Language::French => Algorithm::French,
            Language::German => Algorithm::German,
            Language::Unknown => return None,
        };
        Some(Self {
            stemmer: Stemmer::create(algorithm),
        })
    }

    fn stem(&self, token: &str) -> String {
        self.stemmer.stem(token).into_owned()
    }
}

impl fmt::Debug for SnowballAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowballAdapter").finish()
    }
}

/// Pure function of text and configuration; safe to share across threads.
#[derive(Debug)]
pub struct TextNormalizer {
    config: NormalizerConfig,
    stop_words: FxHashSet<String>,
    snowball: Option<SnowballAdapter>,
}

impl TextNormalizer {
    #[must_use]
    pub fn new(config: NormalizerConfig) -> Self {
        let raw_stop_words: Vec<String> = match &config.stop_words {
            StopWords::Bundled => stopwords::bundled(config.language)
                .into_iter()
                .map(ToString::to_string)
                .collect(),
            StopWords::None => Vec::new(),
            StopWords::Custom(words) => words.clone(),
        };
        let stop_words = raw_stop_words
            .iter()
            .map(|word| fold(word.trim(), config.strip_accents).to_lowercase())
            .filter(|word| !word.is_empty())
            .collect();
        let snowball = match config.stemmer {
            StemmerKind::Snowball => SnowballAdapter::new(config.language),
            StemmerKind::None | StemmerKind::Light => None,
        };

        Self {
            config,
            stop_words,
            snowball,
        }
    }

    #[must_use]
    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    #[must_use]
    pub fn language(&self) -> Language {
        self.config.language
    }

    /// Normalizes `raw` into tokens. Never fails: undecodable characters act
    /// as separators and empty input yields an empty sequence.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> Vec<String> {
        let stripped = if self.config.strip_markup {
            strip_markup(raw)
        } else {
            Cow::Borrowed(raw)
        };
        let without_urls = URL_OR_MENTION.replace_all(&stripped, " ");
        let lowered = fold(&without_urls, self.config.strip_accents).to_lowercase();

        lowered
            .split_word_bounds()
            .map(|piece| piece.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|piece| !piece.is_empty())
            .filter(|piece| !self.stop_words.contains(*piece))
            .map(|piece| self.stem(piece))
            .filter(|token| token.chars().count() >= self.config.min_token_length)
            .collect()
    }

    /// Like [`normalize`](Self::normalize) but rejects input that cannot be
    /// trusted to represent what the author wrote.
    ///
    /// # Errors
    /// Returns [`MalformedText`] for text carrying decoding artifacts, NUL
    /// characters, or exceeding the configured length limit.
    pub fn try_normalize(&self, raw: &str) -> Result<Vec<String>, MalformedText> {
        if raw.contains('\u{FFFD}') {
            return Err(MalformedText::Undecodable);
        }
        if raw.contains('\0') {
            return Err(MalformedText::Nul);
        }
        if let Some(limit) = self.config.max_chars
            && raw.chars().count() > limit
        {
            return Err(MalformedText::TooLong { limit });
        }
        Ok(self.normalize(raw))
    }

    /// Normalizes a document's text.
    ///
    /// # Errors
    /// See [`try_normalize`](Self::try_normalize).
    pub fn normalize_document(&self, raw: &str) -> Result<NormalizedDocument, MalformedText> {
        Ok(NormalizedDocument {
            tokens: self.try_normalize(raw)?,
            language: self.config.language,
        })
    }

    fn stem(&self, token: &str) -> String {
        match self.config.stemmer {
            StemmerKind::None => token.to_string(),
            StemmerKind::Light => light_stem(token, self.config.language),
            StemmerKind::Snowball => match &self.snowball {
                Some(adapter) => adapter.stem(token),
                None => light_stem(token, self.config.language),
            },
        }
    }
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}

fn fold(text: &str, strip_accents: bool) -> String {
    if strip_accents {
        text.nfd().filter(|c| !is_combining_mark(*c)).nfc().collect()
    } else {
        text.nfc().collect()
    }
}

/// Removes tags (and script/style bodies) and decodes entities.
fn strip_markup(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['<', '&']) {
        return Cow::Borrowed(raw);
    }
    // Separate adjacent elements so `<p>a</p><p>b</p>` does not glue words.
    let spaced = raw.replace('<', " <");
    let mut builder = ammonia::Builder::empty();
    builder.clean_content_tags(HashSet::from(["script", "style"]));
    let cleaned = builder.clean(&spaced).to_string();
    Cow::Owned(decode_entities(&cleaned))
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn light_stem(token: &str, language: Language) -> String {
    match language {
        Language::English => {
            if token.ends_with("ies") && token.len() > 4 {
                return format!("{}y", token.trim_end_matches("ies"));
            }
            if token.ends_with("ing") && token.len() > 5 {
                return token.trim_end_matches("ing").to_string();
            }
            if token.ends_with('s') && !token.ends_with("ss") && token.len() > 3 {
                return token[..token.len() - 1].to_string();
            }
            token.to_string()
        }
        Language::Spanish | Language::Portuguese => {
            if token.ends_with("es") && token.len() > 5 {
                return token[..token.len() - 2].to_string();
            }
            if token.ends_with('s') && token.len() > 3 {
                return token[..token.len() - 1].to_string();
            }
            token.to_string()
        }
        Language::French | Language::German | Language::Unknown => token.to_string(),
    }
}
