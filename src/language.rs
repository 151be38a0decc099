//! Language tags and `lingua`-based detection.
//!
//! Detection is restricted to the languages civic submissions are expected in.
//! Short or ambiguous texts resolve to `Unknown` so that the router does not
//! send them to translation on a guess.
use std::fmt;

use lingua::{Language as LinguaLanguage, LanguageDetector, LanguageDetectorBuilder};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static DETECTOR: Lazy<LanguageDetector> = Lazy::new(|| {
    LanguageDetectorBuilder::from_languages(&[
        LinguaLanguage::Spanish,
        LinguaLanguage::English,
        LinguaLanguage::Portuguese,
        LinguaLanguage::French,
        LinguaLanguage::German,
    ])
    .with_minimum_relative_distance(0.01)
    .build()
});

/// Languages with bundled normalization resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Spanish,
    English,
    Portuguese,
    French,
    German,
    Unknown,
}

impl Language {
    /// Parses an ISO 639-1 code or a common locale tag (`es-PY`, `en_US`).
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        let lowered = code.trim().to_lowercase();
        let primary = lowered
            .split(['-', '_'])
            .next()
            .unwrap_or_default();
        match primary {
            "es" | "spa" | "spanish" => Self::Spanish,
            "en" | "eng" | "english" => Self::English,
            "pt" | "por" | "portuguese" => Self::Portuguese,
            "fr" | "fra" | "fre" | "french" => Self::French,
            "de" | "deu" | "ger" | "german" => Self::German,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Spanish => "es",
            Self::English => "en",
            Self::Portuguese => "pt",
            Self::French => "fr",
            Self::German => "de",
            Self::Unknown => "und",
        }
    }

    fn from_lingua(language: LinguaLanguage) -> Self {
        match language {
            LinguaLanguage::Spanish => Self::Spanish,
            LinguaLanguage::English => Self::English,
            LinguaLanguage::Portuguese => Self::Portuguese,
            LinguaLanguage::French => Self::French,
            LinguaLanguage::German => Self::German,
            #[allow(unreachable_patterns)]
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Thresholds applied before a detection result is trusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
    /// Texts with fewer characters resolve to `Unknown`.
    pub min_chars: usize,
    /// Detections below this confidence resolve to `Unknown`.
    pub min_confidence: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_chars: 20,
            min_confidence: 0.5,
        }
    }
}

/// Detects the language of `text`.
///
/// Returns `(Unknown, 0.0)` when the text is too short, and `(Unknown, c)`
/// when the best candidate's confidence `c` is below the configured minimum.
#[must_use]
pub fn detect(text: &str, config: &DetectionConfig) -> (Language, f64) {
    if text.chars().filter(|c| !c.is_whitespace()).count() < config.min_chars {
        return (Language::Unknown, 0.0);
    }

    let Some(detected) = DETECTOR.detect_language_of(text) else {
        return (Language::Unknown, 0.0);
    };

    let confidence = DETECTOR
        .compute_language_confidence_values(text)
        .iter()
        .find(|(language, _)| *language == detected)
        .map_or(0.0, |(_, value)| *value);

    if confidence < config.min_confidence {
        return (Language::Unknown, confidence);
    }

    (Language::from_lingua(detected), confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("es", Language::Spanish)]
    #[case("es-PY", Language::Spanish)]
    #[case("EN_us", Language::English)]
    #[case("pt", Language::Portuguese)]
    #[case("gn", Language::Unknown)]
    #[case("", Language::Unknown)]
    fn from_code_accepts_locale_tags(#[case] code: &str, #[case] expected: Language) {
        assert_eq!(Language::from_code(code), expected);
    }

    #[test]
    fn detects_spanish() {
        let text = "La municipalidad debería mejorar el servicio de recolección de basura en nuestro barrio.";
        let (language, confidence) = detect(text, &DetectionConfig::default());
        assert_eq!(language, Language::Spanish);
        assert!(confidence >= DetectionConfig::default().min_confidence);
    }

    #[test]
    fn detects_english() {
        let text = "The city council should improve garbage collection in our neighbourhood as soon as possible.";
        let (language, _) = detect(text, &DetectionConfig::default());
        assert_eq!(language, Language::English);
    }

    #[test]
    fn short_text_is_unknown() {
        let (language, confidence) = detect("hola", &DetectionConfig::default());
        assert_eq!(language, Language::Unknown);
        assert!(confidence.abs() < f64::EPSILON);
    }
}
