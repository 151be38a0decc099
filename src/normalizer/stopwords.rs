//! Bundled stop-word lists.
use crate::language::Language;

const SPANISH: &str = include_str!("../../resources/stopwords/es.txt");
const ENGLISH: &str = include_str!("../../resources/stopwords/en.txt");
const PORTUGUESE: &str = include_str!("../../resources/stopwords/pt.txt");

/// Bundled stop words for `language`; empty for languages without a list.
#[must_use]
pub fn bundled(language: Language) -> Vec<&'static str> {
    let raw = match language {
        Language::Spanish => SPANISH,
        Language::English => ENGLISH,
        Language::Portuguese => PORTUGUESE,
        Language::French | Language::German | Language::Unknown => "",
    };
    parse(raw)
}

fn parse(raw: &str) -> Vec<&str> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect()
}
