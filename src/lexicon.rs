//! Curated polarity/category lexicons.
//!
//! Entries are validated when loaded so that a malformed resource fails the
//! pipeline at construction instead of surfacing as a wrong score later.
pub mod scorer;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::LexiconLoadError;
use crate::language::Language;

pub use scorer::{LexiconScore, LexiconScorer};

const SPANISH: &str = include_str!("../resources/lexicon/es.tsv");
const ENGLISH: &str = include_str!("../resources/lexicon/en.tsv");

/// One row of a lexicon resource.
#[derive(Debug, Clone, PartialEq)]
pub struct LexiconEntry {
    /// Term or space-separated n-gram, as written in the resource.
    pub term: String,
    pub weight: f32,
    pub category: Option<String>,
}

/// Read-only term table. Shared behind `Arc` once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexicon {
    name: String,
    entries: Vec<LexiconEntry>,
}

impl Lexicon {
    /// Bundled lexicon for `language`.
    ///
    /// # Errors
    /// Fails with [`LexiconLoadError::UnknownLanguage`] when no lexicon ships
    /// for the language.
    pub fn bundled(language: Language) -> Result<Self, LexiconLoadError> {
        let raw = match language {
            Language::Spanish => SPANISH,
            Language::English => ENGLISH,
            other => return Err(LexiconLoadError::UnknownLanguage(other.code().to_string())),
        };
        Self::from_reader(format!("bundled:{}", language.code()), raw.as_bytes(), b'\t')
    }

    /// Loads a lexicon file. `.csv` files are comma separated, anything else
    /// is read as tab separated.
    ///
    /// # Errors
    /// Returns [`LexiconLoadError`] when the file cannot be read or contains a
    /// malformed entry.
    pub fn from_path(path: &Path) -> Result<Self, LexiconLoadError> {
        let file = File::open(path).map_err(|source| LexiconLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let delimiter = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => b',',
            _ => b'\t',
        };
        Self::from_reader(path.display().to_string(), file, delimiter)
    }

    /// Parses `term, weight[, category]` rows. Lines starting with `#` are
    /// comments and a leading `term,weight` header is skipped.
    ///
    /// # Errors
    /// Returns [`LexiconLoadError::Parse`] for missing columns, empty terms or
    /// non-finite weights, and [`LexiconLoadError::Empty`] when no entry is found.
    pub fn from_reader<R: Read>(
        name: impl Into<String>,
        reader: R,
        delimiter: u8,
    ) -> Result<Self, LexiconLoadError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|error| LexiconLoadError::Parse {
                line: error
                    .position()
                    .map_or(index + 1, |position| line_number(position.line())),
                reason: error.to_string(),
            })?;
            let line = record
                .position()
                .map_or(index + 1, |position| line_number(position.line()));

            if record.iter().all(str::is_empty) {
                continue;
            }
            let term = record.get(0).unwrap_or_default();
            let raw_weight = record.get(1).ok_or_else(|| LexiconLoadError::Parse {
                line,
                reason: "missing weight column".to_string(),
            })?;
            if entries.is_empty()
                && term.eq_ignore_ascii_case("term")
                && raw_weight.eq_ignore_ascii_case("weight")
            {
                continue;
            }

            let category = record
                .get(2)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string);
            entries.push(parse_entry(line, term, raw_weight, category)?);
        }

        Self::from_entries(name, entries)
    }

    /// Builds a lexicon from already parsed entries.
    ///
    /// # Errors
    /// Returns [`LexiconLoadError`] when an entry has an empty term or a
    /// non-finite weight, or when `entries` is empty.
    pub fn from_entries(
        name: impl Into<String>,
        entries: Vec<LexiconEntry>,
    ) -> Result<Self, LexiconLoadError> {
        for (index, entry) in entries.iter().enumerate() {
            if entry.term.trim().is_empty() {
                return Err(LexiconLoadError::Parse {
                    line: index + 1,
                    reason: "empty term".to_string(),
                });
            }
            if !entry.weight.is_finite() {
                return Err(LexiconLoadError::Parse {
                    line: index + 1,
                    reason: format!("non-finite weight for {:?}", entry.term),
                });
            }
        }
        if entries.is_empty() {
            return Err(LexiconLoadError::Empty);
        }
        Ok(Self {
            name: name.into(),
            entries,
        })
    }

    /// Convenience constructor for `(term, weight)` pairs without categories.
    ///
    /// # Errors
    /// See [`from_entries`](Self::from_entries).
    pub fn from_weights<'a>(
        name: impl Into<String>,
        weights: impl IntoIterator<Item = (&'a str, f32)>,
    ) -> Result<Self, LexiconLoadError> {
        let entries = weights
            .into_iter()
            .map(|(term, weight)| LexiconEntry {
                term: term.to_string(),
                weight,
                category: None,
            })
            .collect();
        Self::from_entries(name, entries)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn entries(&self) -> &[LexiconEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_entry(
    line: usize,
    term: &str,
    raw_weight: &str,
    category: Option<String>,
) -> Result<LexiconEntry, LexiconLoadError> {
    if term.is_empty() {
        return Err(LexiconLoadError::Parse {
            line,
            reason: "empty term".to_string(),
        });
    }
    let weight = raw_weight
        .parse::<f32>()
        .map_err(|error| LexiconLoadError::Parse {
            line,
            reason: format!("invalid weight {raw_weight:?}: {error}"),
        })?;
    if !weight.is_finite() {
        return Err(LexiconLoadError::Parse {
            line,
            reason: format!("non-finite weight {raw_weight:?}"),
        });
    }
    Ok(LexiconEntry {
        term: term.to_string(),
        weight,
        category,
    })
}

fn line_number(line: u64) -> usize {
    usize::try_from(line).unwrap_or(usize::MAX)
}
