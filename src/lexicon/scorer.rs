use std::collections::BTreeMap;

use aho_corasick::{AhoCorasick, MatchKind};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Lexicon;
use crate::error::LexiconLoadError;
use crate::normalizer::TextNormalizer;

const POSITIVE_BUCKET: &str = "positive";
const NEGATIVE_BUCKET: &str = "negative";

/// Lexicon signal for one document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LexiconScore {
    /// Sum of matched weights divided by the token count.
    pub raw_score: f32,
    /// Per-category sums over the same denominator. Uncategorized entries are
    /// reported under `positive`/`negative` by the sign of their weight.
    pub categories: BTreeMap<String, f32>,
    pub matched: usize,
    pub token_count: usize,
}

impl LexiconScore {
    #[must_use]
    pub fn neutral() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone)]
struct ScoredTerm {
    weight: f32,
    category: Option<String>,
}

/// Scores normalized token sequences against a [`Lexicon`].
///
/// Lexicon terms are normalized with the same normalizer used for documents,
/// so `"Excelente"` in the resource matches the stemmed token stream.
#[derive(Debug, Clone)]
pub struct LexiconScorer {
    matcher: AhoCorasick,
    terms: Vec<ScoredTerm>,
    lexicon_name: String,
}

impl LexiconScorer {
    /// Builds the matcher for `lexicon`.
    ///
    /// # Errors
    /// Returns [`LexiconLoadError::Empty`] when no term survives normalization.
    pub fn new(lexicon: &Lexicon, normalizer: &TextNormalizer) -> Result<Self, LexiconLoadError> {
        let mut index: FxHashMap<String, usize> = FxHashMap::default();
        let mut keys: Vec<String> = Vec::new();
        let mut terms: Vec<ScoredTerm> = Vec::new();

        for entry in lexicon.entries() {
            let tokens = normalizer.normalize(&entry.term);
            if tokens.is_empty() {
                warn!(
                    lexicon = lexicon.name(),
                    term = %entry.term,
                    "lexicon term normalizes to nothing; skipped"
                );
                continue;
            }
            let key = tokens.join(" ");
            if let Some(&position) = index.get(&key) {
                let existing = &mut terms[position];
                debug!(lexicon = lexicon.name(), key = %key, "summing colliding lexicon entries");
                existing.weight += entry.weight;
                if existing.category.is_none() {
                    existing.category.clone_from(&entry.category);
                }
                continue;
            }
            index.insert(key.clone(), terms.len());
            keys.push(key);
            terms.push(ScoredTerm {
                weight: entry.weight,
                category: entry.category.clone(),
            });
        }

        if terms.is_empty() {
            return Err(LexiconLoadError::Empty);
        }

        let matcher = AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .build(&keys)
            .map_err(|error| LexiconLoadError::Matcher(error.to_string()))?;

        Ok(Self {
            matcher,
            terms,
            lexicon_name: lexicon.name().to_string(),
        })
    }

    #[must_use]
    pub fn lexicon_name(&self) -> &str {
        &self.lexicon_name
    }

    /// Number of distinct normalized keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Scores a normalized token sequence.
    ///
    /// At each position the longest matching term wins and consumes its
    /// tokens; the walk then continues after the match.
    #[must_use]
    pub fn score(&self, tokens: &[String]) -> LexiconScore {
        if tokens.is_empty() {
            return LexiconScore::neutral();
        }

        let haystack = tokens.join(" ");
        let mut starts = Vec::with_capacity(tokens.len());
        let mut ends = Vec::with_capacity(tokens.len());
        let mut offset = 0;
        for token in tokens {
            starts.push(offset);
            offset += token.len();
            ends.push(offset);
            offset += 1;
        }

        // Longest term starting at each token: (term id, tokens consumed).
        let mut best: Vec<Option<(usize, usize)>> = vec![None; tokens.len()];
        for found in self.matcher.find_overlapping_iter(&haystack) {
            let (Ok(first), Ok(last)) = (
                starts.binary_search(&found.start()),
                ends.binary_search(&found.end()),
            ) else {
                continue;
            };
            let term_id = found.pattern().as_usize();
            let span = last + 1 - first;
            match best[first] {
                Some((_, current)) if current >= span => {}
                _ => best[first] = Some((term_id, span)),
            }
        }

        let mut weights = Vec::new();
        let mut by_category: BTreeMap<String, Vec<f32>> = BTreeMap::new();
        let mut position = 0;
        while position < tokens.len() {
            let Some((term_id, span)) = best[position] else {
                position += 1;
                continue;
            };
            let term = &self.terms[term_id];
            weights.push(term.weight);
            let bucket = match &term.category {
                Some(category) => Some(category.as_str()),
                None if term.weight > 0.0 => Some(POSITIVE_BUCKET),
                None if term.weight < 0.0 => Some(NEGATIVE_BUCKET),
                None => None,
            };
            if let Some(bucket) = bucket {
                by_category
                    .entry(bucket.to_string())
                    .or_default()
                    .push(term.weight);
            }
            position += span;
        }

        #[allow(clippy::cast_precision_loss)]
        let denominator = tokens.len() as f32;
        let matched = weights.len();
        LexiconScore {
            raw_score: ordered_sum(weights) / denominator,
            categories: by_category
                .into_iter()
                .map(|(category, values)| (category, ordered_sum(values) / denominator))
                .collect(),
            matched,
            token_count: tokens.len(),
        }
    }
}

/// Sums in a fixed order so the result does not depend on token order.
fn ordered_sum(mut values: Vec<f32>) -> f32 {
    values.sort_by(f32::total_cmp);
    values.into_iter().sum()
}
