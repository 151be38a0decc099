//! Bag-of-words feature extraction over normalized tokens.
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// How term counts are turned into feature values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Raw term counts.
    TermFrequency,
    /// Count times smoothed IDF, L2-normalized.
    #[default]
    TfIdf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureConfig {
    /// Terms appearing in fewer documents are not part of the vocabulary.
    pub min_df: usize,
    /// Vocabulary cap; the most frequent terms (by document frequency) win.
    pub max_features: Option<usize>,
    pub weighting: Weighting,
    /// Add adjacent token pairs as extra terms.
    pub bigrams: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            min_df: 1,
            max_features: Some(20_000),
            weighting: Weighting::TfIdf,
            bigrams: false,
        }
    }
}

/// Dense feature vector aligned with a [`Vocabulary`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureVector {
    pub values: Vec<f32>,
}

impl FeatureVector {
    #[must_use]
    pub fn zeros(dim: usize) -> Self {
        Self {
            values: vec![0.0; dim],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// True when no vocabulary term was present in the document.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|value| *value == 0.0)
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// Serialized form of a [`Vocabulary`]; the lookup index is rebuilt on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VocabularySnapshot {
    terms: Vec<String>,
    idf: Vec<f32>,
    weighting: Weighting,
    bigrams: bool,
}

/// Fitted term space. Immutable once built: transforming a document never
/// adds terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "VocabularySnapshot", into = "VocabularySnapshot")]
pub struct Vocabulary {
    terms: Vec<String>,
    idf: Vec<f32>,
    weighting: Weighting,
    bigrams: bool,
    index: FxHashMap<String, usize>,
}

impl PartialEq for Vocabulary {
    fn eq(&self, other: &Self) -> bool {
        self.terms == other.terms
            && self.idf == other.idf
            && self.weighting == other.weighting
            && self.bigrams == other.bigrams
    }
}

impl TryFrom<VocabularySnapshot> for Vocabulary {
    type Error = String;

    fn try_from(snapshot: VocabularySnapshot) -> Result<Self, Self::Error> {
        if snapshot.terms.len() != snapshot.idf.len() {
            return Err(format!(
                "vocabulary has {} terms but {} idf values",
                snapshot.terms.len(),
                snapshot.idf.len()
            ));
        }
        if let Some(value) = snapshot.idf.iter().find(|value| !value.is_finite()) {
            return Err(format!("non-finite idf value {value}"));
        }
        let index = build_index(&snapshot.terms);
        if index.len() != snapshot.terms.len() {
            return Err("vocabulary contains duplicate terms".to_string());
        }
        Ok(Self {
            terms: snapshot.terms,
            idf: snapshot.idf,
            weighting: snapshot.weighting,
            bigrams: snapshot.bigrams,
            index,
        })
    }
}

impl From<Vocabulary> for VocabularySnapshot {
    fn from(vocabulary: Vocabulary) -> Self {
        Self {
            terms: vocabulary.terms,
            idf: vocabulary.idf,
            weighting: vocabulary.weighting,
            bigrams: vocabulary.bigrams,
        }
    }
}

impl Vocabulary {
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    #[must_use]
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    #[must_use]
    pub fn idf(&self) -> &[f32] {
        &self.idf
    }

    #[must_use]
    pub fn weighting(&self) -> Weighting {
        self.weighting
    }

    #[must_use]
    pub fn index_of(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }

    /// Maps tokens onto this vocabulary. Unknown terms are dropped.
    #[must_use]
    pub fn transform(&self, tokens: &[String]) -> FeatureVector {
        let mut values = vec![0.0f32; self.terms.len()];
        for term in expand_terms(tokens, self.bigrams) {
            if let Some(&index) = self.index.get(&*term) {
                values[index] += 1.0;
            }
        }

        if self.weighting == Weighting::TfIdf {
            for (value, idf) in values.iter_mut().zip(&self.idf) {
                *value *= idf;
            }
            let norm = values.iter().map(|value| value * value).sum::<f32>().sqrt();
            if norm > 0.0 {
                for value in &mut values {
                    *value /= norm;
                }
            }
        }

        FeatureVector { values }
    }
}

/// Builds vocabularies and feature vectors.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    #[must_use]
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Builds the vocabulary from a tokenized corpus.
    ///
    /// Terms are ordered by descending document frequency, then
    /// lexicographically, so the same corpus always yields the same indices.
    #[must_use]
    pub fn fit(&self, corpus: &[Vec<String>]) -> Vocabulary {
        let mut doc_freq: FxHashMap<String, usize> = FxHashMap::default();
        for tokens in corpus {
            let unique: FxHashSet<String> = expand_terms(tokens, self.config.bigrams)
                .map(std::borrow::Cow::into_owned)
                .collect();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }
        let unique_terms = doc_freq.len();

        let mut ranked: Vec<(String, usize)> = doc_freq
            .into_iter()
            .filter(|(_, df)| *df >= self.config.min_df)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(limit) = self.config.max_features {
            ranked.truncate(limit);
        }

        #[allow(clippy::cast_precision_loss)]
        let total_docs = corpus.len() as f32;
        let (terms, idf): (Vec<String>, Vec<f32>) = ranked
            .into_iter()
            .map(|(term, df)| {
                #[allow(clippy::cast_precision_loss)]
                let df = df as f32;
                (term, ((total_docs + 1.0) / (df + 1.0)).ln() + 1.0)
            })
            .unzip();

        tracing::info!(
            total_docs = corpus.len(),
            unique_terms,
            vocabulary_size = terms.len(),
            "feature vocabulary fitted"
        );

        let index = build_index(&terms);
        Vocabulary {
            terms,
            idf,
            weighting: self.config.weighting,
            bigrams: self.config.bigrams,
            index,
        }
    }

    /// Maps tokens onto `vocabulary`. Unknown terms are dropped.
    #[must_use]
    pub fn transform(&self, tokens: &[String], vocabulary: &Vocabulary) -> FeatureVector {
        vocabulary.transform(tokens)
    }
}

fn build_index(terms: &[String]) -> FxHashMap<String, usize> {
    terms
        .iter()
        .enumerate()
        .map(|(index, term)| (term.clone(), index))
        .collect()
}

fn expand_terms(
    tokens: &[String],
    bigrams: bool,
) -> impl Iterator<Item = std::borrow::Cow<'_, str>> {
    let unigrams = tokens.iter().map(|token| std::borrow::Cow::Borrowed(token.as_str()));
    let pairs = tokens
        .windows(2)
        .filter(move |_| bigrams)
        .map(|pair| std::borrow::Cow::Owned(format!("{} {}", pair[0], pair[1])));
    unigrams.chain(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(words: &str) -> Vec<String> {
        words.split_whitespace().map(ToString::to_string).collect()
    }

    fn corpus() -> Vec<Vec<String>> {
        vec![
            doc("bus late again"),
            doc("bus clean"),
            doc("park clean nice"),
        ]
    }

    fn tf_only() -> FeatureExtractor {
        FeatureExtractor::new(FeatureConfig {
            weighting: Weighting::TermFrequency,
            ..FeatureConfig::default()
        })
    }

    #[test]
    fn fit_orders_by_document_frequency_then_term() {
        let vocabulary = tf_only().fit(&corpus());
        assert_eq!(
            vocabulary.terms(),
            &["bus", "clean", "again", "late", "nice", "park"]
        );
    }

    #[test]
    fn fit_uses_smoothed_idf() {
        let vocabulary = tf_only().fit(&corpus());
        let bus = vocabulary.index_of("bus").expect("bus in vocabulary");
        let expected = (4.0f32 / 3.0).ln() + 1.0;
        assert!((vocabulary.idf()[bus] - expected).abs() < 1e-6);
    }

    #[test]
    fn min_df_and_max_features_limit_the_vocabulary() {
        let extractor = FeatureExtractor::new(FeatureConfig {
            min_df: 2,
            max_features: Some(1),
            ..FeatureConfig::default()
        });
        let vocabulary = extractor.fit(&corpus());
        assert_eq!(vocabulary.terms(), &["bus"]);
    }

    #[test]
    fn transform_counts_and_drops_unknown_terms() {
        let extractor = tf_only();
        let vocabulary = extractor.fit(&corpus());
        let vector = extractor.transform(&doc("bus bus metro"), &vocabulary);
        assert_eq!(vector.len(), vocabulary.len());
        assert!((vector.values[0] - 2.0).abs() < f32::EPSILON);
        assert!((vector.values.iter().sum::<f32>() - 2.0).abs() < f32::EPSILON);
        assert_eq!(vocabulary.len(), 6);
    }

    #[test]
    fn tfidf_vectors_are_unit_length() {
        let extractor = FeatureExtractor::default();
        let vocabulary = extractor.fit(&corpus());
        let vector = extractor.transform(&doc("park clean late"), &vocabulary);
        let norm = vector.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_document_maps_to_zero_vector() {
        let extractor = FeatureExtractor::default();
        let vocabulary = extractor.fit(&corpus());
        let vector = extractor.transform(&[], &vocabulary);
        assert_eq!(vector.len(), vocabulary.len());
        assert!(vector.is_zero());
    }

    #[test]
    fn bigrams_extend_the_vocabulary() {
        let extractor = FeatureExtractor::new(FeatureConfig {
            bigrams: true,
            ..FeatureConfig::default()
        });
        let vocabulary = extractor.fit(&[doc("not working"), doc("working fine")]);
        assert!(vocabulary.index_of("not working").is_some());
        assert!(vocabulary.index_of("working").is_some());
    }

    #[test]
    fn vocabulary_survives_serialization() {
        let vocabulary = FeatureExtractor::default().fit(&corpus());
        let json = serde_json::to_string(&vocabulary).expect("serialize");
        let restored: Vocabulary = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, vocabulary);
        assert_eq!(restored.index_of("park"), vocabulary.index_of("park"));
    }

    #[test]
    fn mismatched_snapshot_is_rejected() {
        let json = r#"{"terms":["a","b"],"idf":[1.0],"weighting":"tf_idf","bigrams":false}"#;
        assert!(serde_json::from_str::<Vocabulary>(json).is_err());
    }
}
