/// Throughput of the CPU stages on synthetic Spanish submissions.
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use cca_core::features::{FeatureConfig, FeatureExtractor};
use cca_core::lexicon::{Lexicon, LexiconScorer};
use cca_core::normalizer::{NormalizerConfig, TextNormalizer};
use cca_core::pipeline::{Document, Pipeline};

const PHRASES: &[&str] = &[
    "La calle está sucia y nunca pasa el camión de basura",
    "Excelente servicio de recolección, gracias",
    "Baches por todas partes y nadie los arregla",
    "El parque nuevo está limpio y es muy seguro",
    "El colectivo llega tarde, pésimo servicio",
    "Las luces de la plaza no funcionan desde hace semanas",
];

fn synthetic_texts(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            format!(
                "{} {} (barrio {})",
                PHRASES[i % PHRASES.len()],
                PHRASES[(i * 7 + 3) % PHRASES.len()],
                i % 37
            )
        })
        .collect()
}

fn bench_normalize(c: &mut Criterion) {
    let normalizer = TextNormalizer::new(NormalizerConfig::default());
    let texts = synthetic_texts(1024);
    c.bench_function("normalize_1k", |b| {
        b.iter(|| {
            let tokens: usize = texts.iter().map(|text| normalizer.normalize(text).len()).sum();
            black_box(tokens);
        });
    });
}

fn bench_lexicon_and_features(c: &mut Criterion) {
    let normalizer = TextNormalizer::new(NormalizerConfig::default());
    let lexicon = Lexicon::bundled(normalizer.language()).expect("bundled lexicon");
    let scorer = LexiconScorer::new(&lexicon, &normalizer).expect("scorer");
    let corpus: Vec<Vec<String>> = synthetic_texts(1024)
        .iter()
        .map(|text| normalizer.normalize(text))
        .collect();
    let extractor = FeatureExtractor::new(FeatureConfig::default());
    let vocabulary = extractor.fit(&corpus);

    c.bench_function("lexicon_score_1k", |b| {
        b.iter(|| {
            let total: f32 = corpus.iter().map(|tokens| scorer.score(tokens).raw_score).sum();
            black_box(total);
        });
    });
    c.bench_function("tfidf_transform_1k", |b| {
        b.iter(|| {
            let vectors: Vec<_> = corpus.iter().map(|tokens| vocabulary.transform(tokens)).collect();
            black_box(vectors.len());
        });
    });
}

fn bench_predict_batch(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let texts = synthetic_texts(512);
    let documents: Vec<Document> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| Document::new(i.to_string(), text.as_str()).with_language("es"))
        .collect();
    let labels: Vec<String> = texts
        .iter()
        .map(|text| {
            if text.starts_with("Excelente") || text.starts_with("El parque") {
                "positivo".to_string()
            } else {
                "negativo".to_string()
            }
        })
        .collect();
    let mut pipeline = Pipeline::builder().build().expect("pipeline");
    runtime
        .block_on(pipeline.fit(&documents, &labels))
        .expect("fit");

    c.bench_function("predict_batch_512", |b| {
        b.iter(|| {
            let report = runtime.block_on(pipeline.predict(&documents)).expect("predict");
            black_box(report.predictions.len());
        });
    });
}

criterion_group!(
    benches,
    bench_normalize,
    bench_lexicon_and_features,
    bench_predict_batch
);
criterion_main!(benches);
