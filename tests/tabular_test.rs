use std::path::Path;

use cca_core::pipeline::Pipeline;
use cca_core::tabular;

fn data(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

#[tokio::test]
async fn csv_fit_predict_round_trip() {
    let training = tabular::read_documents_from_path(&data("train.csv")).expect("train.csv");
    let labels = training.require_labels().expect("labels").to_vec();
    assert_eq!(training.documents.len(), 10);

    let mut pipeline = Pipeline::builder().build().expect("pipeline");
    pipeline
        .fit(&training.documents, &labels)
        .await
        .expect("fit");

    let input = tabular::read_documents_from_path(&data("documents.csv")).expect("documents.csv");
    assert!(input.labels.is_none());
    let report = pipeline.predict(&input.documents).await.expect("predict");
    assert_eq!(report.predictions.len(), 4);
    assert_eq!(report.prediction_for("b").expect("b").label, "negativo");

    let dir = tempfile::tempdir().expect("tempdir");
    let output = dir.path().join("predictions.csv");
    tabular::write_predictions_to_path(&output, &report.predictions).expect("write");
    let failures = dir.path().join("failures.csv");
    tabular::write_failures_to_path(&failures, &report.failures).expect("write");

    let written = std::fs::read_to_string(&output).expect("read back");
    let mut lines = written.lines();
    assert_eq!(
        lines.next(),
        Some("id,label,confidence,raw_lexicon_score")
    );
    let ids: Vec<&str> = lines
        .map(|line| line.split(',').next().unwrap_or_default())
        .collect();
    assert_eq!(ids, ["a", "b", "c", "d"]);
    assert_eq!(
        std::fs::read_to_string(&failures).expect("read back"),
        "id,reason\n"
    );
}

#[test]
fn missing_file_is_a_tabular_error() {
    let error = tabular::read_documents_from_path(Path::new("/nonexistent/input.csv"))
        .expect_err("missing file");
    assert!(matches!(error, cca_core::PipelineError::Tabular(_)));
}
