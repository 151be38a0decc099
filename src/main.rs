use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use cca_core::{
    config::Config,
    lexicon::Lexicon,
    observability,
    pipeline::Pipeline,
    tabular,
    translation::{HttpTranslator, PassthroughTranslator, Translator},
};

#[derive(Parser)]
#[command(name = "cca")]
#[command(about = "Classify civic input: train a model and label documents from CSV files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model from a labelled CSV file (id,text[,declared_language],label)
    Fit {
        /// Training documents
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the trained model (JSON)
        #[arg(short, long)]
        model: PathBuf,
    },

    /// Label every document of a CSV file with a trained model
    Predict {
        /// Documents to classify
        #[arg(short, long)]
        input: PathBuf,

        /// Trained model file
        #[arg(short, long)]
        model: PathBuf,

        /// Predictions CSV (id,label,confidence,raw_lexicon_score)
        #[arg(short, long)]
        output: PathBuf,

        /// Failed documents CSV (id,reason)
        #[arg(long)]
        failures: Option<PathBuf>,
    },

    /// Compare a model's predictions with the labels of a CSV file
    Evaluate {
        /// Labelled documents
        #[arg(short, long)]
        input: PathBuf,

        /// Trained model file
        #[arg(short, long)]
        model: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    observability::init(config.log_format()).context("failed to initialise tracing")?;

    let outcome = match cli.command {
        Commands::Fit { input, model } => fit(&config, &input, &model).await,
        Commands::Predict {
            input,
            model,
            output,
            failures,
        } => predict(&config, &input, &model, &output, failures.as_deref()).await,
        Commands::Evaluate { input, model } => evaluate(&config, &input, &model).await,
    };
    if let Err(error) = &outcome {
        error!(error = ?error, "command failed");
    }
    outcome
}

fn build_pipeline(config: &Config) -> anyhow::Result<Pipeline> {
    let translator: Arc<dyn Translator> = match config.translator() {
        Some(translator_config) => Arc::new(
            HttpTranslator::new(translator_config.clone())
                .context("failed to build translation client")?,
        ),
        None => Arc::new(PassthroughTranslator),
    };
    let mut builder = Pipeline::builder()
        .config(config.pipeline().clone())
        .translator(translator);
    if let Some(path) = config.lexicon_path() {
        let lexicon = Lexicon::from_path(path)
            .with_context(|| format!("failed to load lexicon {}", path.display()))?;
        builder = builder.lexicon(Arc::new(lexicon));
    }
    builder.build().context("failed to build pipeline")
}

async fn fit(config: &Config, input: &Path, model: &Path) -> anyhow::Result<()> {
    let table = tabular::read_documents_from_path(input)?;
    let labels = table.require_labels()?.to_vec();
    let mut pipeline = build_pipeline(config)?;

    let summary = pipeline
        .fit(&table.documents, &labels)
        .await
        .context("training failed")?;
    pipeline.save_model(model)?;
    info!(
        run_id = %summary.run_id,
        examples = summary.examples,
        skipped = summary.skipped.len(),
        labels = ?summary.labels,
        vocabulary = summary.vocabulary_size,
        model = %model.display(),
        "training finished"
    );
    Ok(())
}

async fn predict(
    config: &Config,
    input: &Path,
    model: &Path,
    output: &Path,
    failures: Option<&Path>,
) -> anyhow::Result<()> {
    let table = tabular::read_documents_from_path(input)?;
    let mut pipeline = build_pipeline(config)?;
    pipeline.load_model(model)?;

    let report = pipeline.predict(&table.documents).await?;
    tabular::write_predictions_to_path(output, &report.predictions)?;
    if let Some(path) = failures {
        tabular::write_failures_to_path(path, &report.failures)?;
    }
    info!(
        run_id = %report.run_id,
        predictions = report.predictions.len(),
        failures = report.failures.len(),
        warnings = report.warnings.len(),
        output = %output.display(),
        "prediction finished"
    );
    Ok(())
}

async fn evaluate(config: &Config, input: &Path, model: &Path) -> anyhow::Result<()> {
    let table = tabular::read_documents_from_path(input)?;
    let labels = table.require_labels()?;
    let mut pipeline = build_pipeline(config)?;
    pipeline.load_model(model)?;

    let report = pipeline.predict(&table.documents).await?;
    let correct = report
        .predictions
        .iter()
        .filter(|prediction| labels[prediction.index] == prediction.label)
        .count();
    #[allow(clippy::cast_precision_loss)]
    let accuracy = if table.documents.is_empty() {
        0.0
    } else {
        correct as f64 / table.documents.len() as f64
    };
    info!(
        run_id = %report.run_id,
        total = table.documents.len(),
        correct,
        failures = report.failures.len(),
        accuracy,
        "evaluation finished"
    );
    println!("accuracy: {accuracy:.4} ({correct}/{})", table.documents.len());
    Ok(())
}
