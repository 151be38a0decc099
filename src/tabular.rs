//! CSV ingestion of documents and emission of predictions.
//!
//! Input files carry a header row naming at least `id` and `text`, plus the
//! optional `declared_language` (or `language`) and `label` columns. Cells
//! that are not valid UTF-8 are decoded lossily; the normalizer later reports
//! such documents as malformed instead of the whole file failing to load.
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder, Trim, WriterBuilder};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::pipeline::{Document, DocumentFailure, Prediction};

/// Documents read from a CSV file, with their labels when the file has a
/// `label` column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    pub documents: Vec<Document>,
    pub labels: Option<Vec<String>>,
}

impl Table {
    /// Labels for training.
    ///
    /// # Errors
    /// [`PipelineError::Tabular`] when the file had no `label` column.
    pub fn require_labels(&self) -> Result<&[String]> {
        self.labels
            .as_deref()
            .ok_or_else(|| PipelineError::Tabular("input has no label column".to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    id: usize,
    text: usize,
    language: Option<usize>,
    label: Option<usize>,
}

impl Columns {
    fn locate(header: &ByteRecord) -> Result<Self> {
        let position = |names: &[&str]| {
            header.iter().position(|cell| {
                let cell = String::from_utf8_lossy(cell).trim().to_lowercase();
                names.contains(&cell.as_str())
            })
        };
        let id = position(&["id"])
            .ok_or_else(|| PipelineError::Tabular("missing required column: id".to_string()))?;
        let text = position(&["text"])
            .ok_or_else(|| PipelineError::Tabular("missing required column: text".to_string()))?;
        Ok(Self {
            id,
            text,
            language: position(&["declared_language", "language", "lang"]),
            label: position(&["label"]),
        })
    }
}

fn cell(record: &ByteRecord, index: usize) -> String {
    record
        .get(index)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default()
}

/// Reads documents from CSV.
///
/// # Errors
/// [`PipelineError::Tabular`] on malformed CSV, a missing `id`/`text` header,
/// or a row without a label in a labelled file.
pub fn read_documents<R: Read>(reader: R) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(reader);
    let header = reader
        .byte_headers()
        .map_err(|error| PipelineError::Tabular(error.to_string()))?
        .clone();
    let columns = Columns::locate(&header)?;

    let mut table = Table {
        documents: Vec::new(),
        labels: columns.label.map(|_| Vec::new()),
    };
    let mut record = ByteRecord::new();
    loop {
        let more = reader
            .read_byte_record(&mut record)
            .map_err(|error| PipelineError::Tabular(error.to_string()))?;
        if !more {
            break;
        }
        let line = record.position().map_or(0, csv::Position::line);

        let language = columns
            .language
            .map(|index| cell(&record, index).trim().to_string())
            .filter(|code| !code.is_empty());
        let mut document = Document::new(cell(&record, columns.id).trim(), cell(&record, columns.text));
        document.declared_language = language;

        if let (Some(index), Some(labels)) = (columns.label, table.labels.as_mut()) {
            let label = cell(&record, index).trim().to_string();
            if label.is_empty() {
                return Err(PipelineError::Tabular(format!(
                    "line {line}: document {:?} has no label",
                    document.id
                )));
            }
            labels.push(label);
        }
        table.documents.push(document);
    }
    Ok(table)
}

/// Reads documents from a CSV file.
///
/// # Errors
/// See [`read_documents`]; I/O failures are reported as
/// [`PipelineError::Tabular`] too.
pub fn read_documents_from_path(path: &Path) -> Result<Table> {
    let file = File::open(path)
        .map_err(|error| PipelineError::Tabular(format!("{}: {error}", path.display())))?;
    let table = read_documents(file)?;
    info!(
        path = %path.display(),
        documents = table.documents.len(),
        labelled = table.labels.is_some(),
        "documents loaded"
    );
    Ok(table)
}

/// Writes `id,label,confidence,raw_lexicon_score` rows.
///
/// # Errors
/// [`PipelineError::Tabular`] when writing fails.
pub fn write_predictions<W: Write>(writer: W, predictions: &[Prediction]) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    let tabular = |error: csv::Error| PipelineError::Tabular(error.to_string());
    writer
        .write_record(["id", "label", "confidence", "raw_lexicon_score"])
        .map_err(tabular)?;
    for prediction in predictions {
        let confidence = format!("{:.4}", prediction.confidence);
        let raw_score = format!("{:.4}", prediction.raw_lexicon_score);
        writer
            .write_record([
                prediction.id.as_str(),
                prediction.label.as_str(),
                confidence.as_str(),
                raw_score.as_str(),
            ])
            .map_err(tabular)?;
    }
    writer
        .flush()
        .map_err(|error| PipelineError::Tabular(error.to_string()))
}

/// Writes `id,reason` rows.
///
/// # Errors
/// [`PipelineError::Tabular`] when writing fails.
pub fn write_failures<W: Write>(writer: W, failures: &[DocumentFailure]) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    let tabular = |error: csv::Error| PipelineError::Tabular(error.to_string());
    writer.write_record(["id", "reason"]).map_err(tabular)?;
    for failure in failures {
        writer
            .write_record([failure.id.as_str(), failure.reason.as_str()])
            .map_err(tabular)?;
    }
    writer
        .flush()
        .map_err(|error| PipelineError::Tabular(error.to_string()))
}

/// Creates `path` and writes predictions to it.
///
/// # Errors
/// [`PipelineError::Tabular`] when the file cannot be created or written.
pub fn write_predictions_to_path(path: &Path, predictions: &[Prediction]) -> Result<()> {
    let file = File::create(path)
        .map_err(|error| PipelineError::Tabular(format!("{}: {error}", path.display())))?;
    write_predictions(file, predictions)
}

/// Creates `path` and writes failures to it.
///
/// # Errors
/// [`PipelineError::Tabular`] when the file cannot be created or written.
pub fn write_failures_to_path(path: &Path, failures: &[DocumentFailure]) -> Result<()> {
    let file = File::create(path)
        .map_err(|error| PipelineError::Tabular(format!("{}: {error}", path.display())))?;
    write_failures(file, failures)
}
