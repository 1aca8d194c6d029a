//! Batch prediction record store.
//!
//! One row per original record; the row order is the record index. Each row
//! holds a payload of the form
//! `{"predictions": [{"x","y","width","height","class","confidence"}, ...]}`.
//!
//! Payloads are parsed when a row is read, so a single malformed row only
//! fails that row (see [`RecordError::Parse`]).

use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::detect::Detection;
use crate::error::{RecordError, SourceError};

pub const PREDICTIONS_COLUMN: &str = "predictions";

/// Detections for one record row.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictionRecord {
    pub row_index: usize,
    pub detections: Vec<Detection>,
}

#[derive(Debug, Default, Deserialize)]
struct PredictionPayload {
    #[serde(default)]
    predictions: Vec<Detection>,
}

/// Parses a predictions payload. A missing `predictions` key means no detections.
pub fn parse_payload(row: usize, payload: &str) -> Result<Vec<Detection>, RecordError> {
    let parsed: PredictionPayload =
        serde_json::from_str(payload).map_err(|source| RecordError::Parse { row, source })?;
    Ok(parsed.predictions)
}

#[derive(Clone, Debug)]
enum Row {
    Raw(String),
    Parsed(Vec<Detection>),
}

/// Indexable, order-preserving store of prediction rows.
#[derive(Clone, Debug, Default)]
pub struct RecordStore {
    rows: Vec<Row>,
}

impl RecordStore {
    /// Opens a store from disk. `.jsonl`/`.ndjson` files are read as JSON
    /// Lines; anything else as CSV with a `predictions` column.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let reference = path.display().to_string();
        let file = File::open(path).map_err(|e| SourceError::open(&reference, e))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let store = match ext.as_deref() {
            Some("jsonl") | Some("ndjson") => Self::from_jsonl_reader(BufReader::new(file)),
            _ => Self::from_csv_reader(file),
        }
        .map_err(|e| SourceError::open(&reference, e))?;
        log::info!("RecordStore: loaded {} prediction rows from {}", store.len(), reference);
        Ok(store)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, RecordError> {
        let mut csv = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let column = csv
            .headers()?
            .iter()
            .position(|h| h.trim() == PREDICTIONS_COLUMN)
            .ok_or_else(|| RecordError::MissingColumn(PREDICTIONS_COLUMN.to_string()))?;
        let mut rows = Vec::new();
        for record in csv.records() {
            let record = record?;
            rows.push(Row::Raw(record.get(column).unwrap_or_default().to_string()));
        }
        Ok(Self { rows })
    }

    /// Blank lines are skipped and do not count as rows.
    pub fn from_jsonl_reader<R: BufRead>(reader: R) -> Result<Self, RecordError> {
        let mut rows = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            rows.push(Row::Raw(line));
        }
        Ok(Self { rows })
    }

    /// Store of unparsed payload strings, one per row.
    pub fn from_payloads<I, S>(payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: payloads.into_iter().map(|p| Row::Raw(p.into())).collect(),
        }
    }

    /// Store of already-decoded detections, one entry per row.
    pub fn from_detections(rows: Vec<Vec<Detection>>) -> Self {
        Self {
            rows: rows.into_iter().map(Row::Parsed).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reads one row. `Ok(None)` past the end of the store.
    pub fn get(&self, row_index: usize) -> Result<Option<PredictionRecord>, RecordError> {
        let Some(row) = self.rows.get(row_index) else {
            return Ok(None);
        };
        let detections = match row {
            Row::Parsed(dets) => dets.clone(),
            Row::Raw(payload) => parse_payload(row_index, payload)?,
        };
        Ok(Some(PredictionRecord {
            row_index,
            detections,
        }))
    }
}
