use thiserror::Error;

/// Failures opening or reading an input source.
///
/// These are the only fatal errors in a run: callers abort before any
/// partial output is produced.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to open source '{reference}': {reason}")]
    Open { reference: String, reason: String },
    #[error("failed to read from source '{reference}': {reason}")]
    Read { reference: String, reason: String },
    #[error("unsupported source reference '{0}'")]
    Unsupported(String),
}

impl SourceError {
    pub fn open(reference: impl Into<String>, reason: impl ToString) -> Self {
        SourceError::Open {
            reference: reference.into(),
            reason: reason.to_string(),
        }
    }

    pub fn read(reference: impl Into<String>, reason: impl ToString) -> Self {
        SourceError::Read {
            reference: reference.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failures loading or decoding prediction records.
#[derive(Error, Debug)]
pub enum RecordError {
    /// A single row carried a payload that is not valid JSON. Recovered per row.
    #[error("record row {row}: invalid predictions payload: {source}")]
    Parse {
        row: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("record store has no '{0}' column")]
    MissingColumn(String),
    #[error("record store csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("record store io error: {0}")]
    Io(#[from] std::io::Error),
}
