//! Error types for ingestion and configuration.
//!
//! Ingestion failures are fatal for a run: no partial report is produced.
//! Degenerate facility data is never an error; detectors handle it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Workbook contains no worksheet")]
    EmptyWorkbook,

    #[error("Required identifier column '{column}' is missing")]
    MissingIdentifierColumn { column: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{name} = {value} is outside the supported range {min}..={max}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Year range {first}..={last} is empty")]
    EmptyYearRange { first: i32, last: i32 },
}

/// Result type alias for ingestion.
pub type IngestResult<T> = Result<T, IngestError>;
