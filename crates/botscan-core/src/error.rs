//! Errors raised by the prediction pipeline.
//!
//! Every variant is fatal for the run: the pipeline is deterministic over a
//! fixed input, so nothing is retried.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotscanError {
    #[error("missing column(s): {}", .missing.join(", "))]
    MissingColumn { missing: Vec<String> },

    #[error("unable to locate source addresses in data (tried: {})", .tried.join(", "))]
    MissingHostColumn { tried: Vec<String> },

    #[error("invalid number of columns: {found}, expected: {expected}")]
    ColumnCount { found: usize, expected: usize },

    #[error("'{0}' does not appear to be an IPv4 or IPv6 address or network")]
    InvalidAddress(String),

    #[error("invalid batch specification: {0}")]
    InvalidBatchSpec(String),

    #[error("cannot derive bits per second for row {row}: {reason}")]
    DerivedFeature { row: usize, reason: String },

    #[error("batching failed: scored {scored} rows, expected {expected}")]
    BatchingInvariant { scored: usize, expected: usize },

    #[error("classifier exposes no probability, margin or label output")]
    UnsupportedClassifier,

    #[error("classifier failed while scoring: {0}")]
    Scoring(String),

    #[error("feature table has {features} rows but host list has {hosts}")]
    RowMismatch { features: usize, hosts: usize },

    #[error("got {scores} scores for {rows} host rows")]
    ScoreLengthMismatch { scores: usize, rows: usize },

    #[error("invalid value {value:?} in column '{column}' at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("number of jobs must not be zero")]
    InvalidJobs,
}

pub type Result<T> = std::result::Result<T, BotscanError>;
