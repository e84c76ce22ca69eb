// Error types for the enrichment core and the backfill lookup

use chrono::NaiveDateTime;
use thiserror::Error;

/// Errors that abort an enrichment run
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Both anchors share the same raw time, the linear map would divide by zero
    #[error("anchor raw times are identical ({0}); cannot build linear time map")]
    DegenerateAnchor(NaiveDateTime),

    #[error("invalid anchor '{0}': expected RAW=TRUE with times as HH:MM:SS")]
    InvalidAnchor(String),

    #[error("input log has no '{0}' column")]
    MissingColumn(&'static str),

    #[error("signal column '{name}' not found; available columns: {available:?}")]
    SignalColumnNotFound { name: String, available: Vec<String> },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures of a single remote state lookup.
///
/// These never escape the backfill cache: they are logged and recorded as
/// "no data" for the key that failed.
#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token request rejected with HTTP {0}")]
    Token(reqwest::StatusCode),

    #[error("malformed state response: {0}")]
    Decode(String),
}
