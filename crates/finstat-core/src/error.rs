use thiserror::Error;

use crate::fetcher::FetchError;

/// Validation and contract errors exposed by `finstat-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("date must be formatted as YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("quarter must be between 1 and 4, got {value}")]
    InvalidQuarter { value: u8 },
    #[error("period range start {start} is after end {end}")]
    InvertedPeriodRange { start: String, end: String },

    #[error("setting '{field}' must be greater than zero")]
    ZeroSetting { field: &'static str },
    #[error("api key is missing; set FINSTAT_API_KEY or pass --api-key")]
    MissingApiKey,
    #[error("base url must start with http:// or https://: '{value}'")]
    InvalidBaseUrl { value: String },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("no statement records to export")]
    EmptyExport,
}
