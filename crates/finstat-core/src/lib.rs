//! Core of finstat: concurrent statement and price fetching for listed
//! companies.
//!
//! This crate contains:
//! - Domain models and validation ([`Symbol`], [`StatementRecord`], [`PriceSnapshot`])
//! - A process-wide [`RateLimiter`] shared by every fetch
//! - HTTP transport and the [`RecordFetcher`] / [`SymbolSource`] contracts
//! - [`PriceEnricher`] and [`SymbolOrchestrator`] for bounded-parallel runs
//! - [`ErrorSink`], [`ResultCollator`] and the final [`RunReport`]
//! - CSV export and the diagnostics file
//!
//! # Run shape
//!
//! | Stage | Concurrency | Failure key |
//! |-------|-------------|-------------|
//! | statements | one task per symbol, `max_workers` at a time | `<symbol>` |
//! | prices | one fetch per record, `price_workers` per symbol | `<symbol>-price` |
//!
//! A failed price fetch degrades its record (no snapshot) but never drops it.

pub mod collator;
pub mod diagnostics;
pub mod domain;
pub mod enricher;
pub mod error;
pub mod error_sink;
pub mod export;
pub mod fetcher;
pub mod http_client;
pub mod orchestrator;
pub mod report;
pub mod retry;
pub mod settings;
pub mod symbol_source;
pub mod throttling;

pub use collator::{compare_records, sort_records, Collated, ResultCollator};
pub use diagnostics::{
    default_diagnostics_path, render_diagnostics, write_diagnostics, DEFAULT_DIAGNOSTICS_FILE,
};
pub use domain::{
    format_date, parse_date, quarter_end_date, quarter_end_month, PeriodRange, PriceSnapshot,
    StatementMetrics, StatementRecord, Symbol, UtcDateTime, YearQuarter, PRICE_FIELD_PREFIX,
    QUARTER_END_DAY,
};
pub use enricher::{price_failure_key, PriceEnricher, DEFAULT_PRICE_WORKERS};
pub use error::{CoreError, ValidationError};
pub use error_sink::{ErrorSink, FailureEntry};
pub use export::{
    columns, default_export_path, format_number, record_row, write_csv, HeaderLocale,
    IDENTITY_COLUMNS, PRICE_COLUMNS,
};
pub use fetcher::{
    FetchError, FetchErrorKind, FetchFuture, FetchStage, HttpRecordFetcher, RecordFetcher,
    PRICE_PATH, STATEMENTS_PATH,
};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient,
};
pub use orchestrator::{
    OrchestratorConfig, SymbolOrchestrator, DEFAULT_MAX_WORKERS, DEFAULT_PER_SYMBOL_BUDGET,
};
pub use report::{RunReport, RunSummary};
pub use retry::{Backoff, RetryConfig};
pub use settings::{FetchSettings, DEFAULT_BASE_URL, DEFAULT_LOOKBACK_YEARS};
pub use symbol_source::{
    decode_symbol_listing, HttpSymbolSource, StaticSymbolSource, SymbolSource, SYMBOLS_PATH,
};
pub use throttling::{AcquireCancelled, RateLimiter, RateQuota};
