//! CLI argument definitions for finstat.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Fetch statements and quarter-end prices, export CSV |
//! | `symbols` | List the symbol universe |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--api-key` | `FINSTAT_API_KEY` | API key sent as the `api-key` header |
//! | `--base-url` | `FINSTAT_BASE_URL` or the listed-company API | Endpoint root |
//! | `--request-timeout-secs` | `30` | Per-request timeout |
//!
//! # Examples
//!
//! ```bash
//! # Whole universe, five years back from today
//! finstat fetch
//!
//! # Two symbols, Thai headers
//! finstat fetch --symbols PTT,AOT --thai-headers --pretty
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// finstat - quarterly statements and quarter-end prices for listed companies
#[derive(Debug, Parser)]
#[command(name = "finstat", author, version, about = "Quarterly statement and price fetcher")]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// API key; overrides FINSTAT_API_KEY / SETSMART_API_KEY.
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// API root; overrides FINSTAT_BASE_URL.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Timeout for each HTTP request in seconds.
    #[arg(long, global = true)]
    pub request_timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch statements and prices for every symbol and export a CSV.
    ///
    /// Writes the CSV (when any record was fetched) and the error log, then
    /// prints a JSON run summary. Exits 3 when any symbol or price failed.
    ///
    /// # Examples
    ///
    ///   finstat fetch
    ///   finstat fetch --symbols PTT,AOT --years 3
    ///   finstat fetch --workers 5 --output out.csv --errors-log errors.log
    Fetch(FetchArgs),

    /// List the symbol universe as JSON.
    ///
    /// # Examples
    ///
    ///   finstat symbols
    ///   finstat symbols --as-of 2024-06-28
    Symbols(SymbolsArgs),
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Comma-separated symbols; the universe is listed from the API when omitted.
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Reference date (YYYY-MM-DD); defaults to today (UTC).
    #[arg(long)]
    pub as_of: Option<String>,

    /// Years of statements to fetch before the as-of quarter.
    #[arg(long)]
    pub years: Option<u16>,

    /// Symbols processed concurrently.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Price requests in flight per symbol.
    #[arg(long)]
    pub price_workers: Option<usize>,

    /// Milliseconds between rate-limit permits.
    #[arg(long)]
    pub rate_interval_ms: Option<u64>,

    /// Rate-limit burst capacity.
    #[arg(long)]
    pub burst: Option<u32>,

    /// Run deadline per symbol in seconds (total = value * symbol count).
    #[arg(long)]
    pub per_symbol_timeout_secs: Option<u64>,

    /// CSV path; defaults to financial_data_<timestamp>.csv.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Error log path; defaults to fetch_errors.log.
    #[arg(long)]
    pub errors_log: Option<PathBuf>,

    /// Write Thai column headers.
    #[arg(long, default_value_t = false)]
    pub thai_headers: bool,
}

#[derive(Debug, Args)]
pub struct SymbolsArgs {
    /// Trading date (YYYY-MM-DD); defaults to today (UTC).
    #[arg(long)]
    pub as_of: Option<String>,
}
