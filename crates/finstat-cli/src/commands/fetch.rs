use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use finstat_core::{
    default_diagnostics_path, default_export_path, format_date, write_csv, write_diagnostics,
    FetchSettings, HeaderLocale, HttpClient, HttpRecordFetcher, HttpSymbolSource, RateLimiter,
    RunReport, StaticSymbolSource, Symbol, SymbolOrchestrator, SymbolSource,
};
use serde::Serialize;
use time::Date;
use tokio_util::sync::CancellationToken;

use crate::cli::FetchArgs;
use crate::error::CliError;

use super::{as_of_date, CommandResult};

#[derive(Debug, Serialize)]
struct FetchResponseData {
    as_of: String,
    period: String,
    #[serde(flatten)]
    summary: finstat_core::RunSummary,
    output: Option<PathBuf>,
    errors_log: PathBuf,
}

pub async fn run(
    args: &FetchArgs,
    settings: FetchSettings,
    http_client: Arc<dyn HttpClient>,
    cancel: &CancellationToken,
) -> Result<CommandResult, CliError> {
    let settings = apply_overrides(settings, args);
    settings.validate()?;
    let as_of = as_of_date(args.as_of.as_deref())?;
    let explicit = parse_symbols(&args.symbols)?;

    let limiter = RateLimiter::new(settings.rate_quota)?;
    let symbols = list_universe(
        explicit,
        &settings,
        Arc::clone(&http_client),
        &limiter,
        cancel,
        as_of,
    )
    .await?;

    let range = settings.period_range(as_of);
    let fetcher = Arc::new(HttpRecordFetcher::from_settings(&settings, http_client, limiter));
    let orchestrator = SymbolOrchestrator::new(fetcher, range, settings.orchestrator_config());
    let report = orchestrator.run(cancel, symbols).await;

    let (output, errors_log) = write_artifacts(&report, args)?;
    let failures = report.failures.len() + usize::from(report.timed_out || report.cancelled);

    let data = serde_json::to_value(FetchResponseData {
        as_of: format_date(as_of),
        period: format!("{} - {}", range.start(), range.end()),
        summary: report.summary(),
        output,
        errors_log,
    })?;
    Ok(CommandResult::ok(data).with_failures(failures))
}

fn apply_overrides(mut settings: FetchSettings, args: &FetchArgs) -> FetchSettings {
    if let Some(years) = args.years {
        settings.lookback_years = years;
    }
    if let Some(workers) = args.workers {
        settings.max_workers = workers;
    }
    if let Some(workers) = args.price_workers {
        settings.price_workers = workers;
    }
    if let Some(ms) = args.rate_interval_ms {
        settings.rate_quota.refill_interval = Duration::from_millis(ms);
    }
    if let Some(burst) = args.burst {
        settings.rate_quota.burst = burst;
    }
    if let Some(secs) = args.per_symbol_timeout_secs {
        settings.per_symbol_budget = Duration::from_secs(secs);
    }
    settings
}

fn parse_symbols(raw: &[String]) -> Result<Vec<Symbol>, CliError> {
    Ok(raw
        .iter()
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| Symbol::parse(entry))
        .collect::<Result<Vec<_>, _>>()?)
}

async fn list_universe(
    explicit: Vec<Symbol>,
    settings: &FetchSettings,
    http_client: Arc<dyn HttpClient>,
    limiter: &RateLimiter,
    cancel: &CancellationToken,
    as_of: Date,
) -> Result<Vec<Symbol>, CliError> {
    let symbols = if explicit.is_empty() {
        HttpSymbolSource::from_settings(settings, http_client, limiter.clone())
            .list_symbols(cancel, as_of)
            .await?
    } else {
        StaticSymbolSource::new(explicit)
            .list_symbols(cancel, as_of)
            .await?
    };
    Ok(symbols)
}

/// Diagnostics are always written; the CSV only when there is something in it.
fn write_artifacts(
    report: &RunReport,
    args: &FetchArgs,
) -> Result<(Option<PathBuf>, PathBuf), CliError> {
    let errors_log = args
        .errors_log
        .clone()
        .unwrap_or_else(default_diagnostics_path);
    write_diagnostics(&errors_log, report.run_id, report.finished_at, &report.failures)?;

    if report.records.is_empty() {
        tracing::warn!("no statement records fetched; skipping csv export");
        return Ok((None, errors_log));
    }

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_export_path(report.finished_at));
    let locale = if args.thai_headers {
        HeaderLocale::Thai
    } else {
        HeaderLocale::Canonical
    };
    write_csv(&output, &report.records, locale)?;
    Ok((Some(output), errors_log))
}

#[cfg(test)]
mod tests {
    use super::*;
    use finstat_core::{FailureEntry, StatementRecord, UtcDateTime};

    fn report_with(records: Vec<StatementRecord>, failures: Vec<FailureEntry>) -> RunReport {
        let at = UtcDateTime::parse("2024-06-01T00:00:00Z").expect("valid timestamp");
        RunReport {
            run_id: Default::default(),
            started_at: at,
            finished_at: at,
            symbols_requested: 2,
            records,
            failures,
            duplicates_dropped: 0,
            timed_out: false,
            cancelled: false,
        }
    }

    fn args(dir: &std::path::Path) -> FetchArgs {
        FetchArgs {
            symbols: Vec::new(),
            as_of: None,
            years: Some(3),
            workers: Some(4),
            price_workers: None,
            rate_interval_ms: Some(100),
            burst: None,
            per_symbol_timeout_secs: Some(10),
            output: Some(dir.join("out.csv")),
            errors_log: Some(dir.join("errors.log")),
            thai_headers: false,
        }
    }

    #[test]
    fn flag_overrides_replace_only_given_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = apply_overrides(FetchSettings::default(), &args(dir.path()));

        assert_eq!(settings.lookback_years, 3);
        assert_eq!(settings.max_workers, 4);
        assert_eq!(settings.price_workers, FetchSettings::default().price_workers);
        assert_eq!(settings.rate_quota.refill_interval, Duration::from_millis(100));
        assert_eq!(settings.rate_quota.burst, 10);
        assert_eq!(settings.per_symbol_budget, Duration::from_secs(10));
    }

    #[test]
    fn blank_symbol_entries_are_ignored_and_bad_ones_rejected() {
        let parsed = parse_symbols(&[String::from("ptt"), String::from(" ")]).expect("valid");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].as_str(), "PTT");

        let error = parse_symbols(&[String::from("not valid")]).expect_err("invalid");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn empty_run_writes_only_the_error_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = args(dir.path());
        let report = report_with(
            Vec::new(),
            vec![FailureEntry {
                key: String::from("BBB"),
                reason: String::from("statements fetch for BBB failed: upstream returned status 500"),
            }],
        );

        let (output, errors_log) = write_artifacts(&report, &args).expect("artifacts");

        assert!(output.is_none());
        assert!(!dir.path().join("out.csv").exists());
        let log = std::fs::read_to_string(errors_log).expect("log written");
        assert!(log.contains("BBB: statements fetch for BBB failed"));
    }

    #[test]
    fn records_are_exported_to_the_requested_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = args(dir.path());
        let symbol = Symbol::parse("AAA").expect("valid");
        let report = report_with(vec![StatementRecord::new(symbol, "2024", "1")], Vec::new());

        let (output, _) = write_artifacts(&report, &args).expect("artifacts");

        assert_eq!(output, Some(dir.path().join("out.csv")));
        let csv = std::fs::read_to_string(dir.path().join("out.csv")).expect("csv written");
        assert!(csv.starts_with('\u{feff}'));
        assert!(csv.contains("AAA,2024,1,"));
    }
}
