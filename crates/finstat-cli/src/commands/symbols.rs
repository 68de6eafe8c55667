use std::sync::Arc;

use finstat_core::{
    format_date, FetchSettings, HttpClient, HttpSymbolSource, RateLimiter, Symbol, SymbolSource,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cli::SymbolsArgs;
use crate::error::CliError;

use super::{as_of_date, CommandResult};

#[derive(Debug, Serialize)]
struct SymbolsResponseData {
    as_of: String,
    count: usize,
    symbols: Vec<Symbol>,
}

pub async fn run(
    args: &SymbolsArgs,
    settings: FetchSettings,
    http_client: Arc<dyn HttpClient>,
    cancel: &CancellationToken,
) -> Result<CommandResult, CliError> {
    settings.validate()?;
    let as_of = as_of_date(args.as_of.as_deref())?;
    let limiter = RateLimiter::new(settings.rate_quota)?;

    let symbols = HttpSymbolSource::from_settings(&settings, http_client, limiter)
        .list_symbols(cancel, as_of)
        .await?;

    let data = serde_json::to_value(SymbolsResponseData {
        as_of: format_date(as_of),
        count: symbols.len(),
        symbols,
    })?;
    Ok(CommandResult::ok(data))
}
