mod fetch;
mod symbols;

use std::sync::Arc;
use std::time::Duration;

use finstat_core::{parse_date, FetchSettings, HttpClient, ReqwestHttpClient, UtcDateTime};
use serde_json::Value;
use time::Date;
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    pub failures: usize,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self { data, failures: 0 }
    }

    pub fn with_failures(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }

    pub const fn has_failures(&self) -> bool {
        self.failures > 0
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let settings = base_settings(cli);
    let cancel = cancel_on_ctrl_c();
    let http_client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());

    match &cli.command {
        Command::Fetch(args) => fetch::run(args, settings, http_client, &cancel).await,
        Command::Symbols(args) => symbols::run(args, settings, http_client, &cancel).await,
    }
}

/// Environment settings with global flag overrides applied.
fn base_settings(cli: &Cli) -> FetchSettings {
    let mut settings = FetchSettings::from_env();
    if let Some(api_key) = &cli.api_key {
        settings.api_key.clone_from(api_key);
    }
    if let Some(base_url) = &cli.base_url {
        settings.base_url.clone_from(base_url);
    }
    if let Some(secs) = cli.request_timeout_secs {
        settings.request_timeout = Duration::from_secs(secs);
    }
    settings
}

fn as_of_date(raw: Option<&str>) -> Result<Date, CliError> {
    match raw {
        Some(raw) => Ok(parse_date(raw)?),
        None => Ok(UtcDateTime::now().date()),
    }
}

/// Token cancelled on the first Ctrl-C; in-flight work winds down and the
/// partial run is still reported.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling run");
            trigger.cancel();
        }
    });
    cancel
}
