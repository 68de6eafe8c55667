//! Symbol universe listing.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use time::Date;
use tokio_util::sync::CancellationToken;

use crate::domain::{format_date, Symbol};
use crate::fetcher::{FetchError, FetchErrorKind, FetchFuture, GatedTransport};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::retry::RetryConfig;
use crate::settings::FetchSettings;
use crate::throttling::RateLimiter;

pub const SYMBOLS_PATH: &str = "eod-price-by-security-type";

/// Wrapper fields tried, in order, when the listing is an object.
pub const WRAPPER_FIELDS: &[&str] = &["data", "symbols", "results", "items", "list", "securities"];

pub trait SymbolSource: Send + Sync {
    fn list_symbols<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        as_of: Date,
    ) -> FetchFuture<'a, Vec<Symbol>>;
}

/// Fixed universe, e.g. from the command line.
#[derive(Debug, Clone, Default)]
pub struct StaticSymbolSource {
    symbols: Vec<Symbol>,
}

impl StaticSymbolSource {
    pub fn new(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            symbols: dedup_in_order(symbols),
        }
    }
}

impl SymbolSource for StaticSymbolSource {
    fn list_symbols<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
        _as_of: Date,
    ) -> FetchFuture<'a, Vec<Symbol>> {
        Box::pin(async move { Ok(self.symbols.clone()) })
    }
}

/// Security-master listing over HTTP: one rate-limited GET for common stock
/// (`securityType=S`) trading on `as_of`.
#[derive(Clone)]
pub struct HttpSymbolSource {
    transport: GatedTransport,
    base_url: String,
}

impl HttpSymbolSource {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        auth: HttpAuth,
        limiter: RateLimiter,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport: GatedTransport::new(http_client, auth, limiter),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    /// API key, base URL, retry and timeout taken from `settings`.
    pub fn from_settings(
        settings: &FetchSettings,
        http_client: Arc<dyn HttpClient>,
        limiter: RateLimiter,
    ) -> Self {
        Self::new(
            http_client,
            HttpAuth::api_key(&settings.api_key),
            limiter,
            &settings.base_url,
        )
        .with_retry(settings.retry.clone())
        .with_request_timeout(settings.request_timeout)
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.transport.set_retry(retry);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.transport.set_request_timeout(timeout);
        self
    }
}

impl SymbolSource for HttpSymbolSource {
    fn list_symbols<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        as_of: Date,
    ) -> FetchFuture<'a, Vec<Symbol>> {
        Box::pin(async move {
            let request = HttpRequest::get(format!("{}/{SYMBOLS_PATH}", self.base_url))
                .with_query("date", format_date(as_of))
                .with_query("securityType", "S");
            let body = self
                .transport
                .get(cancel, request, FetchError::universe)
                .await?;

            let payload: Value = serde_json::from_str(&body)
                .map_err(|e| FetchError::universe(FetchErrorKind::Decode(e.to_string())))?;
            let symbols = decode_symbol_listing(&payload);
            if symbols.is_empty() {
                return Err(FetchError::universe(FetchErrorKind::Empty));
            }

            tracing::info!(count = symbols.len(), as_of = %format_date(as_of), "symbol universe loaded");
            Ok(symbols)
        })
    }
}

/// Extracts symbols from a listing payload.
///
/// Accepts, in order of preference: an array of objects carrying `symbol`
/// (or bare strings), an object wrapping such an array under one of
/// [`WRAPPER_FIELDS`], or an object keyed by symbol. Unparseable entries are
/// skipped; duplicates keep their first position.
pub fn decode_symbol_listing(payload: &Value) -> Vec<Symbol> {
    let raw: Vec<&str> = match payload {
        Value::Array(entries) => symbols_in_array(entries),
        Value::Object(object) => WRAPPER_FIELDS
            .iter()
            .find_map(|field| object.get(*field).and_then(Value::as_array))
            .map(|entries| symbols_in_array(entries))
            .unwrap_or_else(|| object.keys().map(String::as_str).collect()),
        _ => Vec::new(),
    };

    let parsed = raw.into_iter().filter_map(|entry| match Symbol::parse(entry) {
        Ok(symbol) => Some(symbol),
        Err(error) => {
            tracing::warn!(entry, "skipping symbol listing entry: {error}");
            None
        }
    });
    dedup_in_order(parsed)
}

fn symbols_in_array(entries: &[Value]) -> Vec<&str> {
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(symbol) => Some(symbol.as_str()),
            Value::Object(object) => object.get("symbol").and_then(Value::as_str),
            _ => None,
        })
        .collect()
}

pub(crate) fn dedup_in_order(symbols: impl IntoIterator<Item = Symbol>) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    symbols
        .into_iter()
        .filter(|symbol| seen.insert(symbol.clone()))
        .collect()
}
