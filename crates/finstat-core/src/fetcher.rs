//! Statement and price fetchers.
//!
//! Every HTTP attempt takes one permit from the shared [`RateLimiter`] before
//! it is sent, including retries.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;
use time::Date;
use tokio_util::sync::CancellationToken;

use crate::domain::{format_date, PeriodRange, PriceSnapshot, StatementRecord, Symbol};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::retry::RetryConfig;
use crate::settings::FetchSettings;
use crate::throttling::RateLimiter;

pub const STATEMENTS_PATH: &str = "financial-data-and-ratio-by-symbol";
pub const PRICE_PATH: &str = "eod-price-by-symbol";

/// Pipeline stage a fetch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchStage {
    Statements,
    Price,
    Symbols,
}

impl FetchStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Statements => "statements",
            Self::Price => "price",
            Self::Symbols => "symbols",
        }
    }
}

impl Display for FetchStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchErrorKind {
    #[error("transport error: {message}")]
    Transport { message: String, retryable: bool },
    #[error("upstream returned status {code}")]
    Status { code: u16 },
    #[error("response could not be decoded: {0}")]
    Decode(String),
    #[error("cancelled while waiting for rate limit permit")]
    RateLimitCancelled,
    #[error("cancelled before the response arrived")]
    Cancelled,
    #[error("response contained no rows")]
    Empty,
    #[error("invalid period: {0}")]
    InvalidPeriod(String),
}

impl FetchErrorKind {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "fetch.transport",
            Self::Status { .. } => "fetch.status",
            Self::Decode(_) => "fetch.decode",
            Self::RateLimitCancelled => "fetch.rate_limit_cancelled",
            Self::Cancelled => "fetch.cancelled",
            Self::Empty => "fetch.empty",
            Self::InvalidPeriod(_) => "fetch.invalid_period",
        }
    }
}

/// Failure of one logical fetch, with the symbol and stage it happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    symbol: Option<Symbol>,
    stage: FetchStage,
    kind: FetchErrorKind,
}

impl FetchError {
    pub fn new(symbol: Symbol, stage: FetchStage, kind: FetchErrorKind) -> Self {
        Self {
            symbol: Some(symbol),
            stage,
            kind,
        }
    }

    /// Failure of the symbol-universe listing, which has no single symbol.
    pub fn universe(kind: FetchErrorKind) -> Self {
        Self {
            symbol: None,
            stage: FetchStage::Symbols,
            kind,
        }
    }

    pub fn symbol(&self) -> Option<&Symbol> {
        self.symbol.as_ref()
    }

    pub const fn stage(&self) -> FetchStage {
        self.stage
    }

    pub const fn kind(&self) -> &FetchErrorKind {
        &self.kind
    }

    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.symbol {
            Some(symbol) => write!(f, "{} fetch for {symbol} failed: {}", self.stage, self.kind),
            None => write!(f, "{} fetch failed: {}", self.stage, self.kind),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

pub type FetchFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send + 'a>>;

/// One logical fetch per call: a statement batch for a symbol, or the price
/// row for one statement period.
pub trait RecordFetcher: Send + Sync {
    fn fetch_statements<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        symbol: &'a Symbol,
        range: PeriodRange,
    ) -> FetchFuture<'a, Vec<StatementRecord>>;

    fn fetch_price<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        symbol: &'a Symbol,
        as_of: Date,
    ) -> FetchFuture<'a, PriceSnapshot>;
}

/// Rate-limited, retrying GET shared by the HTTP fetchers.
#[derive(Clone)]
pub(crate) struct GatedTransport {
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    limiter: RateLimiter,
    retry: RetryConfig,
    request_timeout: Duration,
}

impl GatedTransport {
    pub(crate) fn new(http_client: Arc<dyn HttpClient>, auth: HttpAuth, limiter: RateLimiter) -> Self {
        Self {
            http_client,
            auth,
            limiter,
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub(crate) fn set_retry(&mut self, retry: RetryConfig) {
        self.retry = retry;
    }

    pub(crate) fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout = timeout;
    }

    /// Returns the body of the first 200 response. `fail` attaches the
    /// caller's symbol and stage to each failure kind.
    pub(crate) async fn get(
        &self,
        cancel: &CancellationToken,
        request: HttpRequest,
        fail: impl Fn(FetchErrorKind) -> FetchError,
    ) -> Result<String, FetchError> {
        let request = request
            .with_auth(&self.auth)
            .with_timeout(self.request_timeout);
        let mut attempt = 0_u32;

        loop {
            let error = match self.attempt(cancel, request.clone()).await {
                Ok(body) => return Ok(body),
                Err(kind) => fail(kind),
            };

            let Some(delay) = self.retry.next_delay(attempt, &error) else {
                return Err(error);
            };
            tracing::warn!(
                stage = %error.stage(),
                code = error.code(),
                attempt = attempt + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "retrying fetch: {error}"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(fail(FetchErrorKind::Cancelled)),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        cancel: &CancellationToken,
        request: HttpRequest,
    ) -> Result<String, FetchErrorKind> {
        self.limiter
            .acquire(cancel)
            .await
            .map_err(|_| FetchErrorKind::RateLimitCancelled)?;

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchErrorKind::Cancelled),
            response = self.http_client.execute(request) => response,
        };
        let response = response.map_err(|error| FetchErrorKind::Transport {
            message: error.message().to_owned(),
            retryable: error.retryable(),
        })?;

        if !response.is_success() {
            return Err(FetchErrorKind::Status {
                code: response.status,
            });
        }
        Ok(response.body)
    }
}

/// [`RecordFetcher`] over the listed-company HTTP API.
#[derive(Clone)]
pub struct HttpRecordFetcher {
    transport: GatedTransport,
    base_url: String,
}

impl HttpRecordFetcher {
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

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn statements_request(&self, symbol: &Symbol, range: PeriodRange) -> HttpRequest {
        let (start, end) = (range.start(), range.end());
        HttpRequest::get(self.endpoint(STATEMENTS_PATH))
            .with_query("symbol", symbol.as_str())
            .with_query("startYear", start.year.to_string())
            .with_query("startQuarter", start.quarter.to_string())
            .with_query("endYear", end.year.to_string())
            .with_query("endQuarter", end.quarter.to_string())
    }

    fn price_request(&self, symbol: &Symbol, as_of: Date) -> HttpRequest {
        HttpRequest::get(self.endpoint(PRICE_PATH))
            .with_query("symbol", symbol.as_str())
            .with_query("startDate", format_date(as_of))
            .with_query("adjustedPriceFlag", "Y")
    }
}

impl RecordFetcher for HttpRecordFetcher {
    fn fetch_statements<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        symbol: &'a Symbol,
        range: PeriodRange,
    ) -> FetchFuture<'a, Vec<StatementRecord>> {
        Box::pin(async move {
            let fail = |kind| FetchError::new(symbol.clone(), FetchStage::Statements, kind);
            let body = self
                .transport
                .get(cancel, self.statements_request(symbol, range), fail)
                .await?;

            decode_statements(&body).map_err(fail)
        })
    }

    fn fetch_price<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        symbol: &'a Symbol,
        as_of: Date,
    ) -> FetchFuture<'a, PriceSnapshot> {
        Box::pin(async move {
            let fail = |kind| FetchError::new(symbol.clone(), FetchStage::Price, kind);
            let body = self
                .transport
                .get(cancel, self.price_request(symbol, as_of), fail)
                .await?;

            decode_first_price_row(&body).map_err(fail)
        })
    }
}

fn decode_statements(body: &str) -> Result<Vec<StatementRecord>, FetchErrorKind> {
    serde_json::from_str::<Option<Vec<StatementRecord>>>(body)
        .map(Option::unwrap_or_default)
        .map_err(|error| FetchErrorKind::Decode(error.to_string()))
}

/// Only the first row is used; later rows are other trading days.
fn decode_first_price_row(body: &str) -> Result<PriceSnapshot, FetchErrorKind> {
    let rows = serde_json::from_str::<Option<Vec<Map<String, Value>>>>(body)
        .map_err(|error| FetchErrorKind::Decode(error.to_string()))?
        .unwrap_or_default();

    rows.into_iter()
        .next()
        .map(PriceSnapshot::from_row)
        .ok_or(FetchErrorKind::Empty)
}
