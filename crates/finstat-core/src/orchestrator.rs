//! Bounded-parallel fan-out across the symbol universe.
//!
//! Each symbol runs as its own spawned task: statements, then prices, then
//! the batch goes to the collator. A failing, panicking or cancelled symbol
//! never affects its siblings.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::collator::ResultCollator;
use crate::domain::{PeriodRange, StatementRecord, Symbol, UtcDateTime};
use crate::enricher::{PriceEnricher, DEFAULT_PRICE_WORKERS};
use crate::error_sink::ErrorSink;
use crate::fetcher::RecordFetcher;
use crate::report::RunReport;
use crate::symbol_source::dedup_in_order;

pub const DEFAULT_MAX_WORKERS: usize = 20;
pub const DEFAULT_PER_SYMBOL_BUDGET: Duration = Duration::from_secs(30);

/// Time symbol tasks get to observe cancellation after the deadline before
/// they are aborted.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Symbols processed concurrently.
    pub max_workers: usize,
    /// Price fetches in flight per symbol.
    pub price_workers: usize,
    /// Run deadline = budget * symbol count.
    pub per_symbol_budget: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            price_workers: DEFAULT_PRICE_WORKERS,
            per_symbol_budget: DEFAULT_PER_SYMBOL_BUDGET,
        }
    }
}

impl OrchestratorConfig {
    pub fn run_deadline(&self, symbols: usize) -> Duration {
        self.per_symbol_budget
            .saturating_mul(u32::try_from(symbols).unwrap_or(u32::MAX))
    }
}

pub struct SymbolOrchestrator {
    fetcher: Arc<dyn RecordFetcher>,
    enricher: PriceEnricher,
    range: PeriodRange,
    config: OrchestratorConfig,
}

impl SymbolOrchestrator {
    pub fn new(fetcher: Arc<dyn RecordFetcher>, range: PeriodRange, config: OrchestratorConfig) -> Self {
        Self {
            enricher: PriceEnricher::new(Arc::clone(&fetcher), config.price_workers),
            fetcher,
            range,
            config,
        }
    }

    pub const fn config(&self) -> OrchestratorConfig {
        self.config
    }

    pub const fn range(&self) -> PeriodRange {
        self.range
    }

    /// Runs every symbol to completion, deadline or cancellation and returns
    /// what was collected. Symbols that never got to run once the deadline
    /// passed are recorded as cancelled failures. Repeated symbols run once.
    pub async fn run(&self, cancel: &CancellationToken, symbols: Vec<Symbol>) -> RunReport {
        let symbols = dedup_in_order(symbols);
        let run_id = Uuid::new_v4();
        let started_at = UtcDateTime::now();
        let symbols_requested = symbols.len();
        let sink = Arc::new(ErrorSink::new());
        let mut collator = ResultCollator::new();

        let deadline = self.config.run_deadline(symbols_requested);
        tracing::info!(
            %run_id,
            symbols = symbols_requested,
            workers = self.config.max_workers,
            deadline_secs = deadline.as_secs(),
            "starting fetch run"
        );

        let run_token = cancel.child_token();
        let timeout = tokio::time::sleep(deadline);
        let grace = tokio::time::sleep(deadline.saturating_add(CANCEL_GRACE));
        tokio::pin!(timeout, grace);
        let mut timed_out = false;
        let mut aborted = false;
        let abort_handles = Mutex::new(Vec::new());

        let mut tasks = stream::iter(symbols)
            .map(|symbol| {
                let task = SymbolTask {
                    fetcher: Arc::clone(&self.fetcher),
                    enricher: self.enricher.clone(),
                    sink: Arc::clone(&sink),
                    range: self.range,
                    cancel: run_token.clone(),
                };
                let span = tracing::info_span!("symbol", symbol = %symbol);
                let handle = tokio::spawn(task.run(symbol.clone()).instrument(span));
                abort_handles
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(handle.abort_handle());
                async move { (symbol, handle.await) }
            })
            .buffer_unordered(self.config.max_workers.max(1));

        loop {
            tokio::select! {
                biased;
                next = tasks.next() => match next {
                    Some((_, Ok(batch))) => collator.accept(batch),
                    Some((symbol, Err(join_error))) => {
                        tracing::error!(symbol = %symbol, "symbol task aborted: {join_error}");
                        sink.record(symbol.to_string(), format!("symbol task aborted: {join_error}"));
                    }
                    None => break,
                },
                () = &mut timeout, if !timed_out => {
                    timed_out = true;
                    tracing::warn!(%run_id, deadline_secs = deadline.as_secs(), "run deadline elapsed; cancelling in-flight symbols");
                    run_token.cancel();
                }
                () = &mut grace, if timed_out && !aborted => {
                    aborted = true;
                    tracing::warn!(%run_id, "aborting symbol tasks that ignored cancellation");
                    for handle in abort_handles.lock().unwrap_or_else(PoisonError::into_inner).iter() {
                        handle.abort();
                    }
                }
            }
        }
        drop(tasks);

        let collated = collator.finish();
        let report = RunReport {
            run_id,
            started_at,
            finished_at: UtcDateTime::now(),
            symbols_requested,
            records: collated.records,
            failures: sink.drain(),
            duplicates_dropped: collated.duplicates_dropped,
            timed_out,
            cancelled: cancel.is_cancelled(),
        };

        tracing::info!(
            %run_id,
            records = report.records.len(),
            failures = report.failures.len(),
            duplicates_dropped = report.duplicates_dropped,
            timed_out,
            "fetch run finished"
        );
        report
    }
}

/// Everything one symbol's pipeline needs, owned so it can be spawned.
struct SymbolTask {
    fetcher: Arc<dyn RecordFetcher>,
    enricher: PriceEnricher,
    sink: Arc<ErrorSink>,
    range: PeriodRange,
    cancel: CancellationToken,
}

impl SymbolTask {
    async fn run(self, symbol: Symbol) -> Vec<StatementRecord> {
        if self.cancel.is_cancelled() {
            self.sink
                .record(symbol.to_string(), "run cancelled before the symbol was fetched");
            return Vec::new();
        }

        let batch = match self
            .fetcher
            .fetch_statements(&self.cancel, &symbol, self.range)
            .await
        {
            Ok(batch) => batch,
            Err(error) => {
                tracing::warn!(code = error.code(), "statement fetch failed: {error}");
                self.sink.record(symbol.to_string(), error.to_string());
                return Vec::new();
            }
        };

        if batch.is_empty() {
            tracing::debug!("no statements in range");
            return batch;
        }

        let batch = self
            .enricher
            .enrich(&self.cancel, &symbol, batch, &self.sink)
            .await;
        tracing::debug!(
            records = batch.len(),
            enriched = batch.iter().filter(|r| r.is_enriched()).count(),
            "symbol complete"
        );
        batch
    }
}
