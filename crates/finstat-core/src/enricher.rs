use std::sync::Arc;

use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::domain::{StatementRecord, Symbol};
use crate::error_sink::ErrorSink;
use crate::fetcher::{FetchError, FetchErrorKind, FetchStage, RecordFetcher};

pub const DEFAULT_PRICE_WORKERS: usize = 8;

/// ErrorSink key for a symbol's price failures.
pub fn price_failure_key(symbol: &Symbol) -> String {
    format!("{symbol}-price")
}

/// Attaches a quarter-end price snapshot to each record of one symbol's
/// statement batch.
#[derive(Clone)]
pub struct PriceEnricher {
    fetcher: Arc<dyn RecordFetcher>,
    max_workers: usize,
}

impl PriceEnricher {
    pub fn new(fetcher: Arc<dyn RecordFetcher>, max_workers: usize) -> Self {
        Self {
            fetcher,
            max_workers: max_workers.max(1),
        }
    }

    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Returns the batch with the same length and order. Records whose price
    /// fetch failed come back without a snapshot, and all such failures are
    /// folded into one `<symbol>-price` entry in `sink`.
    ///
    /// In-flight price fetches run under a child of `cancel`, cancelled when
    /// this call returns or is dropped.
    pub async fn enrich(
        &self,
        cancel: &CancellationToken,
        symbol: &Symbol,
        mut batch: Vec<StatementRecord>,
        sink: &ErrorSink,
    ) -> Vec<StatementRecord> {
        if batch.is_empty() {
            return batch;
        }

        let scope = cancel.child_token();
        let _scope_guard = scope.clone().drop_guard();

        let lookups: Vec<_> = batch
            .iter()
            .enumerate()
            .map(|(index, record)| (index, record.quarter_end_date()))
            .collect();

        let mut outcomes: Vec<_> = stream::iter(lookups)
            .map(|(index, lookup)| {
                let fetcher = Arc::clone(&self.fetcher);
                let scope = scope.clone();
                let symbol = symbol.clone();
                async move {
                    let outcome = match lookup {
                        Ok(as_of) => fetcher.fetch_price(&scope, &symbol, as_of).await,
                        Err(invalid) => Err(FetchError::new(
                            symbol.clone(),
                            FetchStage::Price,
                            FetchErrorKind::InvalidPeriod(invalid.to_string()),
                        )),
                    };
                    (index, outcome)
                }
            })
            .buffer_unordered(self.max_workers)
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut failures = Vec::new();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(snapshot) => batch[index].price = Some(snapshot),
                Err(error) => {
                    failures.push(format!("{}: {}", batch[index].period_label(), error.kind()))
                }
            }
        }

        if !failures.is_empty() {
            tracing::warn!(
                failed = failures.len(),
                total = batch.len(),
                "price enrichment incomplete"
            );
            sink.record(price_failure_key(symbol), failures.join("; "));
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::json;
    use time::Date;

    use crate::domain::{format_date, PeriodRange, PriceSnapshot};
    use crate::fetcher::FetchFuture;

    /// Serves prices keyed by requested date; unknown dates fail with 500.
    struct PriceTable {
        prices: HashMap<String, f64>,
        requested: Mutex<Vec<String>>,
    }

    impl PriceTable {
        fn new(prices: &[(&str, f64)]) -> Self {
            Self {
                prices: prices
                    .iter()
                    .map(|(date, close)| ((*date).to_owned(), *close))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    impl RecordFetcher for PriceTable {
        fn fetch_statements<'a>(
            &'a self,
            _cancel: &'a CancellationToken,
            _symbol: &'a Symbol,
            _range: PeriodRange,
        ) -> FetchFuture<'a, Vec<StatementRecord>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn fetch_price<'a>(
            &'a self,
            _cancel: &'a CancellationToken,
            symbol: &'a Symbol,
            as_of: Date,
        ) -> FetchFuture<'a, PriceSnapshot> {
            Box::pin(async move {
                let date = format_date(as_of);
                self.requested.lock().expect("lock").push(date.clone());
                match self.prices.get(&date) {
                    Some(close) => {
                        let serde_json::Value::Object(row) = json!({"date": date, "close": close})
                        else {
                            unreachable!("literal is an object")
                        };
                        Ok(PriceSnapshot::from_row(row))
                    }
                    None => Err(FetchError::new(
                        symbol.clone(),
                        FetchStage::Price,
                        FetchErrorKind::Status { code: 500 },
                    )),
                }
            })
        }
    }

    /// Answers every price after `delay` unless the token is cancelled first,
    /// tracking how many lookups are in flight at once.
    struct SlowPrices {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowPrices {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl RecordFetcher for SlowPrices {
        fn fetch_statements<'a>(
            &'a self,
            _cancel: &'a CancellationToken,
            _symbol: &'a Symbol,
            _range: PeriodRange,
        ) -> FetchFuture<'a, Vec<StatementRecord>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn fetch_price<'a>(
            &'a self,
            cancel: &'a CancellationToken,
            symbol: &'a Symbol,
            as_of: Date,
        ) -> FetchFuture<'a, PriceSnapshot> {
            Box::pin(async move {
                let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(current, Ordering::SeqCst);
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => Err(FetchError::new(
                        symbol.clone(),
                        FetchStage::Price,
                        FetchErrorKind::Cancelled,
                    )),
                    _ = tokio::time::sleep(self.delay) => {
                        let serde_json::Value::Object(row) =
                            json!({"date": format_date(as_of), "close": 1.0})
                        else {
                            unreachable!("literal is an object")
                        };
                        Ok(PriceSnapshot::from_row(row))
                    }
                };
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                outcome
            })
        }
    }

    fn yearly_batch(symbol: &str) -> Vec<StatementRecord> {
        ["2024", "2023", "2022", "2021", "2020", "2019"]
            .into_iter()
            .map(|year| StatementRecord::new(Symbol::parse(symbol).expect("valid"), year, "1"))
            .collect()
    }

    fn record(year: &str, quarter: &str) -> StatementRecord {
        StatementRecord::new(Symbol::parse("AAA").expect("valid"), year, quarter)
    }

    #[tokio::test]
    async fn each_record_gets_the_price_for_its_own_quarter_end() {
        let fetcher = Arc::new(PriceTable::new(&[
            ("2024-03-28", 10.0),
            ("2023-12-28", 9.0),
            ("2023-09-28", 8.0),
        ]));
        let enricher = PriceEnricher::new(fetcher.clone(), 3);
        let sink = ErrorSink::new();
        let symbol = Symbol::parse("AAA").expect("valid");

        let batch = enricher
            .enrich(
                &CancellationToken::new(),
                &symbol,
                vec![record("2024", "1"), record("2023", "4"), record("2023", "3")],
                &sink,
            )
            .await;

        let closes: Vec<_> = batch
            .iter()
            .map(|r| r.price.as_ref().and_then(|p| p.number("price_close")))
            .collect();
        assert_eq!(closes, vec![Some(10.0), Some(9.0), Some(8.0)]);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn failed_quarters_stay_in_the_batch_without_a_snapshot() {
        let fetcher = Arc::new(PriceTable::new(&[("2024-03-28", 10.0)]));
        let enricher = PriceEnricher::new(fetcher, 2);
        let sink = ErrorSink::new();
        let symbol = Symbol::parse("AAA").expect("valid");

        let batch = enricher
            .enrich(
                &CancellationToken::new(),
                &symbol,
                vec![record("2024", "1"), record("2023", "4"), record("FY", "2")],
                &sink,
            )
            .await;

        assert_eq!(batch.len(), 3);
        assert!(batch[0].is_enriched());
        assert!(!batch[1].is_enriched());
        assert!(!batch[2].is_enriched());

        let entries = sink.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "AAA-price");
        assert!(entries[0].reason.contains("Q4/2023: upstream returned status 500"));
        assert!(entries[0].reason.contains("Q2/FY: invalid period"));
    }

    #[tokio::test]
    async fn empty_batch_issues_no_requests() {
        let fetcher = Arc::new(PriceTable::new(&[]));
        let enricher = PriceEnricher::new(fetcher.clone(), 2);
        let sink = ErrorSink::new();

        let batch = enricher
            .enrich(
                &CancellationToken::new(),
                &Symbol::parse("AAA").expect("valid"),
                Vec::new(),
                &sink,
            )
            .await;

        assert!(batch.is_empty());
        assert!(fetcher.requested.lock().expect("lock").is_empty());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn price_lookups_never_exceed_the_worker_cap() {
        let fetcher = Arc::new(SlowPrices::new(Duration::from_millis(20)));
        let enricher = PriceEnricher::new(fetcher.clone(), 2);
        let sink = ErrorSink::new();

        let batch = enricher
            .enrich(
                &CancellationToken::new(),
                &Symbol::parse("AAA").expect("valid"),
                yearly_batch("AAA"),
                &sink,
            )
            .await;

        assert!(batch.iter().all(StatementRecord::is_enriched));
        let peak = fetcher.peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak concurrency {peak}");
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn cancelling_one_batch_leaves_a_sibling_batch_untouched() {
        let fetcher = Arc::new(SlowPrices::new(Duration::from_millis(50)));
        let enricher = PriceEnricher::new(fetcher, 8);
        let sink = ErrorSink::new();
        let run = CancellationToken::new();
        let aaa_scope = run.child_token();
        let aaa = Symbol::parse("AAA").expect("valid");
        let bbb = Symbol::parse("BBB").expect("valid");

        let (_, aaa_batch, bbb_batch) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                aaa_scope.cancel();
            },
            enricher.enrich(&aaa_scope, &aaa, yearly_batch("AAA"), &sink),
            enricher.enrich(&run, &bbb, yearly_batch("BBB"), &sink),
        );

        assert!(aaa_batch.iter().all(|record| !record.is_enriched()));
        assert!(bbb_batch.iter().all(StatementRecord::is_enriched));
        assert!(!run.is_cancelled());

        let entries = sink.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "AAA-price");
    }
}
