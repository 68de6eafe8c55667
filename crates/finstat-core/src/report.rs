use serde::Serialize;
use uuid::Uuid;

use crate::domain::{StatementRecord, UtcDateTime};
use crate::error_sink::FailureEntry;

/// Result of one orchestrated run. Always produced, even after a timeout.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: UtcDateTime,
    pub finished_at: UtcDateTime,
    pub symbols_requested: usize,
    /// Sorted by symbol, then newest period first.
    pub records: Vec<StatementRecord>,
    /// Ordered by key.
    pub failures: Vec<FailureEntry>,
    pub duplicates_dropped: usize,
    /// The run deadline elapsed and in-flight work was cancelled.
    pub timed_out: bool,
    /// The caller cancelled the run.
    pub cancelled: bool,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.timed_out && !self.cancelled
    }

    pub fn failure(&self, key: &str) -> Option<&str> {
        self.failures
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.reason.as_str())
    }

    pub fn enriched_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_enriched()).count()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            symbols_requested: self.symbols_requested,
            records: self.records.len(),
            enriched_records: self.enriched_count(),
            duplicates_dropped: self.duplicates_dropped,
            failures: self.failures.clone(),
            timed_out: self.timed_out,
            cancelled: self.cancelled,
        }
    }
}

/// [`RunReport`] without the records, for printing.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: UtcDateTime,
    pub finished_at: UtcDateTime,
    pub symbols_requested: usize,
    pub records: usize,
    pub enriched_records: usize,
    pub duplicates_dropped: usize,
    pub failures: Vec<FailureEntry>,
    pub timed_out: bool,
    pub cancelled: bool,
}
