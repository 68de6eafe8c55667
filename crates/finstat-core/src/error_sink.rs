use std::sync::{Mutex, PoisonError};

use serde::Serialize;

/// One failure kept for the diagnostics file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    pub key: String,
    pub reason: String,
}

/// Thread-safe accumulator of run failures.
///
/// Keys are a symbol (statement stage) or `<symbol>-price` (price stage). No
/// deduplication happens here; callers record at most one entry per symbol
/// per stage.
#[derive(Debug, Default)]
pub struct ErrorSink {
    entries: Mutex<Vec<FailureEntry>>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: impl Into<String>, reason: impl Into<String>) {
        let entry = FailureEntry {
            key: key.into(),
            reason: reason.into(),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes every entry recorded so far, ordered by key.
    pub fn drain(&self) -> Vec<FailureEntry> {
        let mut entries = std::mem::take(
            &mut *self
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        entries.sort_by(|left, right| left.key.cmp(&right.key));
        entries
    }
}
