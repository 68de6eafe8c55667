use std::cmp::Ordering;
use std::collections::HashSet;

use crate::domain::StatementRecord;

/// Output order: symbol ascending, then year descending, then quarter
/// descending. Non-numeric year or quarter labels compare as `0`.
pub fn compare_records(left: &StatementRecord, right: &StatementRecord) -> Ordering {
    left.symbol
        .as_str()
        .cmp(right.symbol.as_str())
        .then_with(|| right.year_number().cmp(&left.year_number()))
        .then_with(|| right.quarter_number().cmp(&left.quarter_number()))
}

/// Stable sort by [`compare_records`].
pub fn sort_records(records: &mut [StatementRecord]) {
    records.sort_by(compare_records);
}

/// Sorted, identity-unique record sequence.
#[derive(Debug, Clone, Default)]
pub struct Collated {
    pub records: Vec<StatementRecord>,
    pub duplicates_dropped: usize,
}

/// Gathers statement batches as symbol tasks finish.
#[derive(Debug, Default)]
pub struct ResultCollator {
    records: Vec<StatementRecord>,
}

impl ResultCollator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, batch: Vec<StatementRecord>) {
        self.records.extend(batch);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorts everything accepted so far, then keeps the first record of each
    /// (symbol, year, quarter).
    pub fn finish(self) -> Collated {
        let mut records = self.records;
        sort_records(&mut records);

        let before = records.len();
        let mut seen = HashSet::with_capacity(before);
        records.retain(|record| seen.insert(record.identity()));

        Collated {
            duplicates_dropped: before - records.len(),
            records,
        }
    }
}
