//! # Domain Models
//!
//! Canonical domain types for finstat.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated listed-company symbol |
//! | [`StatementRecord`] | One (symbol, year, quarter) financial statement |
//! | [`StatementMetrics`] | Numeric statement fields in export order |
//! | [`PriceSnapshot`] | Open mapping of price fields attached to a statement |
//! | [`YearQuarter`] / [`PeriodRange`] | Fiscal period window for statement requests |
//! | [`UtcDateTime`] | UTC timestamp |

mod period;
mod price;
mod statement;
mod symbol;
mod timestamp;

pub use period::{
    quarter_end_date, quarter_end_month, PeriodRange, YearQuarter, QUARTER_END_DAY,
};
pub use price::{PriceSnapshot, PRICE_FIELD_PREFIX};
pub use statement::{StatementMetrics, StatementRecord};
pub use symbol::Symbol;
pub use timestamp::{format_date, parse_date, UtcDateTime};
