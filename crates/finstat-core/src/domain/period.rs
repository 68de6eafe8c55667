use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::{Date, Month};

use crate::ValidationError;

/// Day of month requested for every quarter-end price lookup. Day 28 exists in
/// every month, so no quarter needs month-length handling.
pub const QUARTER_END_DAY: u8 = 28;

/// Fiscal (year, quarter) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearQuarter {
    pub year: i32,
    pub quarter: u8,
}

impl YearQuarter {
    pub fn new(year: i32, quarter: u8) -> Result<Self, ValidationError> {
        if !(1..=4).contains(&quarter) {
            return Err(ValidationError::InvalidQuarter { value: quarter });
        }
        Ok(Self { year, quarter })
    }

    /// Quarter that contains `date`.
    pub fn containing(date: Date) -> Self {
        let month = u8::from(date.month());
        Self {
            year: date.year(),
            quarter: (month - 1) / 3 + 1,
        }
    }
}

impl Display for YearQuarter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Q{}/{}", self.quarter, self.year)
    }
}

/// Inclusive statement period window sent to the statement endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRange {
    start: YearQuarter,
    end: YearQuarter,
}

impl PeriodRange {
    pub fn new(start: YearQuarter, end: YearQuarter) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedPeriodRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Window ending at the quarter containing `as_of` and starting at the same
    /// quarter `years` years earlier.
    pub fn trailing_years(as_of: Date, years: u16) -> Self {
        let end = YearQuarter::containing(as_of);
        let start = YearQuarter {
            year: end.year - i32::from(years),
            quarter: end.quarter,
        };
        Self { start, end }
    }

    pub const fn start(&self) -> YearQuarter {
        self.start
    }

    pub const fn end(&self) -> YearQuarter {
        self.end
    }
}

/// Month that closes the given quarter label. Anything other than `1`, `2` or
/// `3` is treated as the fourth quarter.
pub fn quarter_end_month(quarter: &str) -> Month {
    match quarter.trim() {
        "1" => Month::March,
        "2" => Month::June,
        "3" => Month::September,
        _ => Month::December,
    }
}

/// Approximate quarter-end date used for price lookups: day 28 of the closing
/// month of the quarter.
pub fn quarter_end_date(year: &str, quarter: &str) -> Result<Date, ValidationError> {
    let month = quarter_end_month(quarter);
    let invalid = || ValidationError::InvalidDate {
        value: format!("{}-{:02}-{QUARTER_END_DAY}", year.trim(), u8::from(month)),
    };

    let year = year.trim().parse::<i32>().map_err(|_| invalid())?;
    Date::from_calendar_date(year, month, QUARTER_END_DAY).map_err(|_| invalid())
}
