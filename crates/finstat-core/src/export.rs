//! CSV export of collated statement records.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::domain::{StatementMetrics, StatementRecord, UtcDateTime};
use crate::CoreError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub const IDENTITY_COLUMNS: &[&str] = &["Symbol", "Year", "Quarter", "DateAsof"];

pub const PRICE_COLUMNS: &[&str] = &[
    "price_close",
    "price_pe",
    "price_pbv",
    "price_dividendYield",
    "price_marketCap",
    "price_totalVolume",
    "price_high",
    "price_low",
    "price_open",
    "price_prior",
];

const THAI_HEADERS: &[(&str, &str)] = &[
    ("Symbol", "หุ้น"),
    ("Year", "ปี"),
    ("Quarter", "ไตรมาส"),
    ("TotalAssets", "สินทรัพย์รวม"),
    ("TotalLiabilities", "หนี้สินรวม"),
    ("ShareholderEquity", "ส่วนของผู้ถือหุ้น"),
    ("TotalRevenue", "รายได้รวม"),
    ("NetProfit", "กำไรสุทธิ"),
    ("EPS", "กำไรต่อหุ้น"),
    ("ROE", "อัตราผลตอบแทนส่วนของผู้ถือหุ้น"),
    ("ROA", "อัตราผลตอบแทนจากสินทรัพย์"),
    ("DE", "อัตราส่วนหนี้สินต่อส่วนของผู้ถือหุ้น"),
    ("price_close", "ราคาปิด"),
    ("price_pe", "P/E"),
    ("price_pbv", "P/BV"),
    ("price_dividendYield", "อัตราเงินปันผลตอบแทน"),
    ("price_marketCap", "มูลค่าตลาด"),
];

/// Header language of the exported file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderLocale {
    #[default]
    Canonical,
    Thai,
}

impl HeaderLocale {
    /// Localized header for `column`, or the column itself when the table has
    /// no entry.
    pub fn header(self, column: &str) -> &str {
        match self {
            Self::Canonical => column,
            Self::Thai => THAI_HEADERS
                .iter()
                .find(|(canonical, _)| *canonical == column)
                .map_or(column, |(_, thai)| *thai),
        }
    }
}

/// Every export column in order: identity, statement metrics, price.
pub fn columns() -> Vec<&'static str> {
    IDENTITY_COLUMNS
        .iter()
        .chain(StatementMetrics::COLUMNS)
        .chain(PRICE_COLUMNS)
        .copied()
        .collect()
}

/// `0` for zero, no decimals from one million, two from one thousand, four
/// below that. Thresholds apply to the absolute value.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return String::from("0");
    }

    let magnitude = value.abs();
    if magnitude >= 1_000_000.0 {
        format!("{value:.0}")
    } else if magnitude >= 1_000.0 {
        format!("{value:.2}")
    } else {
        format!("{value:.4}")
    }
}

fn format_price_cell(value: &Value) -> String {
    match value {
        Value::Number(number) => number
            .as_f64()
            .map_or_else(|| number.to_string(), format_number),
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One CSV row in [`columns`] order. Price cells stay empty for degraded
/// records.
pub fn record_row(record: &StatementRecord) -> Vec<String> {
    let mut row = Vec::with_capacity(IDENTITY_COLUMNS.len() + StatementMetrics::COLUMNS.len() + PRICE_COLUMNS.len());
    row.push(record.symbol.to_string());
    row.push(record.year.clone());
    row.push(record.quarter.clone());
    row.push(record.date_asof.clone());
    row.extend(record.metrics.values().into_iter().map(format_number));
    row.extend(PRICE_COLUMNS.iter().map(|column| {
        record
            .price
            .as_ref()
            .and_then(|price| price.get(column))
            .map(format_price_cell)
            .unwrap_or_default()
    }));
    row
}

/// `financial_data_<YYYYMMDD_HHMMSS>.csv`
pub fn default_export_path(at: UtcDateTime) -> PathBuf {
    PathBuf::from(format!("financial_data_{}.csv", at.format_file_stamp()))
}

/// Writes `records` to `path` as BOM-prefixed UTF-8 CSV. Returns the number of
/// data rows written. An empty record set is rejected before the file is
/// created.
pub fn write_csv(
    path: &Path,
    records: &[StatementRecord],
    locale: HeaderLocale,
) -> Result<usize, CoreError> {
    if records.is_empty() {
        return Err(CoreError::EmptyExport);
    }

    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(UTF8_BOM)?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(columns().into_iter().map(|column| locale.header(column)))?;
    for record in records {
        writer.write_record(record_row(record))?;
    }
    writer.flush()?;

    tracing::info!(path = %path.display(), rows = records.len(), "csv export written");
    Ok(records.len())
}
