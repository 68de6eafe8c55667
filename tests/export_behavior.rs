//! Behavior-driven tests for the CSV export and the diagnostics file.

use finstat_core::{
    columns, write_csv, write_diagnostics, CoreError, FailureEntry, HeaderLocale, PriceSnapshot,
    StatementRecord, Symbol, UtcDateTime,
};
use serde_json::{json, Value};
use uuid::Uuid;

fn record(symbol: &str, year: &str, quarter: &str) -> StatementRecord {
    StatementRecord::new(Symbol::parse(symbol).expect("valid"), year, quarter)
}

fn price(row: Value) -> PriceSnapshot {
    let Value::Object(row) = row else {
        unreachable!("test rows are objects")
    };
    PriceSnapshot::from_row(row)
}

fn read_rows(path: &std::path::Path) -> (String, Vec<Vec<String>>) {
    let text = std::fs::read_to_string(path).expect("file readable");
    let without_bom = text.strip_prefix('\u{feff}').expect("utf-8 bom").to_owned();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(without_bom.as_bytes());
    let rows = reader
        .records()
        .map(|row| row.expect("valid row").iter().map(str::to_owned).collect())
        .collect();
    (text, rows)
}

// =============================================================================
// CSV Export
// =============================================================================

#[test]
fn when_records_are_exported_file_has_bom_header_and_formatted_cells() {
    // Given: One enriched record and one degraded record
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("financial_data.csv");

    let mut enriched = record("AAA", "2024", "1");
    enriched.date_asof = String::from("2024-03-31");
    enriched.metrics.total_assets = 1_234_567.89;
    enriched.metrics.total_liabilities = 1234.5;
    enriched.metrics.roe = 12.345_678_9;
    enriched.price = Some(price(json!({"close": 34.25, "marketCap": 2_500_000.0, "pe": "N/A"})));
    let degraded = record("AAA", "2023", "4");

    // When: The records are written with canonical headers
    let rows_written = write_csv(&path, &[enriched, degraded], HeaderLocale::Canonical)
        .expect("export succeeds");

    // Then: The file starts with a BOM and has a header plus two data rows
    let (text, rows) = read_rows(&path);
    assert!(text.starts_with('\u{feff}'));
    assert_eq!(rows_written, 2);
    assert_eq!(rows.len(), 3);

    let header = &rows[0];
    let expected_header: Vec<String> = columns().into_iter().map(str::to_owned).collect();
    assert_eq!(header, &expected_header);

    let cell = |row: &Vec<String>, column: &str| {
        let index = header.iter().position(|c| c == column).expect("column exists");
        row[index].clone()
    };
    let first = &rows[1];
    assert_eq!(cell(first, "Symbol"), "AAA");
    assert_eq!(cell(first, "DateAsof"), "2024-03-31");
    assert_eq!(cell(first, "TotalAssets"), "1234568");
    assert_eq!(cell(first, "TotalLiabilities"), "1234.50");
    assert_eq!(cell(first, "ROE"), "12.3457");
    assert_eq!(cell(first, "EpsQuarter"), "0");
    assert_eq!(cell(first, "price_close"), "34.2500");
    assert_eq!(cell(first, "price_marketCap"), "2500000");
    assert_eq!(cell(first, "price_pe"), "N/A");
    assert_eq!(cell(first, "price_high"), "");

    // And: The degraded record has every price cell empty
    let second = &rows[2];
    assert_eq!(cell(second, "Quarter"), "4");
    for column in header.iter().filter(|c| c.starts_with("price_")) {
        assert_eq!(cell(second, column.as_str()), "", "{column} should be empty");
    }
}

#[test]
fn when_thai_headers_are_requested_mapped_columns_are_localized() {
    // Given: A single record
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("thai.csv");

    // When: The export uses Thai headers
    write_csv(&path, &[record("PTT", "2024", "2")], HeaderLocale::Thai).expect("export");

    // Then: Known columns are translated and the rest keep canonical names
    let (_, rows) = read_rows(&path);
    let header = &rows[0];
    assert_eq!(header[0], "หุ้น");
    assert_eq!(header[1], "ปี");
    assert_eq!(header[2], "ไตรมาส");
    assert_eq!(header[3], "DateAsof");
    assert!(header.contains(&String::from("ราคาปิด")));
    assert!(header.contains(&String::from("PaidupShareCapital")));
}

#[test]
fn when_there_are_no_records_export_fails_without_creating_a_file() {
    // Given: An empty record set
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("empty.csv");

    // When: Export is attempted
    let result = write_csv(&path, &[], HeaderLocale::Canonical);

    // Then: It is rejected and nothing is written
    assert!(matches!(result, Err(CoreError::EmptyExport)));
    assert!(!path.exists());
}

// =============================================================================
// Diagnostics File
// =============================================================================

#[test]
fn diagnostics_file_has_timestamped_header_and_one_line_per_failure() {
    // Given: Two drained failures
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fetch_errors.log");
    let at = UtcDateTime::parse("2024-06-01T08:30:05Z").expect("valid timestamp");
    let run_id = Uuid::new_v4();
    let failures = vec![
        FailureEntry {
            key: String::from("AAA-price"),
            reason: String::from("Q4/2023: upstream returned status 500"),
        },
        FailureEntry {
            key: String::from("BBB"),
            reason: String::from("statements fetch for BBB failed: upstream returned status 500"),
        },
    ];

    // When: The diagnostics file is written
    write_diagnostics(&path, run_id, at, &failures).expect("written");

    // Then: The header names the time and run, followed by key: reason lines
    let text = std::fs::read_to_string(&path).expect("readable");
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(
        lines[0],
        format!("--- fetch errors 2024-06-01 08:30:05 run {run_id} ---")
    );
    assert_eq!(lines[1], "AAA-price: Q4/2023: upstream returned status 500");
    assert_eq!(
        lines[2],
        "BBB: statements fetch for BBB failed: upstream returned status 500"
    );
}

#[test]
fn diagnostics_file_is_written_even_for_a_clean_run() {
    // Given: No failures
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("fetch_errors.log");

    // When: The diagnostics file is written
    write_diagnostics(&path, Uuid::nil(), UtcDateTime::now(), &[]).expect("written");

    // Then: Only the header line is present
    let text = std::fs::read_to_string(&path).expect("readable");
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with("--- fetch errors "));
}
