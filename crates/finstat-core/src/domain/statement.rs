use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::Date;

use super::period::quarter_end_date;
use super::{PriceSnapshot, Symbol};
use crate::ValidationError;

macro_rules! statement_metrics {
    ($($field:ident => $column:literal),+ $(,)?) => {
        /// Numeric statement fields. Missing, null or non-numeric values decode
        /// to zero.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct StatementMetrics {
            $(
                #[serde(default, deserialize_with = "lenient_f64")]
                pub $field: f64,
            )+
        }

        impl StatementMetrics {
            /// Canonical export column names, in export order.
            pub const COLUMNS: &'static [&'static str] = &[$($column),+];

            /// Field values in [`Self::COLUMNS`] order.
            pub fn values(&self) -> Vec<f64> {
                vec![$(self.$field),+]
            }
        }
    };
}

statement_metrics! {
    total_assets => "TotalAssets",
    total_liabilities => "TotalLiabilities",
    paidup_share_capital => "PaidupShareCapital",
    shareholder_equity => "ShareholderEquity",
    total_equity => "TotalEquity",
    total_revenue_quarter => "TotalRevenueQuarter",
    total_revenue_accum => "TotalRevenueAccum",
    total_expenses_quarter => "TotalExpensesQuarter",
    total_expenses_accum => "TotalExpensesAccum",
    ebit_quarter => "EbitQuarter",
    ebit_accum => "EbitAccum",
    net_profit_quarter => "NetProfitQuarter",
    net_profit_accum => "NetProfitAccum",
    eps_quarter => "EpsQuarter",
    eps_accum => "EpsAccum",
    operating_cash_flow => "OperatingCashFlow",
    investing_cash_flow => "InvestingCashFlow",
    financing_cash_flow => "FinancingCashFlow",
    roe => "ROE",
    roa => "ROA",
    net_profit_margin_quarter => "NetProfitMarginQuarter",
    net_profit_margin_accum => "NetProfitMarginAccum",
    de => "DE",
    fixed_asset_turnover => "FixedAssetTurnover",
    total_asset_turnover => "TotalAssetTurnover",
}

/// One financial statement for a (symbol, year, quarter).
///
/// Year and quarter are kept as the labels the statement endpoint returned;
/// numeric interpretation happens only where ordering or dates need it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementRecord {
    pub symbol: Symbol,
    #[serde(deserialize_with = "string_or_number")]
    pub year: String,
    #[serde(deserialize_with = "string_or_number")]
    pub quarter: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub financial_statement_type: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub date_asof: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub account_period: String,
    #[serde(flatten)]
    pub metrics: StatementMetrics,
    #[serde(skip_deserializing, default, skip_serializing_if = "Option::is_none")]
    pub price: Option<PriceSnapshot>,
}

impl StatementRecord {
    pub fn new(symbol: Symbol, year: impl Into<String>, quarter: impl Into<String>) -> Self {
        Self {
            symbol,
            year: year.into(),
            quarter: quarter.into(),
            financial_statement_type: String::new(),
            date_asof: String::new(),
            account_period: String::new(),
            metrics: StatementMetrics::default(),
            price: None,
        }
    }

    /// Year label parsed as an integer, `0` when it is not numeric.
    pub fn year_number(&self) -> i64 {
        self.year.trim().parse().unwrap_or(0)
    }

    /// Quarter label parsed as an integer, `0` when it is not numeric.
    pub fn quarter_number(&self) -> i64 {
        self.quarter.trim().parse().unwrap_or(0)
    }

    /// `Q<quarter>/<year>` label used in diagnostics.
    pub fn period_label(&self) -> String {
        format!("Q{}/{}", self.quarter.trim(), self.year.trim())
    }

    /// Date sent to the price endpoint for this statement.
    pub fn quarter_end_date(&self) -> Result<Date, ValidationError> {
        quarter_end_date(&self.year, &self.quarter)
    }

    /// (symbol, year, quarter) with surrounding whitespace ignored.
    pub fn identity(&self) -> (Symbol, String, String) {
        (
            self.symbol.clone(),
            self.year.trim().to_owned(),
            self.quarter.trim().to_owned(),
        )
    }

    pub fn is_enriched(&self) -> bool {
        self.price.is_some()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientNumber {
    Number(f64),
    Text(String),
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<LenientNumber>::deserialize(deserializer)? {
        Some(LenientNumber::Number(value)) => value,
        Some(LenientNumber::Text(text)) => text.trim().parse().unwrap_or(0.0),
        None => 0.0,
    };
    Ok(value)
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!(
            "expected string or number, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_statement_payload_with_mixed_label_types() {
        let payload = json!({
            "symbol": "ptt",
            "year": 2024,
            "quarter": "1",
            "financialStatementType": "C",
            "dateAsof": "2024-03-31",
            "totalAssets": 3_500_000_000.0,
            "roe": "12.5",
            "de": null
        });

        let record: StatementRecord = serde_json::from_value(payload).expect("decodes");

        assert_eq!(record.symbol.as_str(), "PTT");
        assert_eq!(record.year, "2024");
        assert_eq!(record.quarter, "1");
        assert_eq!(record.metrics.total_assets, 3_500_000_000.0);
        assert_eq!(record.metrics.roe, 12.5);
        assert_eq!(record.metrics.de, 0.0);
        assert_eq!(record.metrics.eps_quarter, 0.0);
        assert!(record.price.is_none());
    }

    #[test]
    fn payload_cannot_inject_a_price_snapshot() {
        let payload = json!({
            "symbol": "PTT",
            "year": "2024",
            "quarter": "2",
            "price": {"price_close": 1.0}
        });

        let record: StatementRecord = serde_json::from_value(payload).expect("decodes");

        assert!(record.price.is_none());
    }

    #[test]
    fn null_text_fields_decode_as_empty_and_keep_the_batch() {
        let body = r#"[
            {"symbol":"AAA","year":"2024","quarter":"1","financialStatementType":null,"dateAsof":null,"accountPeriod":null,"totalAssets":1.0},
            {"symbol":"AAA","year":"2023","quarter":"4","financialStatementType":"C","dateAsof":"2023-12-31","accountPeriod":"Q"}
        ]"#;

        let records: Vec<StatementRecord> = serde_json::from_str(body).expect("decodes");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].financial_statement_type, "");
        assert_eq!(records[0].date_asof, "");
        assert_eq!(records[0].account_period, "");
        assert_eq!(records[0].metrics.total_assets, 1.0);
        assert_eq!(records[1].account_period, "Q");
    }

    #[test]
    fn identity_ignores_label_whitespace() {
        let padded = StatementRecord::new(Symbol::parse("AAA").expect("valid"), " 2024 ", "1 ");
        let plain = StatementRecord::new(Symbol::parse("AAA").expect("valid"), "2024", "1");
        assert_eq!(padded.identity(), plain.identity());
    }

    #[test]
    fn non_numeric_labels_fall_back_to_zero() {
        let record = StatementRecord::new(Symbol::parse("AAA").expect("valid"), "n/a", "Q4");
        assert_eq!(record.year_number(), 0);
        assert_eq!(record.quarter_number(), 0);
    }

    #[test]
    fn metric_columns_and_values_line_up() {
        let metrics = StatementMetrics {
            roe: 4.0,
            ..StatementMetrics::default()
        };
        let position = StatementMetrics::COLUMNS
            .iter()
            .position(|column| *column == "ROE")
            .expect("ROE column");

        assert_eq!(StatementMetrics::COLUMNS.len(), 25);
        assert_eq!(metrics.values()[position], 4.0);
    }
}
