use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix applied to every field of a price row when it is merged into a
/// statement record.
pub const PRICE_FIELD_PREFIX: &str = "price_";

/// One end-of-day price observation matched to a statement's quarter end.
///
/// The schema is open: fields are whatever the price endpoint returned, keyed
/// `price_<field>`. Consumers read by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceSnapshot(BTreeMap<String, Value>);

impl PriceSnapshot {
    /// Builds a snapshot from one decoded price row, prefixing each key.
    pub fn from_row(row: Map<String, Value>) -> Self {
        Self(
            row.into_iter()
                .map(|(key, value)| (format!("{PRICE_FIELD_PREFIX}{key}"), value))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}
