//! Generic structured record.
//!
//! Rows, search criteria and results all travel as a [`Record`]: an
//! insertion-ordered map from field name to a JSON value (string, number,
//! nested record or list). Query results place the rows in a list under the
//! [`ROOT`] key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Key holding the list of result rows.
pub const ROOT: &str = "root";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, JsonValue>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a result record whose root is the given rows.
    pub fn from_rows(rows: Vec<Record>) -> Self {
        let mut record = Self::new();
        record.set(
            ROOT,
            JsonValue::Array(rows.into_iter().map(|r| JsonValue::Object(r.0)).collect()),
        );
        record
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Set a field, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Option<JsonValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<JsonValue> {
        self.0.shift_remove(key)
    }

    /// Builder-style [`Record::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// True when the field exists and is not null.
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(JsonValue::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(JsonValue::as_i64)
    }

    /// The list of rows under [`ROOT`], if present.
    pub fn root(&self) -> Option<&Vec<JsonValue>> {
        self.get(ROOT).and_then(JsonValue::as_array)
    }

    /// Number of rows under [`ROOT`]; zero when absent.
    pub fn row_count(&self) -> usize {
        self.root().map_or(0, Vec::len)
    }

    /// First row under [`ROOT`], or `None` if the root is absent or empty.
    pub fn first_row(&self) -> Option<Record> {
        self.root()?
            .first()
            .and_then(JsonValue::as_object)
            .map(|m| Record(m.clone()))
    }

    /// Rows under [`ROOT`] as records, skipping non-object entries.
    pub fn rows(&self) -> Vec<Record> {
        self.root()
            .map(|rows| {
                rows.iter()
                    .filter_map(JsonValue::as_object)
                    .map(|m| Record(m.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, JsonValue> {
        self.0
    }
}

impl From<Map<String, JsonValue>> for Record {
    fn from(map: Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

impl From<Record> for JsonValue {
    fn from(record: Record) -> Self {
        JsonValue::Object(record.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_row_of_rows() {
        let rows = vec![
            Record::new().with("id", 1),
            Record::new().with("id", 2),
        ];
        let result = Record::from_rows(rows);
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.first_row().unwrap().get_i64("id"), Some(1));
    }

    #[test]
    fn test_first_row_absent_or_empty() {
        assert!(Record::new().first_row().is_none());
        assert!(Record::from_rows(Vec::new()).first_row().is_none());
    }

    #[test]
    fn test_is_set_treats_null_as_unset() {
        let record = Record::new().with("a", JsonValue::Null).with("b", "x");
        assert!(record.contains("a"));
        assert!(!record.is_set("a"));
        assert!(record.is_set("b"));
        assert!(!record.is_set("c"));
    }

    #[test]
    fn test_preserves_insertion_order() {
        let record = Record::new().with("z", 1).with("a", 2).with("m", 3);
        let keys: Vec<&String> = record.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn test_serde_transparent() {
        let record: Record = serde_json::from_value(json!({"name": "alice"})).unwrap();
        assert_eq!(record.get_str("name"), Some("alice"));
        assert_eq!(serde_json::to_value(&record).unwrap(), json!({"name": "alice"}));
    }
}
