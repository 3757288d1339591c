//! Conversion of nested feed entries into flat dotted-path records.
//!
//! `{"links": [{"href": "a"}]}` becomes `{"links.0.href": "a"}`. Timestamps are
//! rendered as `YYYY-MM-DDTHH:MM:SSZ`, booleans and nulls keep their identity,
//! everything else becomes a string.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::value::FeedValue;

/// Format used for every timestamp leaf.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A flattened leaf value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    String(String),
    Bool(bool),
    Null,
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::String(s) => serializer.serialize_str(s),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Null => serializer.serialize_none(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Flat mapping of dotted paths to leaf values.
///
/// Keys are unique; a later insert of an existing key overwrites it in place.
/// Serializes as a JSON object in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedRecord {
    fields: Vec<(String, FieldValue)>,
    index: HashMap<String, usize>,
}

impl FlattenedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: FieldValue) {
        match self.index.get(&key) {
            Some(&pos) => self.fields[pos].1 = value,
            None => {
                self.index.insert(key.clone(), self.fields.len());
                self.fields.push((key, value));
            }
        }
    }

    /// Merge another record into this one, keeping its order.
    pub fn extend(&mut self, other: FlattenedRecord) {
        for (key, value) in other.fields {
            self.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.index.get(key).map(|&pos| &self.fields[pos].1)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Reorder keys lexicographically.
    pub fn sorted(mut self) -> Self {
        self.fields.sort_by(|a, b| a.0.cmp(&b.0));
        self.index = self
            .fields
            .iter()
            .enumerate()
            .map(|(pos, (k, _))| (k.clone(), pos))
            .collect();
        self
    }
}

impl Serialize for FlattenedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Flatten `value` under `prefix`, in traversal order.
///
/// An empty prefix means the top-level keys are used as-is.
pub fn flatten(value: &FeedValue, prefix: &str) -> FlattenedRecord {
    match value {
        FeedValue::Mapping(map) => {
            let mut record = FlattenedRecord::new();
            for (key, child) in map.iter() {
                record.extend(flatten(child, &child_path(prefix, key)));
            }
            record
        }
        FeedValue::Sequence(items) => {
            let mut record = FlattenedRecord::new();
            for (i, child) in items.iter().enumerate() {
                record.extend(flatten(child, &child_path(prefix, &i.to_string())));
            }
            record
        }
        FeedValue::Timestamp(ts) => leaf(prefix, FieldValue::String(format_timestamp(ts))),
        FeedValue::Bool(b) => leaf(prefix, FieldValue::Bool(*b)),
        FeedValue::Null => leaf(prefix, FieldValue::Null),
        FeedValue::Scalar(s) => leaf(prefix, FieldValue::String(s.clone())),
    }
}

/// Flatten `value` and order the keys lexicographically.
pub fn flatten_sorted(value: &FeedValue, prefix: &str) -> FlattenedRecord {
    flatten(value, prefix).sorted()
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn child_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn leaf(path: &str, value: FieldValue) -> FlattenedRecord {
    let mut record = FlattenedRecord::new();
    record.insert(path.to_string(), value);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::value::FeedMap;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn mapping<const N: usize>(pairs: [(&str, FeedValue); N]) -> FeedValue {
        FeedValue::Mapping(pairs.into_iter().collect())
    }

    #[test]
    fn test_flatten_dict() {
        let value = mapping([(
            "list",
            mapping([("one", "uno".into()), ("two", "dos".into())]),
        )]);

        let record = flatten(&value, "");
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("list.one"), Some(&FieldValue::from("uno")));
        assert_eq!(record.get("list.two"), Some(&FieldValue::from("dos")));
    }

    #[test]
    fn test_flatten_dict_sort() {
        let value = mapping([(
            "list",
            mapping([
                ("3", "tres".into()),
                ("1", "uno".into()),
                ("2", "dos".into()),
                ("5", "cinco".into()),
                ("4", "cuatro".into()),
                ("6", "seis".into()),
            ]),
        )]);

        let record = flatten_sorted(&value, "");
        let keys: Vec<&str> = record.keys().collect();
        assert_eq!(
            keys,
            vec!["list.1", "list.2", "list.3", "list.4", "list.5", "list.6"]
        );
        assert_eq!(record.get("list.5"), Some(&FieldValue::from("cinco")));
    }

    #[test]
    fn test_flatten_unsorted_keeps_traversal_order() {
        let value = mapping([("b", "2".into()), ("a", "1".into())]);

        let keys: Vec<String> = flatten(&value, "").keys().map(String::from).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_flatten_list() {
        let value = mapping([(
            "list",
            FeedValue::Sequence(vec!["first".into(), "second".into()]),
        )]);

        let record = flatten(&value, "");
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("list.0"), Some(&FieldValue::from("first")));
        assert_eq!(record.get("list.1"), Some(&FieldValue::from("second")));
    }

    #[test]
    fn test_flatten_none() {
        let value = mapping([("none", FeedValue::Null)]);

        let record = flatten(&value, "");
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("none"), Some(&FieldValue::Null));
    }

    #[test]
    fn test_flatten_int_is_stringified() {
        let value = mapping([("int", 1u64.into())]);

        let record = flatten(&value, "");
        assert_eq!(record.get("int"), Some(&FieldValue::from("1")));
    }

    #[test]
    fn test_flatten_boolean() {
        let value = mapping([("TrueDat", true.into()), ("FalseDat", false.into())]);

        let record = flatten(&value, "");
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("TrueDat"), Some(&FieldValue::Bool(true)));
        assert_eq!(record.get("FalseDat"), Some(&FieldValue::Bool(false)));
    }

    #[test]
    fn test_flatten_time() {
        let ts = Utc.with_ymd_and_hms(2015, 2, 9, 0, 0, 0).unwrap();
        let value = mapping([("time", ts.into())]);

        let record = flatten(&value, "");
        assert_eq!(
            record.get("time"),
            Some(&FieldValue::from("2015-02-09T00:00:00Z"))
        );
    }

    #[test]
    fn test_flatten_with_prefix() {
        let value = mapping([("href", "https://example.com".into())]);

        let record = flatten(&value, "links.0");
        assert_eq!(
            record.get("links.0.href"),
            Some(&FieldValue::from("https://example.com"))
        );
    }

    #[test]
    fn test_flatten_scalar_at_root_uses_prefix() {
        let record = flatten(&"alone".into(), "title");
        assert_eq!(record.get("title"), Some(&FieldValue::from("alone")));
    }

    #[test]
    fn test_flatten_nested_sequence_of_mappings() {
        let value = mapping([(
            "content",
            FeedValue::Sequence(vec![mapping([
                ("type", "text/html".into()),
                ("value", "<p>hi</p>".into()),
            ])]),
        )]);

        let record = flatten_sorted(&value, "");
        let keys: Vec<&str> = record.keys().collect();
        assert_eq!(keys, vec!["content.0.type", "content.0.value"]);
    }

    #[test]
    fn test_colliding_paths_keep_last_value() {
        let mut inner = FeedMap::new();
        inner.insert("b", "nested");
        let value = mapping([("a.b", "dotted".into()), ("a", FeedValue::Mapping(inner))]);

        let record = flatten(&value, "");
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("a.b"), Some(&FieldValue::from("nested")));
    }

    #[test]
    fn test_serialize_preserves_order_and_types() {
        let value = mapping([
            ("title", "Hello".into()),
            ("draft", false.into()),
            ("author", FeedValue::Null),
        ]);

        let json = serde_json::to_string(&flatten(&value, "")).unwrap();
        assert_eq!(json, r#"{"title":"Hello","draft":false,"author":null}"#);
    }

    fn arb_feed_value() -> impl Strategy<Value = FeedValue> {
        let leaf = prop_oneof![
            "[a-z]{0,8}".prop_map(FeedValue::Scalar),
            any::<bool>().prop_map(FeedValue::Bool),
            Just(FeedValue::Null),
            (0i64..4_000_000_000).prop_map(|secs| FeedValue::Timestamp(
                DateTime::from_timestamp(secs, 0).unwrap()
            )),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 1..4).prop_map(FeedValue::Sequence),
                prop::collection::vec(("[a-z]{1,4}", inner), 1..4)
                    .prop_map(|pairs| FeedValue::Mapping(pairs.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_sorted_keys_are_ascending(value in arb_feed_value()) {
            let record = flatten_sorted(&value, "root");
            let keys: Vec<&str> = record.keys().collect();
            let mut expected = keys.clone();
            expected.sort();
            prop_assert_eq!(keys, expected);
        }

        #[test]
        fn prop_sorting_does_not_change_contents(value in arb_feed_value()) {
            let plain = flatten(&value, "root");
            let sorted = flatten_sorted(&value, "root");
            prop_assert_eq!(plain.len(), sorted.len());
            for (key, field) in plain.iter() {
                prop_assert_eq!(sorted.get(key), Some(field));
            }
        }
    }
}
