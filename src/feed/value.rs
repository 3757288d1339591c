use chrono::{DateTime, Utc};

/// A node of a normalized feed entry.
///
/// The parser boundary converts every `feed-rs` entry into this tree so that
/// downstream code (date filtering, HTML cleanup, flattening) never needs to
/// know which feed format the entry came from.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedValue {
    /// Any scalar that is emitted as a string (text, numbers, MIME types).
    Scalar(String),
    Bool(bool),
    Null,
    /// Calendar instant, whole seconds.
    Timestamp(DateTime<Utc>),
    Sequence(Vec<FeedValue>),
    Mapping(FeedMap),
}

impl FeedValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FeedValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FeedValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&FeedMap> {
        match self {
            FeedValue::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut FeedMap> {
        match self {
            FeedValue::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key when this value is a mapping.
    pub fn get(&self, key: &str) -> Option<&FeedValue> {
        self.as_mapping().and_then(|m| m.get(key))
    }
}

impl From<&str> for FeedValue {
    fn from(s: &str) -> Self {
        FeedValue::Scalar(s.to_string())
    }
}

impl From<String> for FeedValue {
    fn from(s: String) -> Self {
        FeedValue::Scalar(s)
    }
}

impl From<bool> for FeedValue {
    fn from(b: bool) -> Self {
        FeedValue::Bool(b)
    }
}

impl From<u64> for FeedValue {
    fn from(n: u64) -> Self {
        FeedValue::Scalar(n.to_string())
    }
}

impl From<i64> for FeedValue {
    fn from(n: i64) -> Self {
        FeedValue::Scalar(n.to_string())
    }
}

impl From<DateTime<Utc>> for FeedValue {
    fn from(ts: DateTime<Utc>) -> Self {
        FeedValue::Timestamp(ts)
    }
}

impl<T: Into<FeedValue>> From<Option<T>> for FeedValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FeedValue::Null)
    }
}

impl From<Vec<FeedValue>> for FeedValue {
    fn from(items: Vec<FeedValue>) -> Self {
        FeedValue::Sequence(items)
    }
}

impl From<FeedMap> for FeedValue {
    fn from(map: FeedMap) -> Self {
        FeedValue::Mapping(map)
    }
}

/// Insertion-ordered string-keyed mapping.
///
/// Keys are unique: inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedMap {
    entries: Vec<(String, FeedValue)>,
}

impl FeedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FeedValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Insert only when `value` is `Some`.
    pub fn insert_opt<V: Into<FeedValue>>(&mut self, key: &str, value: Option<V>) {
        if let Some(v) = value {
            self.insert(key, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<&FeedValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut FeedValue> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeedValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<FeedValue>> FromIterator<(K, V)> for FeedMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FeedMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_preserves_order() {
        let mut map = FeedMap::new();
        map.insert("b", "2");
        map.insert("a", "1");
        map.insert("c", "3");

        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_insert_existing_key_replaces_in_place() {
        let mut map = FeedMap::new();
        map.insert("a", "1");
        map.insert("b", "2");
        map.insert("a", "3");

        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a"), Some(&FeedValue::from("3")));
        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_insert_opt_skips_none() {
        let mut map = FeedMap::new();
        map.insert_opt("present", Some("x"));
        map.insert_opt::<&str>("absent", None);

        assert!(map.contains_key("present"));
        assert!(!map.contains_key("absent"));
    }

    #[test]
    fn test_option_none_converts_to_null() {
        let value: FeedValue = Option::<String>::None.into();
        assert_eq!(value, FeedValue::Null);
    }
}
