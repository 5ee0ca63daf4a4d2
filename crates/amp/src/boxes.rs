use std::collections::{BTreeMap, btree_map};

use bytes::Bytes;

/// Longest key a box may carry.
pub const MAX_KEY_LENGTH: usize = 0xff;
/// Longest value a box may carry.
pub const MAX_VALUE_LENGTH: usize = 0xffff;

/// Error code sent for commands the receiver has no responder for.
pub const UNHANDLED_ERROR_CODE: &str = "UNHANDLED";
/// Error code sent when a responder fails in an unexpected way.
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN";

/// Reserved keys. Everything starting with `_` belongs to the protocol.
pub mod keys {
    pub const COMMAND: &str = "_command";
    pub const ASK: &str = "_ask";
    pub const ANSWER: &str = "_answer";
    pub const ERROR: &str = "_error";
    pub const ERROR_CODE: &str = "_error_code";
    pub const ERROR_DESCRIPTION: &str = "_error_description";

    pub fn is_reserved(key: &str) -> bool {
        key.starts_with('_')
    }
}

/// One AMP message: an unordered set of byte-string key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmpBox {
    entries: BTreeMap<String, Bytes>,
}

impl AmpBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Option<Bytes> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.entries.get(key)
    }

    /// The value for `key`, if present and valid UTF-8.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn remove(&mut self, key: &str) -> Option<Bytes> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Bytes> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Bytes>> FromIterator<(K, V)> for AmpBox {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a AmpBox {
    type IntoIter = btree_map::Iter<'a, String, Bytes>;
    type Item = (&'a String, &'a Bytes);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn get_str_requires_utf8() {
        let mut amp_box = AmpBox::new();
        amp_box.insert("name", "zoë");
        amp_box.insert("raw", Bytes::from_static(&[0xff, 0xfe]));
        assert_eq!(amp_box.get_str("name"), Some("zoë"));
        assert_eq!(amp_box.get_str("raw"), None);
        assert_eq!(amp_box.get_str("missing"), None);
    }

    #[test]
    fn later_insert_wins() {
        let mut amp_box: AmpBox = [("a", "1")].into_iter().collect();
        assert_eq!(amp_box.insert("a", "2"), Some(Bytes::from_static(b"1")));
        assert_eq!(amp_box.len(), 1);
        assert_eq!(amp_box.get_str("a"), Some("2"));
    }

    #[test]
    fn reserved_keys() {
        assert!(keys::is_reserved(keys::COMMAND));
        assert!(keys::is_reserved("_anything"));
        assert!(!keys::is_reserved("sum"));
    }
}
