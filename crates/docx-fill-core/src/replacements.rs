//! Ordered placeholder -> text mapping.

use std::fmt;

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Placeholders and their replacement text, applied in declaration order.
///
/// Keys compare case-insensitively. Inserting a key that is already present
/// overwrites its value but keeps its original position, so the order in
/// which keys are applied stays the order in which they were first declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplacementSet {
    pairs: Vec<(String, String)>,
}

impl ReplacementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.position(&key) {
            Some(pos) => self.pairs[pos].1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.position(key).map(|pos| self.pairs[pos].1.as_str())
    }

    /// Pairs in application order. Empty keys are never yielded.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs
            .iter()
            .filter(|(k, _)| !k.is_empty())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn position(&self, key: &str) -> Option<usize> {
        let folded = key.to_lowercase();
        self.pairs.iter().position(|(k, _)| k.to_lowercase() == folded)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ReplacementSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for ReplacementSet {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl Serialize for ReplacementSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Accepts either `{"KEY": "text", ...}` (member order kept) or
/// `[["KEY", "text"], ...]`. `null` values become empty text.
impl<'de> Deserialize<'de> for ReplacementSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(SetVisitor)
    }
}

struct SetVisitor;

impl<'de> Visitor<'de> for SetVisitor {
    type Value = ReplacementSet;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of placeholder to text, or a list of [placeholder, text] pairs")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut set = ReplacementSet::new();
        while let Some((key, value)) = map.next_entry::<String, Option<String>>()? {
            set.insert(key, value.unwrap_or_default());
        }
        Ok(set)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut set = ReplacementSet::new();
        while let Some((key, value)) = seq.next_element::<(String, Option<String>)>()? {
            set.insert(key, value.unwrap_or_default());
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reinsert_keeps_position() {
        let mut set = ReplacementSet::new();
        set.insert("CLIENT:", "a");
        set.insert("RUTA:", "b");
        set.insert("client:", "c");
        let pairs: Vec<_> = set.iter().collect();
        assert_eq!(pairs, vec![("CLIENT:", "c"), ("RUTA:", "b")]);
        assert_eq!(set.get("Client:"), Some("c"));
    }

    #[test]
    fn test_empty_keys_are_skipped() {
        let set: ReplacementSet = vec![("", "x"), ("{{Price}}", "10 EUR")].into_iter().collect();
        assert_eq!(set.len(), 1);
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["{{Price}}"]);
    }

    #[test]
    fn test_deserialize_object_keeps_member_order() {
        let set: ReplacementSet =
            serde_json::from_str(r#"{"z": "1", "a": null, "m": "3"}"#).unwrap();
        let pairs: Vec<_> = set.iter().collect();
        assert_eq!(pairs, vec![("z", "1"), ("a", ""), ("m", "3")]);
    }

    #[test]
    fn test_deserialize_pairs() {
        let set: ReplacementSet =
            serde_json::from_str(r#"[["DATA:", "DATA: 01/02/2024"]]"#).unwrap();
        assert_eq!(set.get("data:"), Some("DATA: 01/02/2024"));
    }

    #[test]
    fn test_serialize_as_map() {
        let set = ReplacementSet::new().with("b", "2").with("a", "1");
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"{"b":"2","a":"1"}"#);
    }
}
