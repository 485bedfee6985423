/// Metadata values and validated metadata filters.
///
/// Filters are structured objects: keys are checked once at construction and
/// values are only ever bound as query parameters by the store.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

/// A scalar metadata value. Nested arrays and objects are not representable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// String-keyed scalar map attached to every fragment.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Keys must match `[A-Za-z0-9_]+`.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A set of exact-match metadata predicates whose keys have been validated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    predicates: Metadata,
}

impl MetadataFilter {
    /// Validate every key, failing on the first malformed one.
    pub fn new(predicates: Metadata) -> Result<Self> {
        if let Some(bad) = predicates.keys().find(|k| !is_valid_key(k)) {
            return Err(MemoryError::InvalidFilterKey { key: bad.clone() });
        }
        Ok(Self { predicates })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.predicates.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn as_metadata(&self) -> &Metadata {
        &self.predicates
    }

    /// True when `metadata` contains every predicate with an equal value of
    /// the same type (superset containment).
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.predicates
            .iter()
            .all(|(k, v)| metadata.get(k).is_some_and(|stored| stored == v))
    }

    /// SQLite JSON path addressing `key` inside the stored metadata object.
    pub(crate) fn json_path(key: &str) -> String {
        format!("$.\"{key}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, MetadataValue)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn accepts_word_keys() {
        let f = MetadataFilter::new(meta(&[
            ("topic", "sports".into()),
            ("user_id", 7i64.into()),
            ("V2", true.into()),
        ]))
        .unwrap();
        assert_eq!(f.iter().count(), 3);
    }

    #[test]
    fn rejects_injection_shaped_keys() {
        for key in ["bad key!", "a'b", "x) OR 1=1 --", "", "näme", "a.b"] {
            let err = MetadataFilter::new(meta(&[(key, "v".into())])).unwrap_err();
            match err {
                MemoryError::InvalidFilterKey { key: k } => assert_eq!(k, key),
                other => panic!("unexpected error for {key:?}: {other}"),
            }
        }
    }

    #[test]
    fn superset_containment() {
        let f = MetadataFilter::new(meta(&[("topic", "sports".into())])).unwrap();
        assert!(f.matches(&meta(&[
            ("topic", "sports".into()),
            ("lang", "en".into())
        ])));
        assert!(!f.matches(&meta(&[("topic", "finance".into())])));
        assert!(!f.matches(&meta(&[("lang", "en".into())])));
        assert!(MetadataFilter::empty().matches(&Metadata::new()));
    }

    #[test]
    fn type_sensitive_equality() {
        let f = MetadataFilter::new(meta(&[("n", 1i64.into())])).unwrap();
        assert!(!f.matches(&meta(&[("n", "1".into())])));
        assert!(!f.matches(&meta(&[("n", true.into())])));
    }

    #[test]
    fn untagged_scalars_deserialize() {
        let m: Metadata =
            serde_json::from_str(r#"{"s":"x","i":3,"f":1.5,"b":false}"#).unwrap();
        assert_eq!(m["s"], MetadataValue::String("x".into()));
        assert_eq!(m["i"], MetadataValue::Integer(3));
        assert_eq!(m["f"], MetadataValue::Float(1.5));
        assert_eq!(m["b"], MetadataValue::Bool(false));
    }

    #[test]
    fn nested_values_rejected() {
        assert!(serde_json::from_str::<Metadata>(r#"{"a":{"b":1}}"#).is_err());
        assert!(serde_json::from_str::<Metadata>(r#"{"a":[1,2]}"#).is_err());
    }
}
