//! Caller-supplied merge data
//!
//! Values keep the dynamic type they were decoded with so the validator can
//! check them against a field's declared type, and so substitution can render
//! them with one total function.

use chrono::NaiveDate;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::parse::normalize_key;

/// One merge value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MergeValue {
    /// JSON `null`
    Null,
    /// JSON boolean
    Bool(bool),
    /// JSON number (always decoded as floating point)
    Number(f64),
    /// JSON string
    String(String),
    /// Already-structured calendar date
    Date(NaiveDate),
    /// JSON array
    Array(Vec<MergeValue>),
    /// JSON object
    Object(MergeData),
}

impl MergeValue {
    /// Short type label used in validation messages
    #[must_use = "returns the type label"]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Whether this is `Null`
    #[inline]
    #[must_use = "returns whether the value is null"]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Render as document text
    ///
    /// Numbers and booleans use a locale-independent form (`30`, `2.5`,
    /// `true`); dates use `YYYY-MM-DD`; arrays and objects render as compact
    /// JSON; `Null` renders as the empty string.
    #[must_use = "returns the rendered text"]
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Array(_) | Self::Object(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }
}

impl fmt::Display for MergeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for MergeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for MergeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for MergeValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for MergeValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<bool> for MergeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<NaiveDate> for MergeValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

/// Field name -> value mapping in insertion order
///
/// Keys keep the case the caller supplied. [`insert`](Self::insert) follows the
/// same first-win rule as the JSON parser: a key whose case-folded form is
/// already present is rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeData {
    entries: Vec<(String, MergeValue)>,
    /// Case-folded key -> position in `entries`
    index: HashMap<String, usize>,
}

impl MergeData {
    /// Create empty merge data
    #[inline]
    #[must_use = "creates empty merge data"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value unless a case-insensitively equal key already exists
    ///
    /// Returns `true` if the value was stored.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MergeValue>) -> bool {
        let key = key.into();
        let folded = normalize_key(&key);
        if self.index.contains_key(&folded) {
            return false;
        }
        self.index.insert(folded, self.entries.len());
        self.entries.push((key, value.into()));
        true
    }

    /// Exact-key lookup
    #[must_use = "returns the value for the key"]
    pub fn get(&self, key: &str) -> Option<&MergeValue> {
        self.entry_ignore_case(key)
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Case-insensitive lookup
    ///
    /// At most one stored key folds to any given form, so an exact match and
    /// a case-folded match always name the same entry.
    #[must_use = "returns the value for the key"]
    pub fn get_ignore_case(&self, key: &str) -> Option<&MergeValue> {
        self.entry_ignore_case(key).map(|(_, v)| v)
    }

    /// Whether a case-insensitively equal key exists
    #[must_use = "returns whether the key exists"]
    pub fn contains_key_ignore_case(&self, key: &str) -> bool {
        self.index.contains_key(&normalize_key(key))
    }

    fn entry_ignore_case(&self, key: &str) -> Option<&(String, MergeValue)> {
        self.index
            .get(&normalize_key(key))
            .and_then(|&position| self.entries.get(position))
    }

    /// String value for an exact key
    #[must_use = "returns the string value"]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(MergeValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Numeric value for an exact key
    #[must_use = "returns the numeric value"]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(MergeValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    /// Boolean value for an exact key
    #[must_use = "returns the boolean value"]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(MergeValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MergeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries
    #[inline]
    #[must_use = "returns the entry count"]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries
    #[inline]
    #[must_use = "returns whether the data is empty"]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for MergeData
where
    K: Into<String>,
    V: Into<MergeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut data = Self::new();
        for (k, v) in iter {
            data.insert(k, v);
        }
        data
    }
}

impl Serialize for MergeData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
