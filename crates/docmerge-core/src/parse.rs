//! Duplicate-key tolerant JSON object parsing
//!
//! `serde_json` rejects nothing when an object repeats a key; decoding into a
//! map simply keeps the last value. Merge data needs the opposite rule (first
//! occurrence wins, case-insensitively) and a report of which keys repeated,
//! so both operations walk the object's entries with a custom visitor.

use crate::error::Result;
use crate::value::{MergeData, MergeValue};
use serde::de::{self, Deserialize, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use std::collections::HashSet;
use std::fmt;

/// Case-fold a key for comparison
///
/// Shared by the parser, the validator, and the merge engine so that
/// `FirstName` and `firstname` name the same field everywhere.
#[inline]
#[must_use = "returns the normalized key"]
pub fn normalize_key(key: &str) -> String {
    key.to_lowercase()
}

/// List keys that repeat (case-insensitively) in a JSON object
///
/// One entry is produced per repeated occurrence, in source order, with the
/// key spelled as it appears at that occurrence. Values are skipped without
/// being decoded. Malformed input, empty input, or a top-level value that is
/// not an object all yield an empty list.
#[must_use = "returns the duplicate keys"]
pub fn detect_duplicates(raw: &[u8]) -> Vec<String> {
    let mut de = serde_json::Deserializer::from_slice(raw);
    match (&mut de).deserialize_map(DuplicateScan) {
        Ok(duplicates) if de.end().is_ok() => duplicates,
        _ => Vec::new(),
    }
}

/// Parse a JSON object keeping the first occurrence of each key
///
/// Keys are compared case-folded; the stored key keeps the spelling of its
/// first occurrence. Later values for an already-seen key are skipped
/// structurally. Nested objects follow the same rule.
///
/// # Errors
///
/// Returns `MalformedData` if the input is not exactly one well-formed JSON
/// object.
pub fn parse_first_win(raw: &[u8]) -> Result<MergeData> {
    let mut de = serde_json::Deserializer::from_slice(raw);
    let data = MergeData::deserialize(&mut de)?;
    de.end()?;
    Ok(data)
}

struct DuplicateScan;

impl<'de> Visitor<'de> for DuplicateScan {
    type Value = Vec<String>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        while let Some(key) = map.next_key::<String>()? {
            if !seen.insert(normalize_key(&key)) {
                duplicates.push(key);
            }
            map.next_value::<IgnoredAny>()?;
        }
        Ok(duplicates)
    }
}

struct FirstWinObject;

impl<'de> Visitor<'de> for FirstWinObject {
    type Value = MergeData;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
        let mut data = MergeData::new();
        while let Some(key) = map.next_key::<String>()? {
            if data.contains_key_ignore_case(&key) {
                map.next_value::<IgnoredAny>()?;
            } else {
                let value = map.next_value::<MergeValue>()?;
                data.insert(key, value);
            }
        }
        Ok(data)
    }
}

impl<'de> Deserialize<'de> for MergeData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(FirstWinObject)
    }
}

struct AnyValue;

impl<'de> Visitor<'de> for AnyValue {
    type Value = MergeValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Self::Value, E> {
        Ok(MergeValue::Bool(v))
    }

    #[allow(clippy::cast_precision_loss)] // JSON numbers are decoded as f64
    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
        Ok(MergeValue::Number(v as f64))
    }

    #[allow(clippy::cast_precision_loss)] // JSON numbers are decoded as f64
    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
        Ok(MergeValue::Number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Self::Value, E> {
        Ok(MergeValue::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
        Ok(MergeValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Self::Value, E> {
        Ok(MergeValue::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(MergeValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(MergeValue::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element::<MergeValue>()? {
            items.push(item);
        }
        Ok(MergeValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> std::result::Result<Self::Value, A::Error> {
        FirstWinObject.visit_map(map).map(MergeValue::Object)
    }
}

impl<'de> Deserialize<'de> for MergeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(AnyValue)
    }
}
