//! Merge data validation against a field set

use crate::model::{FieldType, MergeField, MergeFieldSet};
use crate::value::{MergeData, MergeValue};
use chrono::NaiveDate;
use log::debug;
use serde::Serialize;

/// Outcome of checking merge data against a field set
///
/// `valid` is `false` exactly when `errors` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// Whether the data may be merged
    pub valid: bool,
    /// Human-readable problems, in discovery order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Non-fatal notes (duplicate keys in the raw data)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Required fields with no matching data key
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            missing_fields: Vec::new(),
        }
    }
}

impl ValidationResult {
    fn push_error(&mut self, message: String) {
        self.valid = false;
        self.errors.push(message);
    }

    /// Append one warning per duplicate key reported by
    /// [`detect_duplicates`](crate::parse::detect_duplicates)
    pub fn add_duplicate_warnings(&mut self, duplicates: &[String]) {
        self.warnings.extend(duplicates.iter().map(|key| {
            format!("Duplicate key '{key}' detected in JSON data (first occurrence kept)")
        }));
    }
}

impl MergeFieldSet {
    /// Check merge data against this field set
    ///
    /// Every required field must have a case-insensitively matching key.
    /// Each data key that names a field has its value checked against the
    /// field's type; keys naming no field are ignored. All problems are
    /// collected rather than stopping at the first.
    #[must_use = "returns the validation outcome"]
    pub fn validate(&self, data: &MergeData) -> ValidationResult {
        let mut result = ValidationResult::default();

        for field in self.required_fields() {
            if !data.contains_key_ignore_case(field.name()) {
                result.missing_fields.push(field.name().to_string());
                result.push_error(format!("Required field '{}' is missing", field.name()));
            }
        }

        for (key, value) in data.iter() {
            let Some(field) = self.get(key) else {
                continue;
            };
            if let Err(reason) = check_value(field, value) {
                result.push_error(format!("Invalid value for field '{key}': {reason}"));
            }
        }

        debug!(
            "Validated {} data keys against {} fields: {} errors",
            data.len(),
            self.len(),
            result.errors.len()
        );
        result
    }
}

fn check_value(field: &MergeField, value: &MergeValue) -> std::result::Result<(), String> {
    if value.is_null() {
        return if field.is_required() {
            Err("field is required but value is null".to_string())
        } else {
            Ok(())
        };
    }

    match (field.field_type(), value) {
        (FieldType::String, MergeValue::String(_))
        | (FieldType::Number, MergeValue::Number(_))
        | (FieldType::Date, MergeValue::Date(_))
        | (FieldType::Boolean, MergeValue::Bool(_))
        | (FieldType::Image | FieldType::Table | FieldType::Unknown, _) => Ok(()),
        (FieldType::Date, MergeValue::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(|_| ())
            .map_err(|e| format!("invalid date format: {e}")),
        (FieldType::Date, other) => Err(format!(
            "expected date string or date, got {}",
            other.type_name()
        )),
        (expected, other) => Err(format!("expected {expected}, got {}", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DEFAULT_DOCUMENT_NAME;

    fn field(name: &str, field_type: FieldType, required: bool) -> MergeField {
        MergeField::new(name)
            .unwrap()
            .with_type(field_type)
            .with_required(required)
    }

    fn sample_set() -> MergeFieldSet {
        MergeFieldSet::new(
            vec![
                field("FirstName", FieldType::String, true),
                field("Age", FieldType::Number, false),
                field("Email", FieldType::String, true),
                field("BirthDate", FieldType::Date, false),
                field("Active", FieldType::Boolean, false),
            ],
            DEFAULT_DOCUMENT_NAME,
        )
    }

    #[test]
    fn test_valid_data() {
        let data: MergeData = [
            ("FirstName", MergeValue::from("John")),
            ("Age", MergeValue::from(30)),
            ("Email", MergeValue::from("john@example.com")),
            ("BirthDate", MergeValue::from("1990-01-15")),
            ("Active", MergeValue::from(true)),
        ]
        .into_iter()
        .collect();
        let result = sample_set().validate(&data);
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_missing_required_field() {
        let data: MergeData = [("FirstName", "John")].into_iter().collect();
        let result = sample_set().validate(&data);
        assert!(!result.valid);
        assert_eq!(result.missing_fields, vec!["Email"]);
        assert!(result.errors.iter().any(|e| e.contains("'Email'")));
    }

    #[test]
    fn test_required_field_matched_case_insensitively() {
        let data: MergeData = [("firstname", "John"), ("EMAIL", "j@x")].into_iter().collect();
        let result = sample_set().validate(&data);
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn test_type_mismatches_all_collected() {
        let data: MergeData = [
            ("FirstName", MergeValue::from(42)),
            ("Email", MergeValue::from("a@b")),
            ("Age", MergeValue::from("thirty")),
            ("BirthDate", MergeValue::from("15/01/1990")),
            ("Active", MergeValue::from("yes")),
        ]
        .into_iter()
        .collect();
        let result = sample_set().validate(&data);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 4);
        assert_eq!(
            result.errors[0],
            "Invalid value for field 'FirstName': expected string, got number"
        );
        assert!(result.errors[2].contains("invalid date format"));
        assert!(result.errors[3].contains("expected boolean"));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let set = MergeFieldSet::new(
            vec![field("x", FieldType::String, false)],
            DEFAULT_DOCUMENT_NAME,
        );
        let data: MergeData = [("x", "1"), ("extra", "2")].into_iter().collect();
        let result = set.validate(&data);
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_required_field_with_empty_data() {
        let set = MergeFieldSet::new(
            vec![field("x", FieldType::String, true)],
            DEFAULT_DOCUMENT_NAME,
        );
        let result = set.validate(&MergeData::new());
        assert!(!result.valid);
        assert_eq!(result.missing_fields, vec!["x"]);
        assert!(result.errors.iter().any(|e| e.contains('x')));
    }

    #[test]
    fn test_null_values() {
        let set = MergeFieldSet::new(
            vec![
                field("opt", FieldType::Number, false),
                field("req", FieldType::String, true),
            ],
            DEFAULT_DOCUMENT_NAME,
        );
        let data: MergeData = [("opt", MergeValue::Null), ("req", MergeValue::Null)]
            .into_iter()
            .collect();
        let result = set.validate(&data);
        assert!(!result.valid);
        assert!(result.missing_fields.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("'req'"));
    }

    #[test]
    fn test_structured_date_and_untyped_fields() {
        let set = MergeFieldSet::new(
            vec![
                field("when", FieldType::Date, false),
                field("logo", FieldType::Image, false),
            ],
            DEFAULT_DOCUMENT_NAME,
        );
        let mut data = MergeData::new();
        data.insert("when", NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        data.insert("logo", 7);
        assert!(set.validate(&data).valid);

        let mut bad = MergeData::new();
        bad.insert("when", 20_240_229);
        let result = set.validate(&bad);
        assert!(result.errors[0].contains("expected date string"));
    }

    #[test]
    fn test_duplicate_warnings() {
        let mut result = ValidationResult::default();
        result.add_duplicate_warnings(&["name".to_string()]);
        assert!(result.valid);
        assert_eq!(
            result.warnings,
            vec!["Duplicate key 'name' detected in JSON data (first occurrence kept)"]
        );
    }

    #[test]
    fn test_serialize_omits_empty_lists() {
        let json = serde_json::to_value(ValidationResult::default()).unwrap();
        assert_eq!(json, serde_json::json!({ "valid": true }));
    }
}
