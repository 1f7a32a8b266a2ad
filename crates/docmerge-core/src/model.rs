//! Merge field model
//!
//! A [`MergeFieldSet`] is built once per extraction and never mutated; its
//! case-folded name index is computed at construction.

use crate::error::{MergeError, Result};
use crate::parse::normalize_key;
use crate::value::MergeValue;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Default label for documents whose file name is unknown
pub const DEFAULT_DOCUMENT_NAME: &str = "document.docx";

/// Expected data type of a merge field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Plain text
    #[default]
    String,
    /// Integer or floating-point number
    Number,
    /// `YYYY-MM-DD` date
    Date,
    /// Boolean flag
    Boolean,
    /// Embedded image (not substituted)
    Image,
    /// Repeating table (not substituted)
    Table,
    /// Type could not be determined
    Unknown,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Image => "image",
            Self::Table => "table",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Formatting hints carried with a field
///
/// Recorded for callers; substitution currently inserts plain text only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FieldFormat {
    /// Date pattern (e.g., `%Y-%m-%d`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
    /// Number pattern (e.g., `currency`, `percentage`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_format: Option<String>,
    /// Text transform (`uppercase`, `lowercase`, `title`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_transform: Option<String>,
    /// Text placed before the value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Text placed after the value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

/// A merge field discovered in a document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeField {
    name: String,
    #[serde(rename = "type")]
    field_type: FieldType,
    required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_value: Option<MergeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<FieldFormat>,
}

impl MergeField {
    /// Create an optional string field
    ///
    /// # Errors
    ///
    /// Returns `EmptyFieldName` if `name` is empty.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(MergeError::EmptyFieldName);
        }
        Ok(Self {
            name,
            field_type: FieldType::default(),
            required: false,
            default_value: None,
            format: None,
        })
    }

    /// Set the expected type
    #[must_use = "returns the updated field"]
    pub const fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }

    /// Mark the field required or optional
    #[must_use = "returns the updated field"]
    pub const fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Attach a default value
    #[must_use = "returns the updated field"]
    pub fn with_default(mut self, value: impl Into<MergeValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Attach formatting hints
    #[must_use = "returns the updated field"]
    pub fn with_format(mut self, format: FieldFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Field name as written in the document
    #[inline]
    #[must_use = "returns the field name"]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expected data type
    #[inline]
    #[must_use = "returns the field type"]
    pub const fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Whether the caller must supply a value
    #[inline]
    #[must_use = "returns whether the field is required"]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Default value, if any
    #[inline]
    #[must_use = "returns the default value"]
    pub const fn default_value(&self) -> Option<&MergeValue> {
        self.default_value.as_ref()
    }

    /// Formatting hints, if any
    #[inline]
    #[must_use = "returns the formatting hints"]
    pub const fn format(&self) -> Option<&FieldFormat> {
        self.format.as_ref()
    }
}

impl fmt::Display for MergeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MergeField{{Name: {}, Type: {}, Required: {}}}",
            self.name, self.field_type, self.required
        )
    }
}

/// The merge fields of one document
#[derive(Debug, Clone, Serialize)]
pub struct MergeFieldSet {
    fields: Vec<MergeField>,
    document_name: String,
    extracted_at: DateTime<Utc>,
    total_fields: usize,
    /// Case-folded name -> index of the first field with that name
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl MergeFieldSet {
    /// Build a field set, indexing names case-insensitively (first wins)
    #[must_use = "creates a field set"]
    pub fn new(fields: Vec<MergeField>, document_name: impl Into<String>) -> Self {
        let mut index = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            index.entry(normalize_key(field.name())).or_insert(i);
        }
        Self {
            total_fields: fields.len(),
            fields,
            document_name: document_name.into(),
            extracted_at: Utc::now(),
            index,
        }
    }

    /// All fields in source order
    #[inline]
    #[must_use = "returns the fields"]
    pub fn fields(&self) -> &[MergeField] {
        &self.fields
    }

    /// Field names in source order
    #[must_use = "returns the field names"]
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Fields marked required
    pub fn required_fields(&self) -> impl Iterator<Item = &MergeField> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Case-insensitive lookup; the first field in source order wins
    #[must_use = "returns the matching field"]
    pub fn get(&self, name: &str) -> Option<&MergeField> {
        self.index
            .get(&normalize_key(name))
            .and_then(|&i| self.fields.get(i))
    }

    /// Whether a field with this name exists (case-insensitive)
    #[inline]
    #[must_use = "returns whether the field exists"]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Source document label
    #[inline]
    #[must_use = "returns the document label"]
    pub fn document_name(&self) -> &str {
        &self.document_name
    }

    /// When the fields were extracted
    #[inline]
    #[must_use = "returns the extraction timestamp"]
    pub const fn extracted_at(&self) -> DateTime<Utc> {
        self.extracted_at
    }

    /// Number of fields
    #[inline]
    #[must_use = "returns the field count"]
    pub const fn len(&self) -> usize {
        self.total_fields
    }

    /// Whether the set is empty
    #[inline]
    #[must_use = "returns whether the set is empty"]
    pub const fn is_empty(&self) -> bool {
        self.total_fields == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> MergeField {
        MergeField::new(name).unwrap()
    }

    #[test]
    fn test_new_field_defaults() {
        let f = field("FirstName");
        assert_eq!(f.name(), "FirstName");
        assert_eq!(f.field_type(), FieldType::String);
        assert!(!f.is_required());
        assert!(f.default_value().is_none());
        assert!(f.format().is_none());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(MergeField::new(""), Err(MergeError::EmptyFieldName)));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let set = MergeFieldSet::new(vec![field("FirstName")], DEFAULT_DOCUMENT_NAME);
        assert_eq!(set.get("firstname").map(MergeField::name), Some("FirstName"));
        assert!(set.contains("FIRSTNAME"));
        assert!(!set.contains("LastName"));
    }

    #[test]
    fn test_lookup_first_match_wins() {
        let set = MergeFieldSet::new(
            vec![
                field("Amount").with_type(FieldType::Number),
                field("amount").with_type(FieldType::Date),
            ],
            DEFAULT_DOCUMENT_NAME,
        );
        assert_eq!(set.get("AMOUNT").unwrap().field_type(), FieldType::Number);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_required_fields() {
        let set = MergeFieldSet::new(
            vec![field("a"), field("b").with_required(true)],
            "letter.docx",
        );
        let required: Vec<_> = set.required_fields().map(MergeField::name).collect();
        assert_eq!(required, vec!["b"]);
        assert_eq!(set.document_name(), "letter.docx");
        assert_eq!(set.field_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_display() {
        let f = field("Email").with_required(true);
        assert_eq!(
            f.to_string(),
            "MergeField{Name: Email, Type: string, Required: true}"
        );
    }

    #[test]
    fn test_serialize_shape() {
        let set = MergeFieldSet::new(
            vec![field("Total")
                .with_type(FieldType::Number)
                .with_format(FieldFormat {
                    prefix: Some("$".to_string()),
                    ..FieldFormat::default()
                })],
            DEFAULT_DOCUMENT_NAME,
        );
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["total_fields"], 1);
        assert_eq!(json["fields"][0]["type"], "number");
        assert_eq!(json["fields"][0]["format"]["prefix"], "$");
        assert!(json.get("index").is_none());
    }
}
