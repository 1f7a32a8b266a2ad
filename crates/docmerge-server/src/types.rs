//! API request and response types

use docmerge_core::{MergeData, MergeReport, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::collections::BTreeMap;

/// Body of both document endpoints
#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    /// Base64-encoded DOCX
    #[serde(default)]
    pub docx: String,
    /// Merge values, kept as raw JSON text so duplicate keys reach the
    /// first-win parser intact
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Server version
    pub version: String,
}

/// Field detection response
#[derive(Debug, Clone, Serialize)]
pub struct DetectResponse {
    /// Field names in order of first appearance
    pub fields: Vec<String>,
    /// Number of fields
    pub count: usize,
    /// Every field name mapped to an empty value, ready to fill in
    pub data_template: BTreeMap<String, String>,
}

impl DetectResponse {
    /// Build a response from discovered field names
    #[must_use]
    pub fn new(fields: Vec<String>) -> Self {
        let data_template = fields
            .iter()
            .map(|name| (name.clone(), String::new()))
            .collect();
        Self {
            count: fields.len(),
            fields,
            data_template,
        }
    }
}

/// Merge response
///
/// On validation failure `docx` and `skipped_fields` are absent and the
/// response is sent with status 400.
#[derive(Debug, Clone, Serialize)]
pub struct MergeResponse {
    /// Field names in order of first appearance
    pub fields: Vec<String>,
    /// Number of fields
    pub count: usize,
    /// Validation outcome including duplicate-key warnings
    pub validation: ValidationResult,
    /// Merge data as parsed (first occurrence of each key)
    pub merge_data: MergeData,
    /// Base64-encoded merged DOCX
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docx: Option<String>,
    /// Fields that had no data and were left as-is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_fields: Option<Vec<String>>,
}

impl MergeResponse {
    /// Build a response from a core report and the encoded output, if any
    #[must_use]
    pub fn new(report: MergeReport, docx: Option<String>) -> Self {
        let skipped_fields = report.merged.map(|merged| merged.skipped);
        Self {
            fields: report.fields,
            count: report.count,
            validation: report.validation,
            merge_data: report.merge_data,
            docx,
            skipped_fields,
        }
    }
}

/// Error envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}
