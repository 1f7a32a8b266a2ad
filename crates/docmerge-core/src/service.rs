//! Detect and merge flows
//!
//! These are the two operations a front end (HTTP handler or CLI) exposes.
//! Both take already-decoded document bytes; transport encodings stay at
//! the boundary.

use crate::archive::{has_zip_signature, DocxArchive};
use crate::error::{MergeError, Result};
use crate::extract::extract_fields;
use crate::merge::perform_merge;
use crate::parse::{detect_duplicates, parse_first_win};
use crate::validate::ValidationResult;
use crate::value::MergeData;
use log::{debug, info};
use serde::Serialize;

/// Open document bytes and check that they form a usable DOCX package
///
/// # Errors
///
/// - `NotAnArchive` if the bytes do not start with the ZIP signature
/// - `MalformedArchive` / `MemberTooLarge` if the container cannot be read
/// - `NotADocument` if required parts or the main content type are missing
pub fn load_document(bytes: &[u8]) -> Result<DocxArchive> {
    if !has_zip_signature(bytes) {
        return Err(MergeError::NotAnArchive);
    }
    let archive = DocxArchive::open(bytes)?;
    if let Some(problem) = archive.structure_problem() {
        return Err(MergeError::NotADocument(problem));
    }
    debug!("Loaded DOCX with {} members", archive.len());
    Ok(archive)
}

/// Fields discovered in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectReport {
    /// Field names in order of first appearance
    pub fields: Vec<String>,
    /// Number of fields
    pub count: usize,
}

/// Discover the merge fields of a document
///
/// # Errors
///
/// Fails as [`load_document`] does.
pub fn detect(bytes: &[u8]) -> Result<DetectReport> {
    let archive = load_document(bytes)?;
    let fields = extract_fields(&archive)?.field_names();
    info!("Detected {} merge fields", fields.len());
    Ok(DetectReport {
        count: fields.len(),
        fields,
    })
}

/// A rebuilt document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedDocument {
    /// DOCX bytes
    pub bytes: Vec<u8>,
    /// Field names that had no data
    pub skipped: Vec<String>,
}

/// Outcome of validating and merging
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeReport {
    /// Field names in order of first appearance
    pub fields: Vec<String>,
    /// Number of fields
    pub count: usize,
    /// Validation outcome, including duplicate-key warnings
    pub validation: ValidationResult,
    /// Parsed merge data (first occurrence of each key)
    pub merge_data: MergeData,
    /// Present only when validation passed
    #[serde(skip)]
    pub merged: Option<MergedDocument>,
}

/// Validate raw JSON merge data against a document and merge it if valid
///
/// Duplicate keys in `raw_data` are reported as warnings; the first
/// occurrence of each key is used.
///
/// # Errors
///
/// Fails as [`load_document`] does, with `MalformedData` if `raw_data` is
/// not a JSON object, and with `Rebuild`/`Io` if the output archive cannot
/// be written. Validation failures are not errors: they are returned in
/// [`MergeReport::validation`] with `merged` left empty.
pub fn validate_and_merge(bytes: &[u8], raw_data: &[u8]) -> Result<MergeReport> {
    let archive = load_document(bytes)?;
    let field_set = extract_fields(&archive)?;

    let duplicates = detect_duplicates(raw_data);
    let data = parse_first_win(raw_data)?;

    let mut validation = field_set.validate(&data);
    validation.add_duplicate_warnings(&duplicates);

    let merged = if validation.valid {
        let output = perform_merge(&archive, &data)?;
        Some(MergedDocument {
            bytes: output.document,
            skipped: output.skipped,
        })
    } else {
        info!(
            "Validation failed with {} errors, not merging",
            validation.errors.len()
        );
        None
    };

    Ok(MergeReport {
        count: field_set.len(),
        fields: field_set.field_names(),
        validation,
        merge_data: data,
        merged,
    })
}
