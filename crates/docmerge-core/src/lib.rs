//! Mail-merge for Word (DOCX) documents
//!
//! Discovers merge fields in `word/document.xml`, validates caller data
//! against them, substitutes values and repackages the archive.
//!
//! ```no_run
//! use docmerge_core::{validate_and_merge, Result};
//!
//! fn run(docx: &[u8]) -> Result<()> {
//!     let report = validate_and_merge(docx, br#"{"FirstName": "Ada"}"#)?;
//!     if let Some(merged) = report.merged {
//!         println!("{} bytes, skipped {:?}", merged.bytes.len(), merged.skipped);
//!     }
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod error;
pub mod extract;
pub mod merge;
pub mod model;
pub mod parse;
pub mod service;
pub mod validate;
pub mod value;

pub use archive::{has_zip_signature, ArchiveLimits, DocxArchive};
pub use error::{ErrorKind, MergeError, Result};
pub use extract::{extract_field_names, extract_fields, extract_fields_from};
pub use merge::{perform_merge, replace_field_values, MarkupMerge, MergeOutput};
pub use model::{FieldFormat, FieldType, MergeField, MergeFieldSet};
pub use parse::{detect_duplicates, parse_first_win};
pub use service::{
    detect, load_document, validate_and_merge, DetectReport, MergeReport, MergedDocument,
};
pub use validate::ValidationResult;
pub use value::{MergeData, MergeValue};
