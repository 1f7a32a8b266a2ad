//! Error types for merge-field operations

use std::io;
use thiserror::Error;

/// Errors that can occur while opening, inspecting, or merging a document
#[derive(Error, Debug)]
pub enum MergeError {
    /// Input does not start with the ZIP magic bytes
    #[error("Input is not a ZIP archive")]
    NotAnArchive,

    /// ZIP container could not be opened or one of its members could not be read
    #[error("Malformed archive: {0}")]
    MalformedArchive(#[source] zip::result::ZipError),

    /// A single archive member exceeds the per-member size cap
    #[error("Archive member '{name}' is too large ({size} bytes, max {max} bytes)")]
    MemberTooLarge {
        /// Member path within the archive
        name: String,
        /// Declared uncompressed size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// Members together decompress past the whole-archive size cap
    #[error("Archive is too large when decompressed (over {max} bytes)")]
    ArchiveTooLarge {
        /// Bytes decompressed when the cap was hit
        size: u64,
        /// Maximum allowed total size
        max: u64,
    },

    /// Requested member is absent from the archive
    #[error("{0} not found in DOCX file")]
    MemberNotFound(String),

    /// Archive opened but lacks the structure of a word-processing document
    #[error("Not a valid DOCX document: {0}")]
    NotADocument(String),

    /// Caller-supplied merge data is not a well-formed JSON object
    #[error("Failed to parse merge data: {0}")]
    MalformedData(#[from] serde_json::Error),

    /// A merge field was constructed with an empty name
    #[error("Merge field name must not be empty")]
    EmptyFieldName,

    /// The rebuilt archive could not be serialized
    #[error("Failed to rebuild DOCX archive: {0}")]
    Rebuild(#[source] zip::result::ZipError),

    /// I/O error while writing the rebuilt archive
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse classification of [`MergeError`] for callers that map failures
/// onto transport-level status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller input (document or data) could not be parsed at all
    MalformedInput,
    /// Document parsed as an archive but is missing required parts
    NotADocument,
    /// Unexpected failure inside the service
    Internal,
}

impl MergeError {
    /// Classify this error
    #[inline]
    #[must_use = "returns the error classification"]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAnArchive
            | Self::MalformedArchive(_)
            | Self::MemberTooLarge { .. }
            | Self::ArchiveTooLarge { .. }
            | Self::MalformedData(_) => ErrorKind::MalformedInput,
            Self::MemberNotFound(_) | Self::NotADocument(_) => ErrorKind::NotADocument,
            Self::EmptyFieldName | Self::Rebuild(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Result type for merge-field operations
pub type Result<T> = std::result::Result<T, MergeError>;
