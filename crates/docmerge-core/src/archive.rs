//! DOCX container handling
//!
//! DOCX files are ZIP archives containing:
//! - `word/document.xml`: Main content, where merge fields live
//! - `[Content_Types].xml`: Content-type manifest
//! - `_rels/.rels`: Package relationships
//!
//! Members are held in memory as a path -> bytes mapping. Only leaf files are
//! kept; directory entries are dropped on open and never written back.

use crate::error::{MergeError, Result};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Primary markup member holding the document body
pub const DOCUMENT_XML: &str = "word/document.xml";

/// Content-type manifest
pub const CONTENT_TYPES_XML: &str = "[Content_Types].xml";

/// Package-level relationship manifest
pub const ROOT_RELS: &str = "_rels/.rels";

/// Content type the manifest must declare for a word-processing document
pub const WORD_MAIN_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";

/// Leading bytes of every ZIP local file header
pub const ZIP_SIGNATURE: [u8; 2] = *b"PK";

/// Maximum uncompressed size of a single member (100 MiB)
pub const MAX_MEMBER_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum uncompressed size of all members together (400 MiB)
pub const MAX_TOTAL_SIZE: u64 = 4 * MAX_MEMBER_SIZE;

/// Decompression caps applied by [`DocxArchive::open_with_limits`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    /// Largest single member
    pub max_member_size: u64,
    /// Largest sum of all members
    pub max_total_size: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_member_size: MAX_MEMBER_SIZE,
            max_total_size: MAX_TOTAL_SIZE,
        }
    }
}

/// Members that must be present for [`DocxArchive::is_well_formed_document`]
pub const REQUIRED_MEMBERS: [&str; 3] = [DOCUMENT_XML, CONTENT_TYPES_XML, ROOT_RELS];

/// In-memory DOCX package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocxArchive {
    files: BTreeMap<String, Vec<u8>>,
}

/// Cheap pre-check: does the blob start with the ZIP magic bytes?
#[inline]
#[must_use = "returns whether the input carries a ZIP signature"]
pub fn has_zip_signature(bytes: &[u8]) -> bool {
    bytes.starts_with(&ZIP_SIGNATURE)
}

impl DocxArchive {
    /// Create an empty archive
    #[inline]
    #[must_use = "creates an empty archive"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an archive from a path -> bytes mapping
    #[must_use = "creates an archive from the given members"]
    pub fn from_files<I, K>(files: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<u8>)>,
        K: Into<String>,
    {
        Self {
            files: files.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Decompress a DOCX blob into its members
    ///
    /// # Errors
    ///
    /// Returns `MalformedArchive` if the bytes are not a well-formed ZIP
    /// container or a member cannot be decompressed, `MemberTooLarge` if a
    /// member exceeds [`MAX_MEMBER_SIZE`], and `ArchiveTooLarge` if the
    /// members together exceed [`MAX_TOTAL_SIZE`].
    #[must_use = "this function returns the opened archive that should be processed"]
    pub fn open(bytes: &[u8]) -> Result<Self> {
        Self::open_with_limits(bytes, ArchiveLimits::default())
    }

    /// Decompress a DOCX blob under explicit size caps
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open), measured against `limits`.
    #[must_use = "this function returns the opened archive that should be processed"]
    pub fn open_with_limits(bytes: &[u8], limits: ArchiveLimits) -> Result<Self> {
        let ArchiveLimits {
            max_member_size,
            max_total_size,
        } = limits;
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).map_err(MergeError::MalformedArchive)?;
        let mut files = BTreeMap::new();
        let mut total: u64 = 0;

        for i in 0..archive.len() {
            let mut member = archive.by_index(i).map_err(MergeError::MalformedArchive)?;
            if member.is_dir() {
                continue;
            }

            let name = member.name().to_string();
            let size = member.size();
            if size > max_member_size {
                return Err(MergeError::MemberTooLarge {
                    name,
                    size,
                    max: max_member_size,
                });
            }
            let remaining = max_total_size.saturating_sub(total);
            if size > remaining {
                return Err(MergeError::ArchiveTooLarge {
                    size: total.saturating_add(size),
                    max: max_total_size,
                });
            }

            // Declared size is only a hint; cap the actual read as well
            let cap = max_member_size.min(remaining);
            let mut content = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
            (&mut member)
                .take(cap.saturating_add(1))
                .read_to_end(&mut content)
                .map_err(|e| MergeError::MalformedArchive(e.into()))?;
            let read = content.len() as u64;
            if read > max_member_size {
                return Err(MergeError::MemberTooLarge {
                    name,
                    size: read,
                    max: max_member_size,
                });
            }
            if read > remaining {
                return Err(MergeError::ArchiveTooLarge {
                    size: total.saturating_add(read),
                    max: max_total_size,
                });
            }
            total += read;

            if files.insert(name.clone(), content).is_some() {
                warn!("Duplicate archive member '{name}', keeping the later entry");
            }
        }

        debug!("Opened archive with {} members, {total} bytes", files.len());
        Ok(Self { files })
    }

    /// Check that the required parts are present and that the content-type
    /// manifest declares a word-processing main document
    #[must_use = "returns whether the archive is a usable DOCX package"]
    pub fn is_well_formed_document(&self) -> bool {
        if let Some(missing) = REQUIRED_MEMBERS.iter().find(|m| !self.has_member(m)) {
            debug!("DOCX structure check failed: missing {missing}");
            return false;
        }

        self.files
            .get(CONTENT_TYPES_XML)
            .is_some_and(|types| String::from_utf8_lossy(types).contains(WORD_MAIN_CONTENT_TYPE))
    }

    /// Describe why [`is_well_formed_document`](Self::is_well_formed_document)
    /// fails, or `None` if it passes
    #[must_use = "returns the structural problem, if any"]
    pub fn structure_problem(&self) -> Option<String> {
        if let Some(missing) = REQUIRED_MEMBERS.iter().find(|m| !self.has_member(m)) {
            return Some(format!("missing required part {missing}"));
        }
        if self.is_well_formed_document() {
            None
        } else {
            Some(format!("{CONTENT_TYPES_XML} does not declare a Word main document"))
        }
    }

    /// Get a member's bytes
    ///
    /// # Errors
    ///
    /// Returns `MemberNotFound` if the archive has no member at `path`.
    pub fn member(&self, path: &str) -> Result<&[u8]> {
        self.files
            .get(path)
            .map(Vec::as_slice)
            .ok_or_else(|| MergeError::MemberNotFound(path.to_string()))
    }

    /// Get the main document markup bytes
    ///
    /// # Errors
    ///
    /// Returns `MemberNotFound` if `word/document.xml` is absent.
    #[inline]
    pub fn document_xml(&self) -> Result<&[u8]> {
        self.member(DOCUMENT_XML)
    }

    /// Check if a member exists
    #[inline]
    #[must_use = "returns whether the member exists"]
    pub fn has_member(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Insert or replace a member, returning the previous content
    pub fn set_member(&mut self, path: impl Into<String>, content: Vec<u8>) -> Option<Vec<u8>> {
        self.files.insert(path.into(), content)
    }

    /// Iterate over member paths in sorted order
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Number of members
    #[inline]
    #[must_use = "returns the member count"]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the archive has no members
    #[inline]
    #[must_use = "returns whether the archive is empty"]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Borrow the underlying mapping
    #[inline]
    #[must_use = "returns the member mapping"]
    pub const fn files(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.files
    }

    /// Serialize every member into a new ZIP blob
    ///
    /// `[Content_Types].xml` is written first, as Office does; the remaining
    /// members follow in path order. Compression level and timestamps of the
    /// source archive are not preserved.
    ///
    /// # Errors
    ///
    /// Returns `Rebuild` if the ZIP writer rejects a member, or `Io` if
    /// writing member content fails.
    #[must_use = "this function returns the rebuilt archive bytes"]
    pub fn rebuild(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let ordered = self
            .files
            .get_key_value(CONTENT_TYPES_XML)
            .into_iter()
            .chain(self.files.iter().filter(|(k, _)| *k != CONTENT_TYPES_XML));

        for (name, content) in ordered {
            writer
                .start_file(name.as_str(), options)
                .map_err(MergeError::Rebuild)?;
            writer.write_all(content)?;
        }

        let bytes = writer.finish().map_err(MergeError::Rebuild)?.into_inner();
        debug!(
            "Rebuilt archive with {} members ({} bytes)",
            self.files.len(),
            bytes.len()
        );
        Ok(bytes)
    }
}
