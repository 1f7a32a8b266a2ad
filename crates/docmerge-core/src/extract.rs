//! Merge field discovery
//!
//! Word stores a merge field in one of two shapes:
//!
//! ```xml
//! <!-- simple: instruction carried on one element -->
//! <w:fldSimple w:instr=" MERGEFIELD FirstName \* MERGEFORMAT ">...</w:fldSimple>
//!
//! <!-- complex: instruction split across runs -->
//! <w:r><w:fldChar w:fldCharType="begin"/></w:r>
//! <w:r><w:instrText> MERGEFIELD Email </w:instrText></w:r>
//! <w:r><w:fldChar w:fldCharType="separate"/></w:r>
//! <w:r><w:t>«Email»</w:t></w:r>
//! <w:r><w:fldChar w:fldCharType="end"/></w:r>
//! ```
//!
//! The scan is a single forward pass over the event stream and stops at the
//! first XML error, keeping whatever was found before it.

use crate::archive::DocxArchive;
use crate::error::Result;
use crate::model::{MergeField, MergeFieldSet, DEFAULT_DOCUMENT_NAME};
use log::{debug, trace};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::collections::HashSet;

/// Instruction keyword identifying a merge field
pub const MERGEFIELD_MARKER: &str = "MERGEFIELD";

/// Field name named by an instruction string
///
/// The instruction must contain [`MERGEFIELD_MARKER`]; the name is its second
/// whitespace-delimited token.
#[must_use = "returns the field name, if any"]
pub fn merge_field_name(instruction: &str) -> Option<&str> {
    if !instruction.contains(MERGEFIELD_MARKER) {
        return None;
    }
    instruction.split_whitespace().nth(1)
}

/// Unescaped value of the attribute whose local name is `local`
pub(crate) fn attr_value(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok().map(Cow::into_owned))
}

/// Parser state for one extraction pass
#[derive(Debug, Default)]
struct FieldScanner {
    names: Vec<String>,
    seen: HashSet<String>,
    /// Between a `begin` and its closing `end` marker
    in_complex: bool,
    in_instr_text: bool,
    instr_text: String,
    complex_name: Option<String>,
}

impl FieldScanner {
    fn record(&mut self, name: &str) {
        if self.seen.insert(name.to_string()) {
            trace!("Found merge field '{name}'");
            self.names.push(name.to_string());
        }
    }

    fn handle_element(&mut self, e: &BytesStart<'_>, has_content: bool) {
        match e.local_name().as_ref() {
            b"fldSimple" if !self.in_complex => {
                if let Some(instr) = attr_value(e, b"instr") {
                    if let Some(name) = merge_field_name(&instr) {
                        self.record(name);
                    }
                }
            }
            b"fldChar" => match attr_value(e, b"fldCharType").as_deref() {
                Some("begin") if !self.in_complex => {
                    self.in_complex = true;
                    self.complex_name = None;
                }
                Some("end") if self.in_complex => {
                    self.in_complex = false;
                    if let Some(name) = self.complex_name.take() {
                        self.record(&name);
                    }
                }
                _ => {}
            },
            b"instrText" if self.in_complex && has_content => {
                self.in_instr_text = true;
                self.instr_text.clear();
            }
            _ => {}
        }
    }

    fn handle_end(&mut self, local: &[u8]) {
        if local == b"instrText" && self.in_instr_text {
            self.in_instr_text = false;
            if let Some(name) = merge_field_name(&self.instr_text) {
                self.complex_name = Some(name.to_string());
            }
        }
    }
}

/// Collect the distinct merge field names referenced by document markup
///
/// Names are returned in order of first appearance, deduplicated by exact
/// string equality. Malformed markup is not an error: the scan stops at the
/// first XML error.
#[must_use = "returns the discovered field names"]
pub fn extract_field_names(markup: &str) -> Vec<String> {
    let mut reader = Reader::from_str(markup);
    let mut scanner = FieldScanner::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => scanner.handle_element(e, true),
            Ok(Event::Empty(ref e)) => scanner.handle_element(e, false),
            Ok(Event::Text(ref t)) if scanner.in_instr_text => match t.unescape() {
                Ok(text) => scanner.instr_text.push_str(&text),
                Err(e) => {
                    debug!("Stopping field scan at undecodable text: {e}");
                    break;
                }
            },
            Ok(Event::End(ref e)) => scanner.handle_end(e.local_name().as_ref()),
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!(
                    "Stopping field scan at position {}: {e}",
                    reader.buffer_position()
                );
                break;
            }
            _ => {}
        }
    }

    scanner.names
}

/// Discover the merge fields of a document
///
/// Every field is typed as a string and marked optional.
///
/// # Errors
///
/// Returns `MemberNotFound` if the archive has no `word/document.xml`.
pub fn extract_fields(archive: &DocxArchive) -> Result<MergeFieldSet> {
    extract_fields_from(archive, DEFAULT_DOCUMENT_NAME)
}

/// [`extract_fields`] with an explicit document label
///
/// # Errors
///
/// Returns `MemberNotFound` if the archive has no `word/document.xml`.
pub fn extract_fields_from(archive: &DocxArchive, document_name: &str) -> Result<MergeFieldSet> {
    let markup = String::from_utf8_lossy(archive.document_xml()?);
    let fields = extract_field_names(&markup)
        .into_iter()
        .map(MergeField::new)
        .collect::<Result<Vec<_>>>()?;

    debug!("Extracted {} merge fields from {document_name}", fields.len());
    Ok(MergeFieldSet::new(fields, document_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::DOCUMENT_XML;
    use crate::error::MergeError;
    use crate::model::FieldType;

    fn wrap(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
    <w:body>
        <w:p>{body}</w:p>
    </w:body>
</w:document>"#
        )
    }

    const SIMPLE_FIRST: &str = r#"<w:fldSimple w:instr=" MERGEFIELD  FirstName  \* MERGEFORMAT "><w:t>«FirstName»</w:t></w:fldSimple>"#;
    const SIMPLE_LAST: &str = r#"<w:fldSimple w:instr=" MERGEFIELD  LastName  \* MERGEFORMAT "><w:t>«LastName»</w:t></w:fldSimple>"#;
    const COMPLEX_EMAIL: &str = r#"
            <w:r><w:fldChar w:fldCharType="begin"/></w:r>
            <w:r><w:instrText> MERGEFIELD  Email  \* MERGEFORMAT </w:instrText></w:r>
            <w:r><w:fldChar w:fldCharType="separate"/></w:r>
            <w:r><w:t>«Email»</w:t></w:r>
            <w:r><w:fldChar w:fldCharType="end"/></w:r>"#;

    #[test]
    fn test_simple_fields() {
        let xml = wrap(&format!("{SIMPLE_FIRST}{SIMPLE_LAST}"));
        assert_eq!(extract_field_names(&xml), vec!["FirstName", "LastName"]);
    }

    #[test]
    fn test_complex_field() {
        assert_eq!(extract_field_names(&wrap(COMPLEX_EMAIL)), vec!["Email"]);
    }

    #[test]
    fn test_mixed_fields() {
        let xml = wrap(&format!("{SIMPLE_FIRST}{COMPLEX_EMAIL}"));
        assert_eq!(extract_field_names(&xml), vec!["FirstName", "Email"]);
    }

    #[test]
    fn test_duplicates_collapse() {
        let xml = wrap(&format!("{SIMPLE_FIRST}{SIMPLE_FIRST}{COMPLEX_EMAIL}{COMPLEX_EMAIL}"));
        assert_eq!(extract_field_names(&xml), vec!["FirstName", "Email"]);
    }

    #[test]
    fn test_dedup_is_case_sensitive() {
        let xml = wrap(
            r#"<w:fldSimple w:instr="MERGEFIELD Name"/><w:fldSimple w:instr="MERGEFIELD name"/>"#,
        );
        assert_eq!(extract_field_names(&xml), vec!["Name", "name"]);
    }

    #[test]
    fn test_no_fields() {
        let xml = wrap("<w:r><w:t>Hello World</w:t></w:r>");
        assert!(extract_field_names(&xml).is_empty());
    }

    #[test]
    fn test_instruction_without_marker_ignored() {
        let xml = wrap(
            r#"<w:fldSimple w:instr=" PAGE \* MERGEFORMAT "/>
            <w:r><w:fldChar w:fldCharType="begin"/></w:r>
            <w:r><w:instrText> DATE \@ "yyyy" </w:instrText></w:r>
            <w:r><w:fldChar w:fldCharType="end"/></w:r>"#,
        );
        assert!(extract_field_names(&xml).is_empty());
    }

    #[test]
    fn test_marker_without_name_ignored() {
        let xml = wrap(r#"<w:fldSimple w:instr="MERGEFIELD"/>"#);
        assert!(extract_field_names(&xml).is_empty());
    }

    #[test]
    fn test_unterminated_complex_field_ignored() {
        let xml = wrap(
            r#"<w:r><w:fldChar w:fldCharType="begin"/></w:r>
            <w:r><w:instrText> MERGEFIELD Orphan </w:instrText></w:r>"#,
        );
        assert!(extract_field_names(&xml).is_empty());
    }

    #[test]
    fn test_simple_field_inside_complex_not_counted() {
        let xml = wrap(
            r#"<w:r><w:fldChar w:fldCharType="begin"/></w:r>
            <w:fldSimple w:instr="MERGEFIELD Inner"/>
            <w:r><w:instrText>MERGEFIELD Outer</w:instrText></w:r>
            <w:r><w:fldChar w:fldCharType="end"/></w:r>"#,
        );
        assert_eq!(extract_field_names(&xml), vec!["Outer"]);
    }

    #[test]
    fn test_stops_at_first_error() {
        let xml = format!(
            "<w:document><w:body>{SIMPLE_FIRST}</w:bogus>{SIMPLE_LAST}</w:body></w:document>"
        );
        assert_eq!(extract_field_names(&xml), vec!["FirstName"]);
        assert!(extract_field_names("not xml <<<").is_empty());
        assert!(extract_field_names("").is_empty());
    }

    #[test]
    fn test_merge_field_name() {
        assert_eq!(merge_field_name(" MERGEFIELD  Email  \\* MERGEFORMAT "), Some("Email"));
        assert_eq!(merge_field_name("MERGEFIELD"), None);
        assert_eq!(merge_field_name("PAGE"), None);
    }

    #[test]
    fn test_extract_fields_from_archive() {
        let archive = DocxArchive::from_files([(
            DOCUMENT_XML,
            wrap(&format!("{SIMPLE_FIRST}{COMPLEX_EMAIL}")).into_bytes(),
        )]);
        let set = extract_fields(&archive).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.document_name(), DEFAULT_DOCUMENT_NAME);
        assert!(set
            .fields()
            .iter()
            .all(|f| f.field_type() == FieldType::String && !f.is_required()));
        assert!(set.contains("email"));
    }

    #[test]
    fn test_extract_fields_missing_document() {
        let err = extract_fields(&DocxArchive::new()).unwrap_err();
        assert!(matches!(err, MergeError::MemberNotFound(_)));
    }
}
