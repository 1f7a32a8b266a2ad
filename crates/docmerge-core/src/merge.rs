//! Merge field substitution
//!
//! Rewrites `word/document.xml` by streaming its events from a
//! [`quick_xml::Reader`] into a [`quick_xml::Writer`]. Three placeholder
//! shapes are recognised:
//!
//! - `«name»` inside a text (`t`) element, outside any field construct
//! - `fldSimple` elements whose `instr` names a `MERGEFIELD`
//! - `fldChar begin` .. `instrText` .. `separate` .. `end` constructs
//!
//! Only the first occurrence of each exact field name is considered. Later
//! occurrences are copied through untouched, and a name with no data is
//! reported as skipped once.
//!
//! Events that are not rewritten are written back from their raw bytes, so
//! untouched markup keeps its attributes, quoting and entity references.

use crate::archive::{DocxArchive, DOCUMENT_XML};
use crate::error::Result;
use crate::extract::{attr_value, merge_field_name};
use crate::value::MergeData;
use log::{debug, info, trace, warn};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::collections::HashSet;
use std::ops::Range;

type XmlResult<T> = std::result::Result<T, quick_xml::Error>;

const PLACEHOLDER_OPEN: char = '«';
const PLACEHOLDER_CLOSE: char = '»';

/// Result of rewriting document markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupMerge {
    /// Rewritten markup (the input itself when nothing was substituted)
    pub xml: String,
    /// Field names with no data, in order of first encounter
    pub skipped: Vec<String>,
    /// Number of placeholders substituted
    pub replaced: usize,
}

/// Result of merging a whole document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutput {
    /// Rebuilt DOCX bytes
    pub document: Vec<u8>,
    /// Field names with no data, in order of first encounter
    pub skipped: Vec<String>,
    /// Number of placeholders substituted
    pub replaced: usize,
}

/// Escape `&`, `<`, `>`, `"` and `'` for use in element text
#[must_use = "returns the escaped text"]
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Substitute merge data into document markup
///
/// Values are looked up case-insensitively and rendered with
/// [`MergeValue::render`](crate::value::MergeValue::render). Markup that
/// fails to parse is returned unchanged with no skipped fields.
#[must_use = "returns the rewritten markup"]
pub fn replace_field_values(markup: &str, data: &MergeData) -> MarkupMerge {
    match FieldRewriter::new(data, markup.len()).run(markup) {
        Ok(done) => {
            debug!(
                "Field replacement finished: {} replaced, {} skipped",
                done.replaced,
                done.skipped.len()
            );
            let xml = if done.replaced > 0 {
                done.xml
            } else {
                markup.to_string()
            };
            MarkupMerge { xml, ..done }
        }
        Err(e) => {
            warn!("Document markup could not be parsed, leaving it unchanged: {e}");
            MarkupMerge {
                xml: markup.to_string(),
                skipped: Vec::new(),
                replaced: 0,
            }
        }
    }
}

/// Merge data into a document and rebuild the archive
///
/// Every member other than `word/document.xml` is copied unchanged.
///
/// # Errors
///
/// Returns `MemberNotFound` if the archive has no `word/document.xml`, or
/// `Rebuild`/`Io` if the new archive cannot be written.
pub fn perform_merge(archive: &DocxArchive, data: &MergeData) -> Result<MergeOutput> {
    info!("Starting merge with {} data fields", data.len());
    let source = archive.document_xml()?;

    let mut merged = archive.clone();
    let (skipped, replaced) = match std::str::from_utf8(source) {
        Ok(markup) => {
            let result = replace_field_values(markup, data);
            if result.replaced > 0 {
                merged.set_member(DOCUMENT_XML, result.xml.into_bytes());
            }
            (result.skipped, result.replaced)
        }
        Err(e) => {
            warn!("{DOCUMENT_XML} is not UTF-8, leaving it unchanged: {e}");
            (Vec::new(), 0)
        }
    };
    if !skipped.is_empty() {
        info!("Skipped fields: {skipped:?}");
    }

    let document = merged.rebuild()?;
    info!(
        "Merge complete: {replaced} replaced, {} skipped, {} bytes",
        skipped.len(),
        document.len()
    );
    Ok(MergeOutput {
        document,
        skipped,
        replaced,
    })
}

/// How an event relates to a given element name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Open,
    Close,
    SelfClosing,
    Other,
}

fn tag_of(event: &Event<'_>, local: &[u8]) -> Tag {
    match event {
        Event::Start(e) if e.local_name().as_ref() == local => Tag::Open,
        Event::Empty(e) if e.local_name().as_ref() == local => Tag::SelfClosing,
        Event::End(e) if e.local_name().as_ref() == local => Tag::Close,
        _ => Tag::Other,
    }
}

fn prefix_of(e: &BytesStart<'_>) -> Option<String> {
    e.name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
}

fn qualify(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{local}"),
        None => local.to_string(),
    }
}

fn end_for<'a>(e: &BytesStart<'_>) -> BytesEnd<'a> {
    BytesEnd::new(String::from_utf8_lossy(e.name().as_ref()).into_owned())
}

/// `<t>value</t>` with `value` already escaped
fn text_element<'a>(prefix: Option<&str>, value: &str) -> [Event<'a>; 3] {
    let name = qualify(prefix, "t");
    [
        Event::Start(BytesStart::new(name.clone())),
        Event::Text(BytesText::from_escaped(value.to_string())),
        Event::End(BytesEnd::new(name)),
    ]
}

fn wrap_in_run<'a>(prefix: Option<&str>, inner: Vec<Event<'a>>) -> Vec<Event<'a>> {
    let name = qualify(prefix, "r");
    let mut run = Vec::with_capacity(inner.len() + 2);
    run.push(Event::Start(BytesStart::new(name.clone())));
    run.extend(inner);
    run.push(Event::End(BytesEnd::new(name)));
    run
}

fn separate_marker<'a>(prefix: Option<&str>) -> Event<'a> {
    let attr = qualify(prefix, "fldCharType");
    Event::Empty(
        BytesStart::new(qualify(prefix, "fldChar")).with_attributes([(attr.as_str(), "separate")]),
    )
}

/// Index range of the first `local` element in `events`, closing tag included
fn first_element(events: &[Event<'_>], local: &[u8]) -> Option<Range<usize>> {
    let start = events
        .iter()
        .position(|e| matches!(tag_of(e, local), Tag::Open | Tag::SelfClosing))?;
    if tag_of(&events[start], local) == Tag::SelfClosing {
        return Some(start..start + 1);
    }

    let mut depth = 0usize;
    for (i, event) in events.iter().enumerate().skip(start) {
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Some(start..i + 1);
                }
            }
            _ => {}
        }
    }
    Some(start..events.len())
}

/// Put `value` into the first text element and drop every later one
///
/// Returns whether a text element was found.
fn fill_first_text<'a>(events: Vec<Event<'a>>, value: &str) -> (Vec<Event<'a>>, bool) {
    let mut out = Vec::with_capacity(events.len());
    let mut filled = false;
    // (nesting depth, whether to keep the closing tag)
    let mut skipping: Option<(usize, bool)> = None;

    for event in events {
        if let Some((depth, keep_end)) = skipping {
            let depth = match event {
                Event::Start(_) => depth + 1,
                Event::End(_) => depth - 1,
                _ => depth,
            };
            if depth == 0 {
                if keep_end {
                    out.push(event);
                }
                skipping = None;
            } else {
                skipping = Some((depth, keep_end));
            }
            continue;
        }

        match tag_of(&event, b"t") {
            Tag::Open if filled => skipping = Some((1, false)),
            Tag::Open => {
                filled = true;
                out.push(event);
                out.push(Event::Text(BytesText::from_escaped(value.to_string())));
                skipping = Some((1, true));
            }
            Tag::SelfClosing if filled => {}
            Tag::SelfClosing => {
                filled = true;
                if let Event::Empty(e) = event {
                    let end = end_for(&e);
                    out.push(Event::Start(e));
                    out.push(Event::Text(BytesText::from_escaped(value.to_string())));
                    out.push(Event::End(end));
                }
            }
            Tag::Close | Tag::Other => out.push(event),
        }
    }
    (out, filled)
}

/// A buffered `fldSimple` element naming a merge field
struct SimpleField<'a> {
    name: String,
    prefix: Option<String>,
    depth: usize,
    events: Vec<Event<'a>>,
}

impl<'a> SimpleField<'a> {
    /// Buffer one more event; returns `true` once the element is closed
    fn push(&mut self, event: Event<'a>) -> bool {
        match event {
            Event::Start(_) => self.depth += 1,
            Event::End(_) => self.depth -= 1,
            _ => {}
        }
        self.events.push(event);
        self.depth == 0
    }

    /// Collapse the field to its first run carrying `value`
    fn into_replacement(self, value: &str, inside_run: bool) -> Vec<Event<'a>> {
        let prefix = self.prefix.as_deref();

        if let Some(range) = first_element(&self.events, b"r") {
            let run: Vec<_> = self.events.into_iter().skip(range.start).take(range.len()).collect();
            let (mut out, filled) = fill_first_text(run, value);
            if !filled {
                match out.pop() {
                    Some(Event::Empty(e)) => {
                        let end = end_for(&e);
                        out.push(Event::Start(e));
                        out.extend(text_element(prefix, value));
                        out.push(Event::End(end));
                    }
                    Some(close) => {
                        out.extend(text_element(prefix, value));
                        out.push(close);
                    }
                    None => out.extend(text_element(prefix, value)),
                }
            }
            return out;
        }

        if let Some(range) = first_element(&self.events, b"t") {
            let text: Vec<_> = self.events.into_iter().skip(range.start).take(range.len()).collect();
            return fill_first_text(text, value).0;
        }

        if inside_run {
            text_element(prefix, value).into()
        } else {
            wrap_in_run(prefix, text_element(prefix, value).into())
        }
    }
}

/// A buffered `fldChar begin` .. `fldChar end` construct
struct ComplexField<'a> {
    prefix: Option<String>,
    events: Vec<Event<'a>>,
    name: Option<String>,
    in_instr_text: bool,
    instr_text: String,
    /// Index of the first `separate` marker
    separate: Option<usize>,
    /// Index of the run start that is currently open
    open_run: Option<usize>,
    /// Index of the run start holding the `end` marker
    end_run: Option<usize>,
}

impl<'a> ComplexField<'a> {
    fn new(prefix: Option<String>, begin: Event<'a>) -> Self {
        Self {
            prefix,
            events: vec![begin],
            name: None,
            in_instr_text: false,
            instr_text: String::new(),
            separate: None,
            open_run: None,
            end_run: None,
        }
    }

    /// Buffer one more event; returns `true` at the first `end` marker
    fn push(&mut self, event: Event<'a>) -> bool {
        let index = self.events.len();
        let mut complete = false;

        match &event {
            Event::Start(e) | Event::Empty(e) => {
                let has_content = matches!(event, Event::Start(_));
                match e.local_name().as_ref() {
                    b"r" if has_content => self.open_run = Some(index),
                    b"instrText" if has_content => {
                        self.in_instr_text = true;
                        self.instr_text.clear();
                    }
                    b"fldChar" => match attr_value(e, b"fldCharType").as_deref() {
                        Some("separate") if self.separate.is_none() => self.separate = Some(index),
                        Some("end") => {
                            self.end_run = self.open_run;
                            complete = true;
                        }
                        _ => {}
                    },
                    _ => {}
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"r" => self.open_run = None,
                b"instrText" if self.in_instr_text => {
                    self.in_instr_text = false;
                    if let Some(name) = merge_field_name(&self.instr_text) {
                        self.name = Some(name.to_string());
                    }
                }
                _ => {}
            },
            Event::Text(t) if self.in_instr_text => {
                if let Ok(text) = t.unescape() {
                    self.instr_text.push_str(&text);
                }
            }
            _ => {}
        }

        self.events.push(event);
        complete
    }

    /// Put `value` into the result portion, creating one if needed
    fn into_replacement(self, value: &str) -> Vec<Event<'a>> {
        let Self {
            prefix,
            mut events,
            separate,
            end_run,
            ..
        } = self;
        let prefix = prefix.as_deref();

        let mut formatting = Vec::new();
        if let Some(sep) = separate {
            let result = events.split_off(sep + 1);
            if let Some(range) = first_element(&result, b"rPr") {
                formatting.extend(result[range].iter().cloned());
            }
            let (result, filled) = fill_first_text(result, value);
            events.extend(result);
            if filled {
                return events;
            }
        }

        let mut inner = formatting;
        inner.extend(text_element(prefix, value));
        let mut insert = Vec::new();
        match end_run {
            Some(at) => {
                if separate.is_none() {
                    insert.extend(wrap_in_run(prefix, vec![separate_marker(prefix)]));
                }
                insert.extend(wrap_in_run(prefix, inner));
                let tail = events.split_off(at);
                events.extend(insert);
                events.extend(tail);
            }
            // `end` shares a run with earlier markers; stay inside that run
            None => {
                if separate.is_none() {
                    insert.push(separate_marker(prefix));
                }
                insert.extend(text_element(prefix, value));
                let end_marker = events.pop();
                events.extend(insert);
                events.extend(end_marker);
            }
        }
        events
    }
}

enum Pending<'a> {
    Simple(SimpleField<'a>),
    Complex(ComplexField<'a>),
}

impl<'a> Pending<'a> {
    fn into_events(self) -> Vec<Event<'a>> {
        match self {
            Self::Simple(s) => s.events,
            Self::Complex(c) => c.events,
        }
    }
}

/// Classification of an event outside any buffered field
enum Incoming {
    SimpleField {
        name: String,
        prefix: Option<String>,
        self_closing: bool,
    },
    ComplexBegin(Option<String>),
    Text,
    Other,
}

fn classify(event: &Event<'_>, in_text: bool) -> Incoming {
    match event {
        Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
            b"fldSimple" => attr_value(e, b"instr")
                .as_deref()
                .and_then(merge_field_name)
                .map_or(Incoming::Other, |name| Incoming::SimpleField {
                    name: name.to_string(),
                    prefix: prefix_of(e),
                    self_closing: matches!(event, Event::Empty(_)),
                }),
            b"fldChar" if attr_value(e, b"fldCharType").as_deref() == Some("begin") => {
                Incoming::ComplexBegin(prefix_of(e))
            }
            _ => Incoming::Other,
        },
        Event::Text(_) if in_text => Incoming::Text,
        _ => Incoming::Other,
    }
}

/// Streaming rewrite state for one document
struct FieldRewriter<'d, 'a> {
    data: &'d MergeData,
    writer: Writer<Vec<u8>>,
    processed: HashSet<String>,
    skipped: Vec<String>,
    replaced: usize,
    run_depth: usize,
    text_depth: usize,
    pending: Option<Pending<'a>>,
}

impl<'d, 'a> FieldRewriter<'d, 'a> {
    fn new(data: &'d MergeData, capacity: usize) -> Self {
        Self {
            data,
            writer: Writer::new(Vec::with_capacity(capacity + 256)),
            processed: HashSet::new(),
            skipped: Vec::new(),
            replaced: 0,
            run_depth: 0,
            text_depth: 0,
            pending: None,
        }
    }

    fn run(mut self, markup: &'a str) -> XmlResult<MarkupMerge> {
        let mut reader = Reader::from_str(markup);
        loop {
            match reader.read_event()? {
                Event::Eof => break,
                event => self.handle(event)?,
            }
        }
        // Unterminated construct: keep it as found
        if let Some(pending) = self.pending.take() {
            self.write_all(pending.into_events())?;
        }

        let bytes = self.writer.into_inner();
        let xml = String::from_utf8(bytes).map_err(|e| quick_xml::Error::from(e.utf8_error()))?;
        Ok(MarkupMerge {
            xml,
            skipped: self.skipped,
            replaced: self.replaced,
        })
    }

    fn track_depth(&mut self, event: &Event<'_>) {
        match (tag_of(event, b"r"), tag_of(event, b"t")) {
            (Tag::Open, _) => self.run_depth += 1,
            (Tag::Close, _) => self.run_depth = self.run_depth.saturating_sub(1),
            (_, Tag::Open) => self.text_depth += 1,
            (_, Tag::Close) => self.text_depth = self.text_depth.saturating_sub(1),
            _ => {}
        }
    }

    fn handle(&mut self, event: Event<'a>) -> XmlResult<()> {
        self.track_depth(&event);

        match self.pending.take() {
            Some(Pending::Simple(mut field)) => {
                if field.push(event) {
                    self.finish_simple(field)
                } else {
                    self.pending = Some(Pending::Simple(field));
                    Ok(())
                }
            }
            Some(Pending::Complex(mut field)) => {
                if field.push(event) {
                    self.finish_complex(field)
                } else {
                    self.pending = Some(Pending::Complex(field));
                    Ok(())
                }
            }
            None => self.handle_unbuffered(event),
        }
    }

    fn handle_unbuffered(&mut self, event: Event<'a>) -> XmlResult<()> {
        match classify(&event, self.text_depth > 0) {
            Incoming::SimpleField {
                name,
                prefix,
                self_closing,
            } => {
                let field = SimpleField {
                    name,
                    prefix,
                    depth: usize::from(!self_closing),
                    events: vec![event],
                };
                if self_closing {
                    self.finish_simple(field)
                } else {
                    self.pending = Some(Pending::Simple(field));
                    Ok(())
                }
            }
            Incoming::ComplexBegin(prefix) => {
                self.pending = Some(Pending::Complex(ComplexField::new(prefix, event)));
                Ok(())
            }
            Incoming::Text => match event {
                Event::Text(text) => self.write_text(text),
                other => self.writer.write_event(other),
            },
            Incoming::Other => self.writer.write_event(event),
        }
    }

    /// Look up a field the first time its name is seen
    ///
    /// Returns the escaped value to insert, or `None` to leave the
    /// occurrence as found.
    fn resolve(&mut self, name: &str) -> Option<String> {
        if !self.processed.insert(name.to_string()) {
            trace!("Field '{name}' already handled, leaving later occurrence");
            return None;
        }
        match self.data.get_ignore_case(name) {
            Some(value) => {
                let rendered = value.render();
                debug!("Replacing field '{name}' with '{rendered}'");
                self.replaced += 1;
                Some(escape_xml(&rendered))
            }
            None => {
                debug!("Skipping field '{name}' (no data available)");
                self.skipped.push(name.to_string());
                None
            }
        }
    }

    fn finish_simple(&mut self, field: SimpleField<'a>) -> XmlResult<()> {
        match self.resolve(&field.name) {
            Some(value) => {
                let events = field.into_replacement(&value, self.run_depth > 0);
                self.write_all(events)
            }
            None => self.write_all(field.events),
        }
    }

    fn finish_complex(&mut self, field: ComplexField<'a>) -> XmlResult<()> {
        let Some(name) = field.name.clone() else {
            return self.write_all(field.events);
        };
        match self.resolve(&name) {
            Some(value) => self.write_all(field.into_replacement(&value)),
            None => self.write_all(field.events),
        }
    }

    fn write_text(&mut self, text: BytesText<'a>) -> XmlResult<()> {
        let raw = std::str::from_utf8(&text)?;
        match self.substitute_placeholders(raw) {
            Some(replaced) => self
                .writer
                .write_event(Event::Text(BytesText::from_escaped(replaced))),
            None => self.writer.write_event(Event::Text(text)),
        }
    }

    /// Replace `«name»` placeholders in escaped element text
    ///
    /// Returns `None` if nothing was substituted.
    fn substitute_placeholders(&mut self, raw: &str) -> Option<String> {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        let mut changed = false;

        while let Some(close) = rest.find(PLACEHOLDER_CLOSE) {
            let close_end = close + PLACEHOLDER_CLOSE.len_utf8();
            let Some(open) = rest[..close].rfind(PLACEHOLDER_OPEN) else {
                out.push_str(&rest[..close_end]);
                rest = &rest[close_end..];
                continue;
            };

            out.push_str(&rest[..open]);
            let inner = &rest[open + PLACEHOLDER_OPEN.len_utf8()..close];
            let name = quick_xml::escape::unescape(inner).unwrap_or(Cow::Borrowed(inner));
            let name = name.trim();
            match (!name.is_empty()).then(|| self.resolve(name)).flatten() {
                Some(value) => {
                    out.push_str(&value);
                    changed = true;
                }
                None => out.push_str(&rest[open..close_end]),
            }
            rest = &rest[close_end..];
        }

        out.push_str(rest);
        changed.then_some(out)
    }

    fn write_all(&mut self, events: Vec<Event<'a>>) -> XmlResult<()> {
        for event in events {
            self.writer.write_event(event)?;
        }
        Ok(())
    }
}
