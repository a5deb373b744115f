use std::fmt;
use std::ops::Range;

use crate::error::{RecordError, Result};
use crate::interval::{Interval, Strand};

use super::scanner::{Field, FieldSink};

/// Byte range inside a line, relative to its first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}
impl Span {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn range(self) -> Range<usize> {
        self.start..self.end
    }

    #[must_use]
    pub fn len(self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.start == self.end
    }
}

/// What a line holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordKind {
    #[default]
    Feature,
    /// A `##` line
    Directive,
    /// A `#` line
    Comment,
}

#[derive(Debug, Clone, Copy, Default)]
struct Attribute {
    key: Span,
    /// Range of this attribute's values in `FeatureRecord::values`
    first_value: usize,
    n_values: usize,
}

/// One line of a GFF3 stream
///
/// The record owns a copy of the line and stores every column as a [`Span`] into it,
/// so a single record can be reused across reads without allocating. Clone it to
/// keep it beyond the next read.
///
/// Coordinates follow the file: 1-based and inclusive. `.` becomes `None`.
#[derive(Debug, Clone, Default)]
pub struct FeatureRecord {
    buf: Vec<u8>,
    kind: RecordKind,
    line: u64,
    fields: [Span; 9],
    start: Option<u64>,
    end: Option<u64>,
    attributes: Vec<Attribute>,
    values: Vec<Span>,
}
impl FeatureRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a single line
    ///
    /// # Errors
    ///
    /// * `RecordError::MalformedRecord` if the line breaks the GFF3 grammar or holds
    ///   no record at all
    pub fn parse(line: &str) -> Result<Self> {
        let mut reader = super::GffReader::new(line.as_bytes());
        let mut record = Self::new();
        match reader.read_record(&mut record)? {
            super::ReadOutcome::Record => Ok(record),
            super::ReadOutcome::End(_) => Err(RecordError::MalformedRecord {
                line: 1,
                column: 1,
                reason: "no record on line",
                offset: None,
            }
            .into()),
        }
    }

    /// Empties the record before a new line is scanned into it
    pub(crate) fn reset(&mut self, line: u64) {
        self.buf.clear();
        self.kind = RecordKind::Feature;
        self.line = line;
        self.fields = [Span::default(); 9];
        self.start = None;
        self.end = None;
        self.attributes.clear();
        self.values.clear();
    }

    pub(crate) fn push(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Seals the record once its line terminator has been seen
    pub(crate) fn finish(&mut self, kind: RecordKind) {
        self.kind = kind;
        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }
    }

    /// Parses a coordinate column, `None` for `.`
    fn coordinate(&self, span: Span) -> Option<u64> {
        let text = &self.buf[span.range()];
        if text == b"." {
            return None;
        }
        Some(text.iter().fold(0u64, |acc, &b| {
            acc.saturating_mul(10).saturating_add(u64::from(b - b'0'))
        }))
    }

    fn column(&self, field: Field) -> &[u8] {
        &self.buf[self.fields[field.index()].range()]
    }

    #[must_use]
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    #[must_use]
    pub fn is_feature(&self) -> bool {
        self.kind == RecordKind::Feature
    }

    /// Line number of the record, counted from where reading started
    #[must_use]
    pub fn line_number(&self) -> u64 {
        self.line
    }

    /// The line without its terminator
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Text of a directive or comment after its leading `##` or `#`
    #[must_use]
    pub fn text(&self) -> &[u8] {
        match self.kind {
            RecordKind::Directive => &self.buf[2..],
            RecordKind::Comment => &self.buf[1..],
            RecordKind::Feature => &self.buf,
        }
    }

    /// Sequence identifier; always ASCII
    #[must_use]
    pub fn seqid(&self) -> &str {
        std::str::from_utf8(self.column(Field::Seqid)).unwrap_or_default()
    }

    #[must_use]
    pub fn source(&self) -> &[u8] {
        self.column(Field::Source)
    }

    #[must_use]
    pub fn feature_type(&self) -> &[u8] {
        self.column(Field::Type)
    }

    #[must_use]
    pub fn start(&self) -> Option<u64> {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> Option<u64> {
        self.end
    }

    /// Score column as written
    #[must_use]
    pub fn raw_score(&self) -> &[u8] {
        self.column(Field::Score)
    }

    /// Score as a number, `None` for `.` or text that is not a float
    #[must_use]
    pub fn score(&self) -> Option<f64> {
        match self.raw_score() {
            b"." => None,
            raw => std::str::from_utf8(raw).ok()?.parse().ok(),
        }
    }

    #[must_use]
    pub fn strand(&self) -> Strand {
        self.column(Field::Strand)
            .first()
            .and_then(|&b| Strand::from_byte(b))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn phase(&self) -> Option<u8> {
        match self.column(Field::Phase) {
            [b @ b'0'..=b'2'] => Some(b - b'0'),
            _ => None,
        }
    }

    /// Attribute column as written
    #[must_use]
    pub fn raw_attributes(&self) -> &[u8] {
        self.column(Field::Attributes)
    }

    #[must_use]
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Attributes in file order
    pub fn attributes(&self) -> impl Iterator<Item = (&[u8], AttributeValues<'_>)> {
        self.attributes
            .iter()
            .map(|attr| (&self.buf[attr.key.range()], self.values_of(attr)))
    }

    /// Values of the first attribute named `key`
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<AttributeValues<'_>> {
        self.attributes
            .iter()
            .find(|attr| &self.buf[attr.key.range()] == key.as_bytes())
            .map(|attr| self.values_of(attr))
    }

    fn values_of(&self, attr: &Attribute) -> AttributeValues<'_> {
        AttributeValues {
            buf: &self.buf,
            spans: self.values[attr.first_value..attr.first_value + attr.n_values].iter(),
        }
    }

    /// The feature as an interval, `None` unless both coordinates are known and
    /// ordered
    #[must_use]
    pub fn interval(&self) -> Option<Interval<()>> {
        if !self.is_feature() {
            return None;
        }
        Interval::new(self.seqid(), self.start?, self.end?, self.strand(), ()).ok()
    }

    /// Whether the feature intersects the 1-based inclusive range `[first, last]`
    ///
    /// Features with an unknown coordinate never overlap anything.
    #[must_use]
    pub fn overlaps(&self, seqname: &str, first: u64, last: u64) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => {
                self.is_feature() && self.seqid() == seqname && start <= last && end >= first
            }
            _ => false,
        }
    }
}
impl FieldSink for FeatureRecord {
    fn field(&mut self, field: Field, span: Span) -> bool {
        self.fields[field.index()] = span;
        match field {
            Field::Start => self.start = self.coordinate(span),
            Field::End => self.end = self.coordinate(span),
            _ => {}
        }
        true
    }

    fn attribute_key(&mut self, span: Span) {
        self.attributes.push(Attribute {
            key: span,
            first_value: self.values.len(),
            n_values: 0,
        });
    }

    fn attribute_value(&mut self, span: Span) {
        self.values.push(span);
        if let Some(attr) = self.attributes.last_mut() {
            attr.n_values += 1;
        }
    }
}
impl fmt::Display for FeatureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.buf))
    }
}

/// Values of one attribute
#[derive(Debug, Clone)]
pub struct AttributeValues<'a> {
    buf: &'a [u8],
    spans: std::slice::Iter<'a, Span>,
}
impl<'a> Iterator for AttributeValues<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        self.spans.next().map(|s| &self.buf[s.range()])
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.spans.size_hint()
    }
}
impl ExactSizeIterator for AttributeValues<'_> {}
