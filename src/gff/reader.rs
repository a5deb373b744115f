use std::io::BufRead;

use log::debug;
use memchr::memchr;

use crate::error::{QueryError, Result};

use super::record::{FeatureRecord, RecordKind, Span};
use super::scanner::{Field, FieldSink, Scanner, Step};

/// How a stream of records ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfStream {
    /// The input was exhausted
    Clean,
    /// Embedded sequence data follows the records (a `>` line or `##FASTA`)
    TrailingPayload,
}

/// Result of [`GffReader::read_record`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The record was filled with the next line
    Record,
    /// No record left
    End(EndOfStream),
}

/// Counts of the non-feature lines seen by a reader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommentTally {
    pub features: u64,
    pub directives: u64,
    pub comments: u64,
    /// Directives and comments before the first feature
    pub leading: u64,
    /// Directives and comments after the latest feature
    pub trailing: u64,
}
impl CommentTally {
    fn count(&mut self, kind: RecordKind) {
        match kind {
            RecordKind::Feature => {
                self.features += 1;
                self.trailing = 0;
                return;
            }
            RecordKind::Directive => self.directives += 1,
            RecordKind::Comment => self.comments += 1,
        }
        if self.features == 0 {
            self.leading += 1;
        } else {
            self.trailing += 1;
        }
    }
}

/// Region that lines must intersect to be decoded in full
///
/// Coordinates are 1-based and inclusive.
#[derive(Debug, Clone)]
pub(crate) struct LineFilter {
    pub seqname: String,
    pub first: u64,
    pub last: u64,
}

/// Outcome of scanning one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineOutcome {
    Record,
    /// The line was rejected by the filter; `past_end` when it starts after the
    /// filtered range
    Rejected { past_end: bool },
    End(EndOfStream),
}

/// Fills a record and applies the optional filter
struct Collector<'a> {
    record: &'a mut FeatureRecord,
    filter: Option<&'a LineFilter>,
    past_end: bool,
}
impl FieldSink for Collector<'_> {
    fn field(&mut self, field: Field, span: Span) -> bool {
        self.record.field(field, span);
        let Some(filter) = self.filter else {
            return true;
        };
        match field {
            Field::Seqid => self.record.seqid() == filter.seqname,
            Field::End => match (self.record.start(), self.record.end()) {
                (Some(start), _) if start > filter.last => {
                    self.past_end = true;
                    false
                }
                (Some(_), Some(end)) => end >= filter.first,
                _ => false,
            },
            _ => true,
        }
    }

    fn attribute_key(&mut self, span: Span) {
        self.record.attribute_key(span);
    }

    fn attribute_value(&mut self, span: Span) {
        self.record.attribute_value(span);
    }
}

/// Streaming GFF3 reader over any [`BufRead`]
///
/// Lines are scanned straight out of the source buffer and copied into a caller
/// supplied [`FeatureRecord`]. Blank lines are skipped; directives and comments are
/// returned as records of their own kind and counted in a [`CommentTally`].
///
/// Reading stops without consuming anything at a line starting with `>`, and
/// right after a `##FASTA` directive, leaving the embedded sequences to
/// [`GffReader::into_trailing_payload`].
///
/// # Examples
///
/// ```rust
/// use trackseek::gff::{FeatureRecord, GffReader, ReadOutcome};
///
/// let text = "##gff-version 3\nchr1\t.\tgene\t1000\t2000\t.\t+\t.\tID=g1\n";
/// let mut reader = GffReader::new(text.as_bytes());
/// let mut record = FeatureRecord::new();
/// while reader.read_record(&mut record)? == ReadOutcome::Record {
///     if record.is_feature() {
///         assert_eq!(record.start(), Some(1000));
///     }
/// }
/// assert!(!reader.has_trailing_payload()?);
/// # Ok::<(), trackseek::Error>(())
/// ```
pub struct GffReader<R> {
    inner: R,
    scanner: Scanner,
    tally: CommentTally,
    end: Option<EndOfStream>,
    /// A `##FASTA` directive was returned
    fasta: bool,
}
impl<R: BufRead> GffReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            scanner: Scanner::new(),
            tally: CommentTally::default(),
            end: None,
            fasta: false,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Counts of the lines returned since the reader was created or repositioned
    #[must_use]
    pub fn tally(&self) -> CommentTally {
        self.tally
    }

    /// Forgets the line state after the source was repositioned
    ///
    /// Line numbers restart at 1 and the tally starts over.
    pub(crate) fn reset(&mut self) {
        self.scanner.reset();
        self.tally = CommentTally::default();
        self.end = None;
        self.fasta = false;
    }

    /// Reads the next record into `record`
    ///
    /// # Errors
    ///
    /// * `RecordError::MalformedRecord` for a line breaking the grammar. The line is
    ///   skipped, so reading may continue with the next one.
    /// * Any I/O error from the source
    pub fn read_record(&mut self, record: &mut FeatureRecord) -> Result<ReadOutcome> {
        loop {
            match self.read_line(record, None)? {
                LineOutcome::Record => return Ok(ReadOutcome::Record),
                LineOutcome::Rejected { .. } => {}
                LineOutcome::End(end) => return Ok(ReadOutcome::End(end)),
            }
        }
    }

    /// Iterator over owned copies of the remaining records
    pub fn records(&mut self) -> Records<'_, R> {
        Records {
            reader: self,
            record: FeatureRecord::new(),
            done: false,
        }
    }

    /// Whether embedded sequence data follows the records
    ///
    /// # Errors
    ///
    /// * `QueryError::NotDrained` if the records have not been read to the end
    pub fn has_trailing_payload(&self) -> Result<bool> {
        match self.end {
            Some(end) => Ok(end == EndOfStream::TrailingPayload),
            None => Err(QueryError::NotDrained.into()),
        }
    }

    /// Returns the source, positioned right after the last record read
    ///
    /// # Errors
    ///
    /// * `QueryError::NotDrained` if the records have not been read to the end
    pub fn into_trailing_payload(self) -> Result<R> {
        match self.end {
            Some(_) => Ok(self.inner),
            None => Err(QueryError::NotDrained.into()),
        }
    }

    fn stop(&mut self, end: EndOfStream) -> LineOutcome {
        if self.end.is_none() {
            debug!("GFF stream ended at line {}: {end:?}", self.scanner.line());
        }
        self.end = Some(end);
        LineOutcome::End(end)
    }

    /// Scans the next non-blank line
    pub(crate) fn read_line(
        &mut self,
        record: &mut FeatureRecord,
        filter: Option<&LineFilter>,
    ) -> Result<LineOutcome> {
        if let Some(end) = self.end {
            return Ok(LineOutcome::End(end));
        }
        if self.fasta {
            return Ok(self.stop(EndOfStream::TrailingPayload));
        }

        record.reset(self.scanner.line());
        let mut sink = Collector {
            record,
            filter,
            past_end: false,
        };
        loop {
            let (used, step) = {
                let buf = self.inner.fill_buf()?;
                if buf.is_empty() {
                    match self.scanner.finish(&mut sink)? {
                        Some(step) => (0, Ok(step)),
                        None => return Ok(self.stop(EndOfStream::Clean)),
                    }
                } else {
                    scan(&mut self.scanner, buf, &mut sink)
                }
            };
            self.inner.consume(used);

            match step? {
                Step::Pending => {}
                Step::Blank => sink.record.reset(self.scanner.line()),
                Step::Trailing => return Ok(self.stop(EndOfStream::TrailingPayload)),
                Step::Skipped => {
                    return Ok(LineOutcome::Rejected {
                        past_end: sink.past_end,
                    })
                }
                Step::Line(kind) => {
                    sink.record.finish(kind);
                    self.tally.count(kind);
                    if kind == RecordKind::Directive
                        && sink.record.text().trim_ascii_end() == b"FASTA"
                    {
                        self.fasta = true;
                    }
                    return Ok(LineOutcome::Record);
                }
            }
        }
    }
}

/// Feeds `buf` to the scanner until a line ends
///
/// Returns the number of bytes used along with the last step.
fn scan(scanner: &mut Scanner, buf: &[u8], sink: &mut Collector<'_>) -> (usize, Result<Step>) {
    let mut i = 0;
    while i < buf.len() {
        if scanner.is_skipping() {
            match memchr(b'\n', &buf[i..]) {
                Some(p) => i += p,
                None => return (buf.len(), Ok(Step::Pending)),
            }
        }
        let byte = buf[i];
        match scanner.step(byte, sink) {
            Ok(Step::Pending) => {
                sink.record.push(byte);
                i += 1;
            }
            Ok(Step::Trailing) => return (i, Ok(Step::Trailing)),
            Ok(step) => return (i + 1, Ok(step)),
            Err(e) => return (i + 1, Err(e)),
        }
    }
    (buf.len(), Ok(Step::Pending))
}

/// Iterator returned by [`GffReader::records`]
///
/// Fused after the first error.
pub struct Records<'a, R> {
    reader: &'a mut GffReader<R>,
    record: FeatureRecord,
    done: bool,
}
impl<R: BufRead> Iterator for Records<'_, R> {
    type Item = Result<FeatureRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_record(&mut self.record) {
            Ok(ReadOutcome::Record) => Some(Ok(self.record.clone())),
            Ok(ReadOutcome::End(_)) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
