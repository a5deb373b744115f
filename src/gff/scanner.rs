//! Byte-at-a-time scanner for GFF3 lines
//!
//! The scanner is a hand-written state machine. It never buffers: callers feed it
//! one byte at a time (keeping the line bytes themselves if they need them) and it
//! reports field boundaries as [`Span`]s relative to the start of the line through
//! a [`FieldSink`]. State survives across buffer refills, so lines may straddle
//! any number of reads.

use crate::error::{RecordError, Result};

use super::record::{RecordKind, Span};

/// Columns of a feature line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Seqid,
    Source,
    Type,
    Start,
    End,
    Score,
    Strand,
    Phase,
    Attributes,
}
impl Field {
    /// Column following this one
    fn next(self) -> Self {
        match self {
            Self::Seqid => Self::Source,
            Self::Source => Self::Type,
            Self::Type => Self::Start,
            Self::Start => Self::End,
            Self::End => Self::Score,
            Self::Score => Self::Strand,
            Self::Strand => Self::Phase,
            Self::Phase | Self::Attributes => Self::Attributes,
        }
    }

    /// 0-based column index
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Receiver of the spans found by the scanner
pub trait FieldSink {
    /// A column of a feature line is complete
    ///
    /// Returning `false` rejects the line: the remaining columns are not validated
    /// and the line ends with [`Step::Skipped`].
    fn field(&mut self, field: Field, span: Span) -> bool;

    /// An attribute key is complete
    fn attribute_key(&mut self, span: Span);

    /// A value of the last attribute key is complete
    fn attribute_value(&mut self, span: Span);
}

/// Outcome of feeding one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The line continues
    Pending,
    /// The byte ended a line of the given kind
    Line(RecordKind),
    /// The byte ended an empty or whitespace-only line
    Blank,
    /// The byte ended a line rejected by the sink
    Skipped,
    /// A `>` starts the line: embedded sequence data follows. The byte is not
    /// consumed and the scanner stays put.
    Trailing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    LineStart,
    /// `#` seen at the start of the line
    Hash,
    Directive,
    Comment,
    Blank,
    SkipLine,
    /// Inside one of the first eight columns
    Column(Field),
    /// First byte of the attribute column
    AttrStart,
    /// `.` as first byte of the attribute column
    AttrDot,
    /// Start of a key after `;`
    AttrNext,
    AttrKey,
    AttrValue,
    /// `\r` seen, `\n` must follow
    ExpectLf(Step),
}

/// The line state machine
#[derive(Debug, Clone)]
pub struct Scanner {
    state: State,
    /// 1-based number of the current line
    line: u64,
    /// Column of the next byte, relative to the start of the line
    col: usize,
    /// Column where the current field or key/value starts
    mark: usize,
    /// Whether the current numeric column is a lone `.`
    dot: bool,
    /// Whether the current score column holds a digit
    digit: bool,
    /// Column where the attribute column starts
    attr_start: usize,
    /// Whether the line so far is only spaces and tabs
    blank: bool,
}
impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}
impl Scanner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::LineStart,
            line: 1,
            col: 0,
            mark: 0,
            dot: false,
            digit: false,
            attr_start: 0,
            blank: true,
        }
    }

    /// 1-based number of the line being scanned
    #[must_use]
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Whether the scanner sits at the start of a line
    #[must_use]
    pub fn at_line_start(&self) -> bool {
        self.state == State::LineStart
    }

    /// Whether the current line was rejected and is being skipped
    #[must_use]
    pub fn is_skipping(&self) -> bool {
        self.state == State::SkipLine
    }

    /// Restarts line counting, for use after the input was repositioned
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Feeds one byte
    ///
    /// # Errors
    ///
    /// * `RecordError::MalformedRecord` if the byte breaks the line grammar. The
    ///   scanner then skips to the end of the line so that scanning can resume on
    ///   the next one.
    pub fn step<S: FieldSink>(&mut self, byte: u8, sink: &mut S) -> Result<Step> {
        if !matches!(byte, b' ' | b'\t' | b'\r' | b'\n') {
            self.blank = false;
        }
        let step = self.dispatch(byte, sink);
        if let Ok(Step::Pending) = step {
            self.col += 1;
        }
        step
    }

    fn dispatch<S: FieldSink>(&mut self, byte: u8, sink: &mut S) -> Result<Step> {
        Ok(match self.state {
            State::LineStart => self.line_start(byte, sink)?,
            State::Hash => match byte {
                b'#' => self.goto(State::Directive),
                b'\n' => self.end_line(Step::Line(RecordKind::Comment)),
                b'\r' => self.goto(State::ExpectLf(Step::Line(RecordKind::Comment))),
                _ => self.goto(State::Comment),
            },
            State::Directive | State::Comment => {
                let kind = if self.state == State::Directive {
                    RecordKind::Directive
                } else {
                    RecordKind::Comment
                };
                match byte {
                    b'\n' => self.end_line(Step::Line(kind)),
                    b'\r' => self.goto(State::ExpectLf(Step::Line(kind))),
                    _ => Step::Pending,
                }
            }
            State::Blank => match byte {
                b' ' | b'\t' => Step::Pending,
                b'\n' => self.end_line(Step::Blank),
                b'\r' => self.goto(State::ExpectLf(Step::Blank)),
                _ => return self.fail(byte, "unexpected byte in blank line"),
            },
            State::SkipLine => match byte {
                b'\n' => self.end_line(Step::Skipped),
                _ => Step::Pending,
            },
            State::Column(field) => self.column(field, byte, sink)?,
            State::AttrStart => match byte {
                b'.' => self.goto(State::AttrDot),
                b'\n' | b'\r' => self.end_feature(byte, sink),
                _ => self.key_byte(byte, sink)?,
            },
            State::AttrDot => match byte {
                b'\n' | b'\r' => self.end_feature(byte, sink),
                _ => self.key_byte(byte, sink)?,
            },
            State::AttrNext => match byte {
                b'\n' | b'\r' => self.end_feature(byte, sink),
                _ => self.key_byte(byte, sink)?,
            },
            State::AttrKey => self.key_byte(byte, sink)?,
            State::AttrValue => match byte {
                b',' => {
                    sink.attribute_value(self.span());
                    self.mark = self.col + 1;
                    Step::Pending
                }
                b';' => {
                    sink.attribute_value(self.span());
                    self.mark = self.col + 1;
                    self.goto(State::AttrNext)
                }
                b'\n' | b'\r' => {
                    sink.attribute_value(self.span());
                    self.end_feature(byte, sink)
                }
                b'\t' => return self.fail(byte, "tab inside attribute value"),
                _ => Step::Pending,
            },
            State::ExpectLf(pending) => match byte {
                b'\n' => self.end_line(pending),
                _ => return Err(self.malformed(byte, "carriage return not followed by line feed")),
            },
        })
    }

    /// Ends a final line that lacks a terminator
    ///
    /// Returns `None` when no line is in progress.
    pub fn finish<S: FieldSink>(&mut self, sink: &mut S) -> Result<Option<Step>> {
        match self.state {
            State::LineStart => Ok(None),
            State::ExpectLf(pending) => Ok(Some(self.end_line(pending))),
            _ => self.step(b'\n', sink).map(Some),
        }
    }

    fn goto(&mut self, state: State) -> Step {
        self.state = state;
        Step::Pending
    }

    fn span(&self) -> Span {
        Span::new(self.mark, self.col)
    }

    fn end_line(&mut self, step: Step) -> Step {
        self.state = State::LineStart;
        self.line += 1;
        self.col = 0;
        self.mark = 0;
        self.blank = true;
        step
    }

    /// Rejects `byte`, unless the line so far is whitespace only
    fn fail(&mut self, byte: u8, reason: &'static str) -> Result<Step> {
        if self.blank {
            match byte {
                b' ' | b'\t' => return Ok(self.goto(State::Blank)),
                b'\n' => return Ok(self.end_line(Step::Blank)),
                b'\r' => return Ok(self.goto(State::ExpectLf(Step::Blank))),
                _ => {}
            }
        }
        Err(self.malformed(byte, reason))
    }

    /// Builds the error for `byte` and skips the rest of the line
    fn malformed(&mut self, byte: u8, reason: &'static str) -> crate::Error {
        let err = RecordError::MalformedRecord {
            line: self.line,
            column: self.col as u64 + 1,
            reason,
            offset: None,
        };
        if byte == b'\n' {
            self.end_line(Step::Skipped);
        } else {
            self.state = State::SkipLine;
        }
        err.into()
    }

    fn line_start<S: FieldSink>(&mut self, byte: u8, sink: &mut S) -> Result<Step> {
        self.mark = 0;
        Ok(match byte {
            b'>' => return Ok(Step::Trailing),
            b'#' => self.goto(State::Hash),
            b'\n' => self.end_line(Step::Blank),
            b'\r' => self.goto(State::ExpectLf(Step::Blank)),
            b' ' => self.goto(State::Blank),
            _ => return self.column(Field::Seqid, byte, sink),
        })
    }

    /// Completes a column at a tab and moves to the next one
    fn next_column<S: FieldSink>(&mut self, field: Field, sink: &mut S) -> Step {
        let accepted = sink.field(field, self.span());
        self.mark = self.col + 1;
        self.dot = false;
        self.digit = false;
        if !accepted {
            return self.goto(State::SkipLine);
        }
        match field.next() {
            Field::Attributes => {
                self.attr_start = self.mark;
                self.goto(State::AttrStart)
            }
            next => self.goto(State::Column(next)),
        }
    }

    fn column<S: FieldSink>(&mut self, field: Field, byte: u8, sink: &mut S) -> Result<Step> {
        self.state = State::Column(field);
        let len = self.col - self.mark;
        match field {
            Field::Seqid => match byte {
                b'\t' => Ok(self.next_column(field, sink)),
                b if is_seqid_byte(b) => Ok(Step::Pending),
                _ => self.fail(byte, "invalid byte in seqid"),
            },
            Field::Source | Field::Type => match byte {
                b'\t' => Ok(self.next_column(field, sink)),
                b if is_control(b) => self.fail(byte, "line ends before column 9"),
                _ => Ok(Step::Pending),
            },
            Field::Start | Field::End => match byte {
                b'\t' if len > 0 => Ok(self.next_column(field, sink)),
                b'.' if len == 0 => {
                    self.dot = true;
                    Ok(Step::Pending)
                }
                b'0'..=b'9' if !self.dot => Ok(Step::Pending),
                _ => self.fail(byte, "coordinate must be digits or '.'"),
            },
            Field::Score => match byte {
                b'\t' if len > 0 && (self.digit || (len == 1 && self.dot)) => {
                    Ok(self.next_column(field, sink))
                }
                b'0'..=b'9' => {
                    self.digit = true;
                    Ok(Step::Pending)
                }
                b'.' if len == 0 => {
                    self.dot = true;
                    Ok(Step::Pending)
                }
                b if b != b'\t' && !is_control(b) && b.is_ascii() => Ok(Step::Pending),
                _ => self.fail(byte, "score must be numeric or '.'"),
            },
            Field::Strand => match byte {
                b'\t' if len == 1 => Ok(self.next_column(field, sink)),
                b'+' | b'-' | b'?' | b'.' if len == 0 => Ok(Step::Pending),
                _ => self.fail(byte, "strand must be one of + - ? ."),
            },
            Field::Phase => match byte {
                b'\t' if len == 1 => Ok(self.next_column(field, sink)),
                b'0' | b'1' | b'2' | b'.' if len == 0 => Ok(Step::Pending),
                _ => self.fail(byte, "phase must be one of 0 1 2 ."),
            },
            Field::Attributes => Ok(self.goto(State::AttrStart)),
        }
    }

    /// Handles a byte that belongs to, or ends, an attribute key
    fn key_byte<S: FieldSink>(&mut self, byte: u8, sink: &mut S) -> Result<Step> {
        match byte {
            b'=' if self.col > self.mark => {
                sink.attribute_key(self.span());
                self.mark = self.col + 1;
                Ok(self.goto(State::AttrValue))
            }
            b'=' => self.fail(byte, "empty attribute key"),
            b';' | b',' | b'\t' | b'\r' | b'\n' => self.fail(byte, "attribute key without value"),
            _ => Ok(self.goto(State::AttrKey)),
        }
    }

    /// Completes the attribute column at a line terminator
    fn end_feature<S: FieldSink>(&mut self, byte: u8, sink: &mut S) -> Step {
        let span = Span::new(self.attr_start, self.col);
        let accepted = sink.field(Field::Attributes, span);
        let done = if accepted {
            Step::Line(RecordKind::Feature)
        } else {
            Step::Skipped
        };
        if byte == b'\r' {
            self.goto(State::ExpectLf(done))
        } else {
            self.end_line(done)
        }
    }
}

/// Bytes allowed in a seqid: `[A-Za-z0-9.:^*$@!+_?\-|%]`
#[must_use]
pub fn is_seqid_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'.' | b':' | b'^' | b'*' | b'$' | b'@' | b'!' | b'+' | b'_' | b'?' | b'-' | b'|' | b'%'
        )
}

fn is_control(byte: u8) -> bool {
    byte < 0x20 || byte == 0x7F
}
