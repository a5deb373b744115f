//! # GFF3 feature annotations
//!
//! GFF3 is line-oriented text. Feature lines have nine tab-separated columns;
//! lines starting with `##` are directives and lines starting with `#` are comments.
//!
//! ## Feature Lines
//!
//! ```text
//! seqid  source  type  start  end  score  strand  phase  attributes
//! chr1   .       gene  1000   2000 .      +       .      ID=g1;Name=a,b
//!   |                   |      |                          |
//!   |                   +------+-- 1-based, inclusive     +-- key=value[,value];...
//!   +-- [A-Za-z0-9.:^*$@!+_?-|%]*
//! ```
//!
//! A line starting with `>` (or the `##FASTA` directive) ends the records: the rest
//! of the file is embedded sequence data, left untouched for the caller.
//!
//! ## Reading
//!
//! ```text
//!   BufRead ---> Scanner ---> FeatureRecord      (GffReader)
//!
//!   BGZF file ---> BgzfReader ---> GffReader      (IndexedGffReader)
//!   .tbi -------> TabixIndex --> chunks to seek
//! ```
//!
//! The [`Scanner`] is a byte-level state machine that keeps its state across buffer
//! refills. [`GffReader`] streams over any [`std::io::BufRead`] and
//! [`IndexedGffReader`] answers overlap queries over BGZF-compressed files through
//! a [`crate::tabix::BlockOffsetIndex`].

pub mod query;
pub mod reader;
pub mod record;
pub mod scanner;

pub use query::{IndexedGffReader, Overlaps};
pub use reader::{CommentTally, EndOfStream, GffReader, ReadOutcome, Records};
pub use record::{AttributeValues, FeatureRecord, RecordKind, Span};
pub use scanner::{Field, FieldSink, Scanner, Step};
