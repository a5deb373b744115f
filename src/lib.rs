//! Indexed overlap queries over genomic interval files
//!
//! Two formats share a single query surface, [`OverlapRead`]:
//!
//! * [`gff::IndexedGffReader`]: GFF3 text compressed with BGZF, indexed by a tabix sidecar
//! * [`bigwig::BigWigReader`]: bigWig signal containers with their built-in R-tree
//!
//! Regions use 1-based inclusive coordinates and parse from `seqname[:first[-last]]`.

pub mod bgzf;
pub mod bigwig;
pub mod error;
pub mod gff;
pub mod interval;
pub mod overlap;
pub mod tabix;

#[cfg(test)]
mod fixtures;

pub use bigwig::{BigWigReader, BigWigReaderBuilder, SignalRecord};
pub use error::{Error, HeaderError, IndexError, QueryError, RecordError, Result};
pub use gff::{FeatureRecord, GffReader, IndexedGffReader};
pub use interval::{Interval, Region, Strand};
pub use overlap::OverlapRead;
pub use tabix::{BlockOffsetIndex, TabixIndex};
