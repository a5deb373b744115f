//! # bigWig signal containers
//!
//! This module reads the binary signal-track container (BBI, version 3 and later).
//! The container is self-indexed: a chromosome dictionary maps names to compact
//! integer IDs and an R-tree over `(chrom_id, base)` coordinates maps genomic ranges
//! to independently compressed data blocks.
//!
//! ## File Structure
//!
//! ```text
//! +------------------+ 0
//! |   File Header    |  64 bytes: magic, version, offsets, buffer size
//! +------------------+ 64
//! |  Zoom Headers    |  24 bytes per reduction level
//! +------------------+
//! |  Total Summary   |  40 bytes (optional)
//! +------------------+ chrom_tree_offset
//! | Chromosome Tree  |  B+ tree: name -> (id, length)
//! +------------------+ full_data_offset
//! |   Data Blocks    |  compressed sections of signal items
//! +------------------+ full_index_offset
//! |   R-tree Index   |  (chrom, base) ranges -> data blocks
//! +------------------+
//! |  Zoom Data/Index |  one block set and R-tree per level
//! +------------------+
//! ```
//!
//! ## Data Blocks
//!
//! A decompressed block holds one or more sections. Every section shares a chromosome
//! and an encoding for its items:
//!
//! ```text
//! +----------------+----------+----------+---------+
//! | Section Header | Item 1   | Item 2   |  ...    |
//! |   (24 bytes)   | (4/8/12) | (4/8/12) |         |
//! +----------------+----------+----------+---------+
//! ```
//!
//! * explicit span (bedGraph): `start, end, value`
//! * variable step: `start, value`, span from the section header
//! * fixed step: `value`, start derived from the section start and step
//!
//! All integers follow the byte order announced by the magic number.
//!
//! ## Example
//!
//! ```rust,no_run
//! use trackseek::bigwig::BigWigReader;
//!
//! let mut reader = BigWigReader::open_mmap("signal.bw").unwrap();
//! let region = "chr2:500-600".parse().unwrap();
//! for record in reader.query_region(&region).unwrap() {
//!     let record = record.unwrap();
//!     println!("{}\t{}\t{}", record.start, record.end, record.value);
//! }
//! ```

pub mod chrom;
pub mod codec;
pub mod header;
pub mod index;
pub mod reader;
pub mod section;
pub mod zoom;

use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{IndexError, Result};

pub use chrom::{ChromDictionary, ChromEntry};
pub use codec::Codec;
pub use header::{BbiHeader, Summary, ZoomHeader};
pub use index::{Block, BlockSearch, Blocks, Bounds, CirTreeHeader};
pub use reader::{BigWigReader, BigWigReaderBuilder, MmapSource, Values};
pub use section::{Encoding, SectionBlock, SectionHeader, SectionPolicy, SignalRecord};
pub use zoom::{ZoomBlock, ZoomRecord};

/// Byte order of a container, fixed by the magic number in its header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}
impl Endianness {
    #[must_use]
    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            Self::Little => LittleEndian::read_u16(buf),
            Self::Big => BigEndian::read_u16(buf),
        }
    }

    #[must_use]
    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Self::Little => LittleEndian::read_u32(buf),
            Self::Big => BigEndian::read_u32(buf),
        }
    }

    #[must_use]
    pub fn read_u64(self, buf: &[u8]) -> u64 {
        match self {
            Self::Little => LittleEndian::read_u64(buf),
            Self::Big => BigEndian::read_u64(buf),
        }
    }

    #[must_use]
    pub fn read_f32(self, buf: &[u8]) -> f32 {
        match self {
            Self::Little => LittleEndian::read_f32(buf),
            Self::Big => BigEndian::read_f32(buf),
        }
    }

    #[must_use]
    pub fn read_f64(self, buf: &[u8]) -> f64 {
        match self {
            Self::Little => LittleEndian::read_f64(buf),
            Self::Big => BigEndian::read_f64(buf),
        }
    }
}

/// Reads exactly `buf.len()` bytes at an absolute offset
///
/// The range is checked against `file_len` first so that corrupt pointers surface as
/// index errors (carrying `origin`, the offset of the structure holding the pointer)
/// instead of short reads.
pub(crate) fn read_exact_at<R: Read + Seek>(
    src: &mut R,
    origin: u64,
    offset: u64,
    file_len: u64,
    buf: &mut [u8],
) -> Result<()> {
    let end = offset.checked_add(buf.len() as u64);
    if end.is_none_or(|end| end > file_len) {
        return Err(IndexError::OutOfBounds {
            offset: origin,
            target: offset,
            len: file_len,
        }
        .into());
    }
    src.seek(SeekFrom::Start(offset))?;
    src.read_exact(buf)?;
    Ok(())
}
