//! # Sidecar block-offset indexes
//!
//! Random access into a BGZF-compressed text file goes through a sidecar index that
//! maps a genomic range to the [`Chunk`]s of virtual offsets that may hold
//! overlapping lines. The query engine only depends on [`BlockOffsetIndex`]; the
//! tabix (`.tbi`) format is provided by [`TabixIndex`].
//!
//! ## Tabix layout
//!
//! ```text
//! +------------------+
//! | "TBI\1"          |  magic
//! | n_ref, format,   |  i32 header fields
//! | columns, meta,   |
//! | skip, l_nm       |
//! | names            |  NUL-terminated sequence names
//! +------------------+
//! | per reference:   |
//! |   bins           |  bin id -> chunks of virtual offsets
//! |   linear index   |  lowest offset per 16 kbp window
//! +------------------+
//! ```
//!
//! On disk the index is usually BGZF compressed; raw indexes are read as well.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;

use auto_impl::auto_impl;
use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::MultiGzDecoder;
use log::debug;

use crate::bgzf::VirtualOffset;
use crate::error::{Error, HeaderError, IndexError, QueryError, Result};

/// Magic bytes of a tabix index
pub const TBI_MAGIC: &[u8; 4] = b"TBI\x01";

/// Bin holding metadata pseudo-chunks instead of data
const METADATA_BIN: u32 = 37_450;

/// Leading bytes of a gzip member
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Largest element count reserved up front from a count read off the file
const MAX_RESERVE: usize = 1 << 16;

/// Width of a linear index window, as a shift
const LINEAR_SHIFT: u32 = 14;

/// A range of virtual offsets `[start, end)` that may hold matching lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Chunk {
    pub start: VirtualOffset,
    pub end: VirtualOffset,
}
impl Chunk {
    #[must_use]
    pub fn new(start: VirtualOffset, end: VirtualOffset) -> Self {
        Self { start, end }
    }
}

/// Maps genomic ranges to BGZF chunks
///
/// Implemented for references, boxes and `Arc`s of any implementor so a single index
/// can be shared by several readers.
#[auto_impl(&, Box, Arc)]
pub trait BlockOffsetIndex {
    /// Chunks that may hold lines overlapping the 0-based half-open `[start, end)`
    ///
    /// Chunks are sorted and do not overlap.
    ///
    /// # Errors
    ///
    /// * `QueryError::UnknownChromosome` if the sequence is not indexed
    fn find_overlaps(&self, seqname: &str, start: u64, end: u64) -> Result<Vec<Chunk>>;

    /// Names of the indexed sequences, in index order
    fn seqnames(&self) -> Vec<&str>;
}

/// Index of one reference sequence
#[derive(Debug, Clone, Default)]
struct ReferenceIndex {
    bins: HashMap<u32, Vec<Chunk>>,
    linear: Vec<VirtualOffset>,
}

/// Parsed tabix index
#[derive(Debug, Clone)]
pub struct TabixIndex {
    /// Format code (0 generic, 1 SAM, 2 VCF)
    pub format: i32,
    /// 1-based column holding the sequence name
    pub col_seq: i32,
    /// 1-based column holding the start
    pub col_beg: i32,
    /// 1-based column holding the end, zero when absent
    pub col_end: i32,
    /// Leading character of lines to skip
    pub meta: u8,
    /// Number of leading lines to skip
    pub skip: i32,
    names: Vec<String>,
    by_name: HashMap<String, usize>,
    references: Vec<ReferenceIndex>,
}
impl TabixIndex {
    /// Reads an index file, BGZF/gzip compressed or raw
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        if file.fill_buf()?.starts_with(&GZIP_MAGIC) {
            Self::from_reader(MultiGzDecoder::new(file))
        } else {
            Self::from_reader(file)
        }
    }

    /// Parses an index from its decompressed bytes
    ///
    /// # Errors
    ///
    /// * `HeaderError::InvalidMagicNumber` if the magic is not `TBI\1`
    /// * `IndexError` if names or counts are inconsistent, or the input ends early
    /// * I/O errors from the source
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = Tracked { inner: reader, pos: 0 };
        Self::parse(&mut reader).map_err(|err| match err {
            Error::IoError(e) if e.kind() == ErrorKind::UnexpectedEof => {
                IndexError::Inconsistent {
                    offset: reader.pos,
                    reason: "index ends early".to_string(),
                }
                .into()
            }
            err => err,
        })
    }

    fn parse<R: Read>(reader: &mut Tracked<R>) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != TBI_MAGIC {
            return Err(HeaderError::InvalidMagicNumber(u32::from_le_bytes(magic)).into());
        }

        let n_ref = reader.count()?;
        let format = reader.read_i32::<LittleEndian>()?;
        let col_seq = reader.read_i32::<LittleEndian>()?;
        let col_beg = reader.read_i32::<LittleEndian>()?;
        let col_end = reader.read_i32::<LittleEndian>()?;
        let meta = reader.read_i32::<LittleEndian>()?;
        let skip = reader.read_i32::<LittleEndian>()?;
        let l_nm = reader.count()?;

        let mut names_buf = Vec::new();
        reader.by_ref().take(l_nm as u64).read_to_end(&mut names_buf)?;
        if names_buf.len() < l_nm {
            return Err(IndexError::Inconsistent {
                offset: reader.pos,
                reason: format!("names need {l_nm} bytes, found {}", names_buf.len()),
            }
            .into());
        }
        let names: Vec<String> = names_buf
            .split(|&b| b == 0)
            .filter(|name| !name.is_empty())
            .map(|name| std::str::from_utf8(name).map(str::to_string))
            .collect::<std::result::Result<_, _>>()?;
        if names.len() != n_ref {
            return Err(IndexError::Inconsistent {
                offset: 32,
                reason: format!(
                    "header announces {n_ref} sequences but names hold {}",
                    names.len()
                ),
            }
            .into());
        }

        let mut references = Vec::with_capacity(n_ref);
        for _ in 0..n_ref {
            let mut reference = ReferenceIndex::default();
            let n_bin = reader.count()?;
            for _ in 0..n_bin {
                let bin = reader.read_u32::<LittleEndian>()?;
                let n_chunk = reader.count()?;
                let mut chunks = Vec::with_capacity(n_chunk.min(MAX_RESERVE));
                for _ in 0..n_chunk {
                    let start = VirtualOffset::from_raw(reader.read_u64::<LittleEndian>()?);
                    let end = VirtualOffset::from_raw(reader.read_u64::<LittleEndian>()?);
                    chunks.push(Chunk::new(start, end));
                }
                if bin != METADATA_BIN {
                    reference.bins.insert(bin, chunks);
                }
            }
            let n_intv = reader.count()?;
            reference.linear.reserve(n_intv.min(MAX_RESERVE));
            for _ in 0..n_intv {
                reference
                    .linear
                    .push(VirtualOffset::from_raw(reader.read_u64::<LittleEndian>()?));
            }
            references.push(reference);
        }

        let by_name = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        debug!("read tabix index with {n_ref} sequences");

        Ok(Self {
            format,
            col_seq,
            col_beg,
            col_end,
            meta: meta as u8,
            skip,
            names,
            by_name,
            references,
        })
    }
}
impl BlockOffsetIndex for TabixIndex {
    fn find_overlaps(&self, seqname: &str, start: u64, end: u64) -> Result<Vec<Chunk>> {
        let Some(&rid) = self.by_name.get(seqname) else {
            return Err(QueryError::UnknownChromosome(seqname.to_string()).into());
        };
        let reference = &self.references[rid];
        let start = start.min(MAX_COORD);
        let end = end.clamp(start + 1, MAX_COORD + 1);

        let mut chunks: Vec<Chunk> = reg2bins(start, end)
            .into_iter()
            .filter_map(|bin| reference.bins.get(&bin))
            .flatten()
            .copied()
            .collect();

        let window = (start >> LINEAR_SHIFT) as usize;
        let min_offset = reference
            .linear
            .get(window)
            .or(reference.linear.last())
            .copied()
            .unwrap_or_default();
        chunks.retain(|chunk| chunk.end > min_offset);

        Ok(merge_chunks(chunks))
    }

    fn seqnames(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }
}

/// Largest coordinate covered by the binning scheme
const MAX_COORD: u64 = (1 << 29) - 1;

/// Bins that may hold features overlapping `[beg, end)`
pub(crate) fn reg2bins(beg: u64, end: u64) -> Vec<u32> {
    let end = end - 1;
    let mut bins = vec![0];
    for level in 1..=5u32 {
        let offset = ((1u64 << (3 * level)) - 1) / 7;
        let shift = 29 - 3 * level;
        for bin in (offset + (beg >> shift))..=(offset + (end >> shift)) {
            bins.push(bin as u32);
        }
    }
    bins
}

/// Sorts chunks and merges overlapping or touching ones
fn merge_chunks(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks.sort_unstable();
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match merged.last_mut() {
            Some(last) if chunk.start <= last.end => last.end = last.end.max(chunk.end),
            _ => merged.push(chunk),
        }
    }
    merged
}

/// Source wrapper counting the bytes consumed, for error offsets
struct Tracked<R> {
    inner: R,
    pos: u64,
}
impl<R: Read> Tracked<R> {
    /// Reads a non-negative i32 count
    fn count(&mut self) -> Result<usize> {
        let offset = self.pos;
        let value = self.read_i32::<LittleEndian>()?;
        usize::try_from(value).map_err(|_| {
            IndexError::Inconsistent {
                offset,
                reason: format!("negative count {value}"),
            }
            .into()
        })
    }
}
impl<R: Read> Read for Tracked<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}
