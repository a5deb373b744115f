//! Zoom level records
//!
//! Each zoom level stores pre-aggregated summaries over fixed-width bins, indexed by
//! its own R-tree. Blocks hold a flat run of 32-byte records with no section headers.

use super::index::Block;
use super::reader::BlockDecode;
use super::{Codec, Endianness};
use crate::error::{RecordError, Result};

/// Size of a zoom record in bytes
pub const SIZE_ZOOM_RECORD: usize = 32;

/// Summary of the signal over one bin of a zoom level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomRecord {
    pub chrom_id: u32,
    pub start: u32,
    pub end: u32,
    /// Number of bases with data in the bin
    pub valid_count: u32,
    pub min: f32,
    pub max: f32,
    pub sum: f32,
    pub sum_squares: f32,
}
impl ZoomRecord {
    #[must_use]
    pub fn from_bytes(buffer: &[u8], e: Endianness) -> Self {
        Self {
            chrom_id: e.read_u32(&buffer[0..4]),
            start: e.read_u32(&buffer[4..8]),
            end: e.read_u32(&buffer[8..12]),
            valid_count: e.read_u32(&buffer[12..16]),
            min: e.read_f32(&buffer[16..20]),
            max: e.read_f32(&buffer[20..24]),
            sum: e.read_f32(&buffer[24..28]),
            sum_squares: e.read_f32(&buffer[28..32]),
        }
    }

    /// Mean over the covered bases of the bin
    #[must_use]
    pub fn mean(&self) -> f32 {
        if self.valid_count == 0 {
            return 0.0;
        }
        self.sum / self.valid_count as f32
    }
}

/// A decompressed zoom block and a cursor over its records
#[derive(Debug, Default)]
pub struct ZoomBlock {
    endianness: Endianness,
    offset: u64,
    ubuf: Vec<u8>,
    pos: usize,
}
impl ZoomBlock {
    #[must_use]
    pub fn new(endianness: Endianness) -> Self {
        Self {
            endianness,
            ..Self::default()
        }
    }
}
impl BlockDecode for ZoomBlock {
    type Item = ZoomRecord;

    fn ingest(&mut self, block: &Block, raw: &[u8], codec: Codec, limit: usize) -> Result<()> {
        self.clear();
        self.offset = block.offset;
        let n = codec.decompress(raw, limit, &mut self.ubuf)?;
        if limit > 0 && n > limit {
            self.ubuf.clear();
            return Err(RecordError::OversizedBlock {
                offset: block.offset,
                limit,
            }
            .into());
        }
        Ok(())
    }

    fn next_item(&mut self) -> Option<Result<ZoomRecord>> {
        let remaining = self.ubuf.len() - self.pos;
        if remaining == 0 {
            return None;
        }
        if remaining < SIZE_ZOOM_RECORD {
            self.pos = self.ubuf.len();
            return Some(Err(RecordError::TruncatedSection {
                offset: self.offset,
                remaining,
            }
            .into()));
        }
        let record = ZoomRecord::from_bytes(
            &self.ubuf[self.pos..self.pos + SIZE_ZOOM_RECORD],
            self.endianness,
        );
        self.pos += SIZE_ZOOM_RECORD;
        Some(Ok(record))
    }

    fn locus(item: &ZoomRecord) -> (u32, u32, u32) {
        (item.chrom_id, item.start, item.end)
    }

    fn clear(&mut self) {
        self.ubuf.clear();
        self.pos = 0;
    }
}
