//! # Data sections
//!
//! A decompressed data block is a run of sections. Each section starts with a
//! 24-byte [`SectionHeader`] and holds `item_count` fixed-size items in one of three
//! [`Encoding`]s. Items are decoded strictly in order: a new header is only read
//! once every item of the previous section has been produced.

use log::warn;

use super::index::Block;
use super::reader::BlockDecode;
use super::{Codec, Endianness};
use crate::error::{RecordError, Result};

/// Size of a section header in bytes
pub const SIZE_SECTION_HEADER: usize = 24;

/// Positional encoding of the items of a section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Encoding {
    /// `start u32, end u32, value f32`
    BedGraph = 1,
    /// `start u32, value f32`; end is `start + item_span`
    VarStep = 2,
    /// `value f32`; start is `chrom_start + index * item_step`
    FixedStep = 3,
}
impl Encoding {
    #[must_use]
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::BedGraph),
            2 => Some(Self::VarStep),
            3 => Some(Self::FixedStep),
            _ => None,
        }
    }

    /// Size of one item in bytes
    #[must_use]
    pub fn item_size(self) -> usize {
        match self {
            Self::BedGraph => 12,
            Self::VarStep => 8,
            Self::FixedStep => 4,
        }
    }
}

/// Header shared by every item of a section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionHeader {
    pub chrom_id: u32,
    pub chrom_start: u32,
    pub chrom_end: u32,
    pub item_step: u32,
    pub item_span: u32,
    pub encoding: Encoding,
    pub item_count: u16,
}
impl SectionHeader {
    /// Parses a section header
    ///
    /// # Parameters
    ///
    /// * `buffer` - The raw header bytes
    /// * `e` - Byte order of the container
    /// * `block_offset` - File offset of the enclosing block, for error reporting
    ///
    /// # Errors
    ///
    /// * `RecordError::UnsupportedEncoding` if the type tag is not 1, 2 or 3
    pub fn from_bytes(
        buffer: &[u8; SIZE_SECTION_HEADER],
        e: Endianness,
        block_offset: u64,
    ) -> Result<Self> {
        let Some(encoding) = Encoding::from_u8(buffer[20]) else {
            return Err(RecordError::UnsupportedEncoding {
                encoding: buffer[20],
                offset: block_offset,
            }
            .into());
        };
        Ok(Self {
            chrom_id: e.read_u32(&buffer[0..4]),
            chrom_start: e.read_u32(&buffer[4..8]),
            chrom_end: e.read_u32(&buffer[8..12]),
            item_step: e.read_u32(&buffer[12..16]),
            item_span: e.read_u32(&buffer[16..20]),
            encoding,
            item_count: e.read_u16(&buffer[22..24]),
        })
    }

    /// Start of the fixed-step item at `index`
    #[must_use]
    pub fn fixed_step_start(&self, index: u16) -> u32 {
        self.chrom_start
            .saturating_add(u32::from(index).saturating_mul(self.item_step))
    }

    /// Size of the section body in bytes
    #[must_use]
    pub fn body_size(&self) -> usize {
        self.encoding.item_size() * self.item_count as usize
    }
}

/// One decoded signal item
///
/// Coordinates are 0-based and half-open, as stored in the container. The section
/// header travels with the record so fixed-step continuations can be derived
/// without reading further items.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalRecord {
    pub chrom_id: u32,
    pub start: u32,
    pub end: u32,
    pub value: f32,
    /// Position of the item within its section
    pub index: u16,
    pub section: SectionHeader,
}
impl SignalRecord {
    /// Span of the item following this one in a fixed-step section
    ///
    /// Returns `None` for other encodings and for the last item of a section.
    #[must_use]
    pub fn next_fixed_step(&self) -> Option<(u32, u32)> {
        if self.section.encoding != Encoding::FixedStep
            || self.index + 1 >= self.section.item_count
        {
            return None;
        }
        let start = self.section.fixed_step_start(self.index + 1);
        Some((start, start.saturating_add(self.section.item_span)))
    }
}

/// What to do with a block whose sections cannot be decoded
///
/// Applies to unknown encodings and truncated sections. Item sizes of an unknown
/// encoding are not knowable, so nothing after it in the same block can be located.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SectionPolicy {
    /// Surface the error and end iteration
    #[default]
    Fail,
    /// Log a warning, drop the rest of the block and move on to the next block
    SkipBlock,
}
impl SectionPolicy {
    /// Decides whether an error raised while decoding a block can be skipped
    pub(crate) fn skips(self, err: &crate::Error, block: &Block) -> bool {
        let skippable = matches!(
            err,
            crate::Error::RecordError(
                RecordError::UnsupportedEncoding { .. } | RecordError::TruncatedSection { .. }
            )
        );
        if skippable && self == Self::SkipBlock {
            warn!(
                "skipping remainder of block at byte {} ({} bytes): {err}",
                block.offset, block.size
            );
            return true;
        }
        false
    }
}

/// A decompressed data block and a cursor over its sections
///
/// The block is reused across loads, keeping its buffer allocation.
#[derive(Debug, Default)]
pub struct SectionBlock {
    endianness: Endianness,
    /// File offset of the loaded block
    offset: u64,
    /// Decompressed block contents
    ubuf: Vec<u8>,
    /// Read position in `ubuf`
    pos: usize,
    /// Section being decoded
    current: Option<SectionHeader>,
    /// Index of the next item in the current section
    index: u16,
}
impl SectionBlock {
    #[must_use]
    pub fn new(endianness: Endianness) -> Self {
        Self {
            endianness,
            ..Self::default()
        }
    }

    /// Loads already decompressed bytes
    pub fn ingest_bytes(&mut self, offset: u64, bytes: &[u8]) {
        self.clear();
        self.offset = offset;
        self.ubuf.extend_from_slice(bytes);
    }

    /// Number of undecoded bytes left in the block
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.ubuf.len() - self.pos
    }

    fn truncated(&mut self) -> crate::Error {
        let remaining = self.remaining();
        self.pos = self.ubuf.len();
        self.current = None;
        RecordError::TruncatedSection {
            offset: self.offset,
            remaining,
        }
        .into()
    }

    fn next_header(&mut self) -> Result<SectionHeader> {
        if self.remaining() < SIZE_SECTION_HEADER {
            return Err(self.truncated());
        }
        let mut buffer = [0u8; SIZE_SECTION_HEADER];
        buffer.copy_from_slice(&self.ubuf[self.pos..self.pos + SIZE_SECTION_HEADER]);
        match SectionHeader::from_bytes(&buffer, self.endianness, self.offset) {
            Ok(header) => {
                self.pos += SIZE_SECTION_HEADER;
                Ok(header)
            }
            Err(err) => {
                // the body size is unknown, nothing after this header can be located
                self.pos = self.ubuf.len();
                Err(err)
            }
        }
    }

    fn decode_item(&mut self, header: SectionHeader) -> Result<SignalRecord> {
        let size = header.encoding.item_size();
        if self.remaining() < size {
            return Err(self.truncated());
        }
        let e = self.endianness;
        let item = &self.ubuf[self.pos..self.pos + size];
        let (start, end, value) = match header.encoding {
            Encoding::BedGraph => (
                e.read_u32(&item[0..4]),
                e.read_u32(&item[4..8]),
                e.read_f32(&item[8..12]),
            ),
            Encoding::VarStep => {
                let start = e.read_u32(&item[0..4]);
                (
                    start,
                    start.saturating_add(header.item_span),
                    e.read_f32(&item[4..8]),
                )
            }
            Encoding::FixedStep => {
                let start = header.fixed_step_start(self.index);
                (
                    start,
                    start.saturating_add(header.item_span),
                    e.read_f32(&item[0..4]),
                )
            }
        };
        self.pos += size;
        let record = SignalRecord {
            chrom_id: header.chrom_id,
            start,
            end,
            value,
            index: self.index,
            section: header,
        };
        self.index += 1;
        Ok(record)
    }
}
impl BlockDecode for SectionBlock {
    type Item = SignalRecord;

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

    fn next_item(&mut self) -> Option<Result<SignalRecord>> {
        loop {
            if let Some(header) = self.current {
                if self.index < header.item_count {
                    return Some(self.decode_item(header));
                }
                self.current = None;
            }
            if self.remaining() == 0 {
                return None;
            }
            match self.next_header() {
                Ok(header) => {
                    self.current = Some(header);
                    self.index = 0;
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }

    fn locus(item: &SignalRecord) -> (u32, u32, u32) {
        (item.chrom_id, item.start, item.end)
    }

    fn clear(&mut self) {
        self.ubuf.clear();
        self.pos = 0;
        self.current = None;
        self.index = 0;
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::fixtures::Section;

    fn decode_all(bytes: &[u8]) -> Vec<Result<SignalRecord>> {
        let mut block = SectionBlock::new(Endianness::Little);
        block.ingest_bytes(0, bytes);
        std::iter::from_fn(|| block.next_item()).collect()
    }

    fn spans(bytes: &[u8]) -> anyhow::Result<Vec<(u32, u32, f32)>> {
        let mut out = Vec::new();
        for record in decode_all(bytes) {
            let record = record?;
            out.push((record.start, record.end, record.value));
        }
        Ok(out)
    }

    #[test]
    fn test_fixed_step() -> anyhow::Result<()> {
        let section = Section::fixed_step(0, 100, 10, 5, &[1.0, 2.0, 3.0]);
        assert_eq!(
            spans(&section.to_bytes())?,
            vec![(100, 105, 1.0), (110, 115, 2.0), (120, 125, 3.0)]
        );
        Ok(())
    }

    #[test]
    fn test_fixed_step_starts_increase() -> anyhow::Result<()> {
        let values: Vec<f32> = (0..500).map(|v| v as f32).collect();
        let section = Section::fixed_step(3, 7, 25, 25, &values);
        let records: Vec<SignalRecord> = decode_all(&section.to_bytes())
            .into_iter()
            .collect::<Result<_>>()?;
        assert_eq!(records.len(), 500);
        for (n, record) in records.iter().enumerate() {
            assert_eq!(record.start, 7 + n as u32 * 25);
            assert_eq!(record.index as usize, n);
            assert_eq!(record.chrom_id, 3);
        }
        assert!(records.windows(2).all(|w| w[0].start < w[1].start));

        assert_eq!(records[0].next_fixed_step(), Some((32, 57)));
        assert_eq!(records[499].next_fixed_step(), None);
        Ok(())
    }

    #[test]
    fn test_var_step_and_bedgraph() -> anyhow::Result<()> {
        let mut bytes = Section::var_step(0, 20, &[(0, 1.5), (100, 2.5)]).to_bytes();
        bytes.extend(Section::bedgraph(0, &[(500, 520, 9.0), (530, 531, -1.0)]).to_bytes());
        assert_eq!(
            spans(&bytes)?,
            vec![
                (0, 20, 1.5),
                (100, 120, 2.5),
                (500, 520, 9.0),
                (530, 531, -1.0)
            ]
        );
        let records = decode_all(&bytes);
        let first = records[0].as_ref().map_err(|e| anyhow::anyhow!("{e}"))?;
        assert_eq!(first.section.encoding, Encoding::VarStep);
        assert_eq!(first.next_fixed_step(), None);
        Ok(())
    }

    #[test]
    fn test_empty_section_is_skipped() -> anyhow::Result<()> {
        let mut bytes = Section::bedgraph(0, &[]).to_bytes();
        bytes.extend(Section::bedgraph(0, &[(1, 2, 3.0)]).to_bytes());
        assert_eq!(spans(&bytes)?, vec![(1, 2, 3.0)]);
        Ok(())
    }

    #[test]
    fn test_unsupported_encoding() {
        let mut bytes = Section::bedgraph(0, &[(1, 2, 3.0)]).to_bytes();
        let mut bad = Section::bedgraph(0, &[(5, 6, 7.0)]).to_bytes();
        bad[20] = 9;
        bytes.extend(bad);
        let records = decode_all(&bytes);
        assert_eq!(records.len(), 2);
        assert!(records[0].is_ok());
        assert!(matches!(&records[1], Err(e) if e.is_unsupported_encoding()));
    }

    #[test]
    fn test_truncated_section() {
        let mut bytes = Section::bedgraph(0, &[(1, 2, 3.0), (4, 5, 6.0)]).to_bytes();
        bytes.truncate(bytes.len() - 3);
        let records = decode_all(&bytes);
        assert_eq!(records.len(), 2);
        assert!(matches!(
            &records[1],
            Err(crate::Error::RecordError(RecordError::TruncatedSection { remaining: 9, .. }))
        ));
    }
}
