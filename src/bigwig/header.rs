//! # Container header definitions
//!
//! The container opens with three fixed-layout structures:
//!
//! 1. [`BbiHeader`] - the 64-byte file header with the magic number, the version and
//!    the absolute offsets of every other structure.
//! 2. [`ZoomHeader`] - one 24-byte entry per reduction level, directly after the header.
//! 3. [`Summary`] - the optional 40-byte summary of the whole file.
//!
//! The magic number is read in both byte orders; whichever matches fixes the
//! [`Endianness`] used for everything else in the file.

use std::io::{Read, Seek};

use byteorder::{ByteOrder, LittleEndian};

use super::{read_exact_at, Endianness};
use crate::error::{HeaderError, Result};

/// Magic number identifying bigWig containers
pub const BIGWIG_MAGIC: u32 = 0x888F_FC26;

/// Oldest supported format version
pub const MIN_VERSION: u16 = 3;

/// Size of the file header in bytes
pub const SIZE_HEADER: usize = 64;

/// Size of one zoom level header in bytes
pub const SIZE_ZOOM_HEADER: usize = 24;

/// Size of the total summary record in bytes
pub const SIZE_SUMMARY: usize = 40;

/// File header of a bigWig container
///
/// # Fields
///
/// * `version` - Format version, at least 3
/// * `zoom_levels` - Number of zoom headers following the file header
/// * `chrom_tree_offset` - Offset of the chromosome B+ tree
/// * `full_data_offset` - Offset of the full resolution data (starts with a record count)
/// * `full_index_offset` - Offset of the full resolution R-tree
/// * `uncompress_buf_size` - Largest decompressed block; zero for uncompressed files
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BbiHeader {
    /// Byte order announced by the magic number
    pub endianness: Endianness,
    pub version: u16,
    pub zoom_levels: u16,
    pub chrom_tree_offset: u64,
    pub full_data_offset: u64,
    pub full_index_offset: u64,
    /// Number of fields for bigBed files, zero for bigWig
    pub field_count: u16,
    pub defined_field_count: u16,
    pub auto_sql_offset: u64,
    /// Offset of the total summary, zero when absent
    pub total_summary_offset: u64,
    pub uncompress_buf_size: u32,
    pub extension_offset: u64,
}
impl BbiHeader {
    /// Parses a header from its raw bytes
    ///
    /// # Errors
    ///
    /// * `HeaderError::InvalidMagicNumber` if the magic matches in neither byte order
    /// * `HeaderError::InvalidFormatVersion` if the version is older than 3
    pub fn from_bytes(buffer: &[u8; SIZE_HEADER]) -> Result<Self> {
        let magic = LittleEndian::read_u32(&buffer[0..4]);
        let endianness = if magic == BIGWIG_MAGIC {
            Endianness::Little
        } else if magic.swap_bytes() == BIGWIG_MAGIC {
            Endianness::Big
        } else {
            return Err(HeaderError::InvalidMagicNumber(magic).into());
        };
        let e = endianness;

        let version = e.read_u16(&buffer[4..6]);
        if version < MIN_VERSION {
            return Err(HeaderError::InvalidFormatVersion(version).into());
        }

        Ok(Self {
            endianness,
            version,
            zoom_levels: e.read_u16(&buffer[6..8]),
            chrom_tree_offset: e.read_u64(&buffer[8..16]),
            full_data_offset: e.read_u64(&buffer[16..24]),
            full_index_offset: e.read_u64(&buffer[24..32]),
            field_count: e.read_u16(&buffer[32..34]),
            defined_field_count: e.read_u16(&buffer[34..36]),
            auto_sql_offset: e.read_u64(&buffer[36..44]),
            total_summary_offset: e.read_u64(&buffer[44..52]),
            uncompress_buf_size: e.read_u32(&buffer[52..56]),
            extension_offset: e.read_u64(&buffer[56..64]),
        })
    }

    /// Reads the header from the start of a reader
    ///
    /// # Errors
    ///
    /// * `HeaderError::InvalidSize` if the source is shorter than a header
    /// * Any error from [`BbiHeader::from_bytes`]
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buffer = [0u8; SIZE_HEADER];
        let mut filled = 0;
        while filled < SIZE_HEADER {
            match reader.read(&mut buffer[filled..])? {
                0 => return Err(HeaderError::InvalidSize(filled, SIZE_HEADER).into()),
                n => filled += n,
            }
        }
        Self::from_bytes(&buffer)
    }

    /// Whether data blocks are compressed
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.uncompress_buf_size > 0
    }
}

/// Header of a single zoom (reduction) level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoomHeader {
    /// Number of bases summarized by each zoom record
    pub reduction_level: u32,
    /// Offset of the zoom records (starts with a record count)
    pub data_offset: u64,
    /// Offset of the R-tree indexing the zoom records
    pub index_offset: u64,
}
impl ZoomHeader {
    #[must_use]
    pub fn from_bytes(buffer: &[u8; SIZE_ZOOM_HEADER], e: Endianness) -> Self {
        Self {
            reduction_level: e.read_u32(&buffer[0..4]),
            data_offset: e.read_u64(&buffer[8..16]),
            index_offset: e.read_u64(&buffer[16..24]),
        }
    }

    /// Reads every zoom header announced by the file header
    pub(crate) fn read_all<R: Read + Seek>(
        src: &mut R,
        header: &BbiHeader,
        file_len: u64,
    ) -> Result<Vec<Self>> {
        let mut zooms = Vec::with_capacity(header.zoom_levels as usize);
        let mut buffer = [0u8; SIZE_ZOOM_HEADER];
        for level in 0..u64::from(header.zoom_levels) {
            let offset = SIZE_HEADER as u64 + level * SIZE_ZOOM_HEADER as u64;
            read_exact_at(src, 0, offset, file_len, &mut buffer)?;
            zooms.push(Self::from_bytes(&buffer, header.endianness));
        }
        Ok(zooms)
    }
}

/// Summary statistics over every covered base of a file
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Summary {
    pub bases_covered: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub sum_squares: f64,
}
impl Summary {
    #[must_use]
    pub fn from_bytes(buffer: &[u8; SIZE_SUMMARY], e: Endianness) -> Self {
        Self {
            bases_covered: e.read_u64(&buffer[0..8]),
            min: e.read_f64(&buffer[8..16]),
            max: e.read_f64(&buffer[16..24]),
            sum: e.read_f64(&buffer[24..32]),
            sum_squares: e.read_f64(&buffer[32..40]),
        }
    }

    /// Reads the summary if the header points at one
    pub(crate) fn read_optional<R: Read + Seek>(
        src: &mut R,
        header: &BbiHeader,
        file_len: u64,
    ) -> Result<Option<Self>> {
        if header.total_summary_offset == 0 {
            return Ok(None);
        }
        let mut buffer = [0u8; SIZE_SUMMARY];
        read_exact_at(src, 0, header.total_summary_offset, file_len, &mut buffer)?;
        Ok(Some(Self::from_bytes(&buffer, header.endianness)))
    }

    /// Mean value per covered base
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.bases_covered == 0 {
            return 0.0;
        }
        self.sum / self.bases_covered as f64
    }

    /// Standard deviation per covered base
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        if self.bases_covered < 2 {
            return 0.0;
        }
        let n = self.bases_covered as f64;
        let var = (self.sum_squares - self.sum * self.sum / n) / (n - 1.0);
        var.max(0.0).sqrt()
    }
}
