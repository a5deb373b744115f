use crate::bgzf::VirtualOffset;

/// Custom Result type for trackseek operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the trackseek library, encompassing every failure that can
/// occur while opening, scanning or querying an interval file.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub enum Error {
    /// Errors related to container header processing
    HeaderError(#[from] HeaderError),
    /// Structural inconsistencies in a dictionary or spatial index
    IndexError(#[from] IndexError),
    /// Errors that occur while decoding records
    RecordError(#[from] RecordError),
    /// Errors caused by how a query was issued
    QueryError(#[from] QueryError),
    /// Standard I/O errors from the Rust standard library
    IoError(#[from] std::io::Error),
    /// UTF-8 encoding/decoding errors
    Utf8Error(#[from] std::str::Utf8Error),
    /// Generic errors that can occur in any part of the system
    AnyhowError(#[from] anyhow::Error),
}
impl Error {
    /// Checks if the error is a structural index failure
    #[must_use]
    pub fn is_corrupt_index(&self) -> bool {
        matches!(self, Self::IndexError(_))
    }

    /// Checks if the error is a text grammar violation
    #[must_use]
    pub fn is_malformed_record(&self) -> bool {
        matches!(self, Self::RecordError(RecordError::MalformedRecord { .. }))
    }

    /// Checks if the error is an unknown binary section encoding
    #[must_use]
    pub fn is_unsupported_encoding(&self) -> bool {
        matches!(
            self,
            Self::RecordError(RecordError::UnsupportedEncoding { .. })
        )
    }

    /// Checks if the error is a query issued without an index
    #[must_use]
    pub fn is_index_required(&self) -> bool {
        matches!(self, Self::QueryError(QueryError::IndexRequired))
    }
}

/// Errors specific to processing and validating container headers
#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    /// The magic number in the header does not match the expected value
    ///
    /// # Arguments
    /// * `u32` - The invalid magic number that was found
    #[error("Invalid magic number: {0:#010x}")]
    InvalidMagicNumber(u32),

    /// The format version in the header is not supported
    ///
    /// # Arguments
    /// * `u16` - The unsupported version number that was found
    #[error("Unsupported format version: {0} (minimum is 3)")]
    InvalidFormatVersion(u16),

    /// The source is too short to hold the structure being read
    ///
    /// # Arguments
    /// * First `usize` - The actual number of bytes provided
    /// * Second `usize` - The expected number of bytes
    #[error("Invalid number of bytes provided: {0}. Expected: {1}")]
    InvalidSize(usize, usize),
}

/// Structural errors found in the chromosome dictionary, the spatial index or a
/// sidecar block-offset index.
///
/// Every variant carries the byte offset where the inconsistency was detected.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// A magic number for an index structure did not match
    #[error("Corrupt index at byte {offset}: bad magic {found:#010x}")]
    BadMagic { offset: u64, found: u32 },

    /// A node or block pointer leads outside of the file
    #[error("Corrupt index at byte {offset}: pointer {target} is outside of file ({len} bytes)")]
    OutOfBounds { offset: u64, target: u64, len: u64 },

    /// A node was reached twice during a traversal
    #[error("Corrupt index: node at byte {0} was visited twice")]
    Cycle(u64),

    /// The tree is deeper than any valid file would produce
    #[error("Corrupt index at byte {0}: tree depth exceeds limit")]
    TooDeep(u64),

    /// Any other structural inconsistency
    ///
    /// # Fields
    /// * `offset` - Byte offset of the offending structure
    /// * `reason` - What was inconsistent
    #[error("Corrupt index at byte {offset}: {reason}")]
    Inconsistent { offset: u64, reason: String },
}

/// Errors that can occur while decoding text or binary records
#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    /// A text line matches none of the line grammars
    ///
    /// # Fields
    /// * `line` - 1-based line number
    /// * `column` - 1-based byte column of the offending byte
    /// * `reason` - Which rule was violated
    /// * `offset` - Virtual offset where scanning of the line began, for indexed reads
    ///   whose line numbers count from the start of a chunk
    #[error("Malformed record at line {line}, column {column}{}: {reason}", located(.offset))]
    MalformedRecord {
        line: u64,
        column: u64,
        reason: &'static str,
        offset: Option<VirtualOffset>,
    },

    /// A binary section uses an encoding tag this library does not know
    ///
    /// # Fields
    /// * `encoding` - The unknown tag
    /// * `offset` - File offset of the block holding the section
    #[error("Unsupported section encoding {encoding} in block at byte {offset}")]
    UnsupportedEncoding { encoding: u8, offset: u64 },

    /// A block ended in the middle of a section
    ///
    /// # Fields
    /// * `offset` - File offset of the block holding the section
    /// * `remaining` - Bytes left in the block when the next item was expected
    #[error("Section truncated in block at byte {offset} ({remaining} bytes remaining)")]
    TruncatedSection { offset: u64, remaining: usize },

    /// A decompressed block is larger than the header allows
    #[error("Block at byte {offset} inflates past {limit} bytes")]
    OversizedBlock { offset: u64, limit: usize },
}

fn located(offset: &Option<VirtualOffset>) -> String {
    offset.map(|vo| format!(" (virtual offset {vo})")).unwrap_or_default()
}

/// Errors that stem from how a query or accessor was used
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    /// An overlap query was issued on a reader without a block-offset index
    #[error("An index is required for overlap queries")]
    IndexRequired,

    /// The query names a sequence absent from the dictionary or index
    #[error("Unknown chromosome: {0}")]
    UnknownChromosome(String),

    /// Interval bounds are not 1-based with `first <= last`
    #[error("Invalid interval {first}-{last}: must satisfy 1 <= first <= last")]
    InvalidInterval { first: u64, last: u64 },

    /// A region string could not be parsed
    #[error("Invalid region string: {0}")]
    InvalidRegion(String),

    /// The requested zoom level does not exist
    #[error("Zoom level {0} is out of range ({1} levels)")]
    ZoomLevelOutOfRange(usize, usize),

    /// Trailing payload accessors were used before the record stream was drained
    #[error("Record stream must be drained before the trailing payload can be inspected")]
    NotDrained,
}
