//! # BGZF block-compressed streams
//!
//! BGZF is a run of independent gzip members, each at most 64 KiB, whose gzip
//! header carries a `BC` extra subfield with the compressed member size. Since every
//! member can be inflated on its own, a position in the uncompressed stream is
//! addressed by a [`VirtualOffset`]:
//!
//! ```text
//!  63                                16 15             0
//! +------------------------------------+----------------+
//! | compressed offset of the member    | offset inside  |
//! |                                    | inflated data  |
//! +------------------------------------+----------------+
//! ```

use std::fmt;
use std::io::{self, BufRead, Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};
use flate2::read::GzDecoder;
use log::trace;

/// Size of a BGZF member header up to and including the `BC` subfield
pub const SIZE_BLOCK_HEADER: usize = 18;

/// Largest BGZF member
pub const MAX_BLOCK_SIZE: usize = 1 << 16;

const GZIP_ID1: u8 = 31;
const GZIP_ID2: u8 = 139;
const FLG_FEXTRA: u8 = 0x04;

/// Position in a BGZF stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtualOffset(u64);
impl VirtualOffset {
    #[must_use]
    pub fn new(compressed: u64, uncompressed: u16) -> Self {
        Self((compressed << 16) | u64::from(uncompressed))
    }

    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Offset of the member in the compressed file
    #[must_use]
    pub fn compressed(self) -> u64 {
        self.0 >> 16
    }

    /// Offset inside the inflated member
    #[must_use]
    pub fn uncompressed(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}
impl From<u64> for VirtualOffset {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.compressed(), self.uncompressed())
    }
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Reader over a BGZF stream
///
/// Inflates one member at a time into a reusable buffer and serves it through
/// [`BufRead`]. Over seekable sources [`BgzfReader::seek_virtual`] jumps to any
/// virtual offset. The source must be positioned at the first member when the
/// reader is created.
pub struct BgzfReader<R> {
    inner: R,
    /// Compressed offset of the member held in `ubuf`
    block_offset: u64,
    /// Compressed offset of the member after it
    next_block_offset: u64,
    /// Compressed bytes of the current member
    cbuf: Vec<u8>,
    /// Inflated bytes of the current member
    ubuf: Vec<u8>,
    /// Read position in `ubuf`
    pos: usize,
    eof: bool,
}
impl<R: Read> BgzfReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            block_offset: 0,
            next_block_offset: 0,
            cbuf: Vec::with_capacity(MAX_BLOCK_SIZE),
            ubuf: Vec::with_capacity(MAX_BLOCK_SIZE),
            pos: 0,
            eof: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Virtual offset of the next byte to be read
    ///
    /// Once a member is fully consumed this is the start of the following member.
    #[must_use]
    pub fn virtual_position(&self) -> VirtualOffset {
        if self.pos >= self.ubuf.len() {
            VirtualOffset::new(self.next_block_offset, 0)
        } else {
            VirtualOffset::new(self.block_offset, self.pos as u16)
        }
    }

    /// Reads and inflates the next member, returning false at end of stream
    fn read_block(&mut self) -> io::Result<bool> {
        self.ubuf.clear();
        self.pos = 0;
        self.cbuf.resize(SIZE_BLOCK_HEADER, 0);

        let mut filled = 0;
        while filled < SIZE_BLOCK_HEADER {
            match self.inner.read(&mut self.cbuf[filled..SIZE_BLOCK_HEADER])? {
                0 if filled == 0 => {
                    self.eof = true;
                    return Ok(false);
                }
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("truncated BGZF header at byte {}", self.next_block_offset),
                    ))
                }
                n => filled += n,
            }
        }

        let header = &self.cbuf[..SIZE_BLOCK_HEADER];
        if header[0] != GZIP_ID1 || header[1] != GZIP_ID2 {
            return Err(invalid(format!(
                "invalid gzip magic at byte {}: [{}, {}]",
                self.next_block_offset, header[0], header[1]
            )));
        }
        if header[3] & FLG_FEXTRA == 0 {
            return Err(invalid(format!(
                "gzip member at byte {} is not BGZF (no extra field)",
                self.next_block_offset
            )));
        }
        let xlen = LittleEndian::read_u16(&header[10..12]) as usize;
        if xlen < 6 {
            return Err(invalid(format!(
                "BGZF extra field too short at byte {}",
                self.next_block_offset
            )));
        }

        // the first subfield is read with the fixed header, fetch the others
        self.cbuf.resize(12 + xlen, 0);
        self.inner.read_exact(&mut self.cbuf[SIZE_BLOCK_HEADER..])?;

        let mut bsize = None;
        let mut sub = 12;
        while sub + 4 <= 12 + xlen {
            let slen = LittleEndian::read_u16(&self.cbuf[sub + 2..sub + 4]) as usize;
            if self.cbuf[sub] == b'B' && self.cbuf[sub + 1] == b'C' && slen == 2 {
                if sub + 6 > 12 + xlen {
                    break;
                }
                let field = LittleEndian::read_u16(&self.cbuf[sub + 4..sub + 6]);
                bsize = Some(field as usize + 1);
                break;
            }
            sub += 4 + slen;
        }
        let Some(block_size) = bsize else {
            return Err(invalid(format!(
                "gzip member at byte {} has no BC subfield",
                self.next_block_offset
            )));
        };
        if block_size < 12 + xlen + 8 {
            return Err(invalid(format!(
                "BGZF member at byte {} is too small ({block_size} bytes)",
                self.next_block_offset
            )));
        }

        let head = self.cbuf.len();
        self.cbuf.resize(block_size, 0);
        self.inner.read_exact(&mut self.cbuf[head..])?;

        GzDecoder::new(self.cbuf.as_slice()).read_to_end(&mut self.ubuf)?;
        trace!(
            "inflated BGZF member at byte {} ({block_size} -> {} bytes)",
            self.next_block_offset,
            self.ubuf.len()
        );

        self.block_offset = self.next_block_offset;
        self.next_block_offset += block_size as u64;
        Ok(true)
    }
}
impl<R: Read + Seek> BgzfReader<R> {
    /// Moves to a virtual offset
    ///
    /// # Errors
    ///
    /// * `InvalidInput` if the offset points past the end of its member
    /// * Any error from seeking the source or inflating the member
    pub fn seek_virtual(&mut self, offset: VirtualOffset) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset.compressed()))?;
        self.next_block_offset = offset.compressed();
        self.eof = false;
        if !self.read_block()? {
            self.block_offset = offset.compressed();
            if offset.uncompressed() == 0 {
                return Ok(());
            }
        }
        let within = offset.uncompressed() as usize;
        if within > self.ubuf.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("virtual offset {offset} is past the end of its block"),
            ));
        }
        self.pos = within;
        Ok(())
    }
}
impl<R: Read> Read for BgzfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}
impl<R: Read> BufRead for BgzfReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.pos >= self.ubuf.len() && !self.eof {
            if !self.read_block()? {
                break;
            }
        }
        Ok(&self.ubuf[self.pos.min(self.ubuf.len())..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.ubuf.len());
    }
}
