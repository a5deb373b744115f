use std::io::Read;

use flate2::read::ZlibDecoder;

use super::BbiHeader;
use crate::error::Result;

/// Compression applied to individual data blocks
///
/// Containers announce compression through `uncompress_buf_size`: zero means raw
/// blocks, anything else means zlib. `Zstd` is only selected explicitly, for files
/// produced by writers that swap the block codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Raw,
    Zlib,
    Zstd,
}
impl Codec {
    /// Codec announced by a container header
    #[must_use]
    pub fn for_header(header: &BbiHeader) -> Self {
        if header.is_compressed() {
            Self::Zlib
        } else {
            Self::Raw
        }
    }

    /// Decompresses a whole block into `dst`
    ///
    /// `dst` is cleared first. When `hint_size` is non-zero it is the largest expected
    /// output: decoding stops one byte past it so callers can detect oversized blocks
    /// without inflating them completely.
    ///
    /// # Returns
    ///
    /// The number of bytes written to `dst`
    pub fn decompress(self, block: &[u8], hint_size: usize, dst: &mut Vec<u8>) -> Result<usize> {
        dst.clear();
        let limit = if hint_size == 0 {
            u64::MAX
        } else {
            hint_size as u64 + 1
        };
        match self {
            Self::Raw => dst.extend_from_slice(block),
            Self::Zlib => {
                dst.reserve(hint_size);
                ZlibDecoder::new(block).take(limit).read_to_end(dst)?;
            }
            Self::Zstd => {
                dst.reserve(hint_size);
                zstd::stream::read::Decoder::with_buffer(block)?
                    .take(limit)
                    .read_to_end(dst)?;
            }
        }
        Ok(dst.len())
    }
}
