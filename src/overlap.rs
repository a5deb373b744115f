use crate::error::Result;
use crate::interval::Region;

/// Retrieval of every record overlapping a region
///
/// Implemented by [`crate::bigwig::BigWigReader`] over its built-in R-tree and by
/// [`crate::gff::IndexedGffReader`] over a BGZF stream and a sidecar index. The
/// returned iterator is lazy, finite and single pass. It borrows the reader, which
/// shares a single seek position with every iterator built from it.
///
/// # Examples
///
/// ```rust,no_run
/// use trackseek::{OverlapRead, Region};
///
/// fn count<R: OverlapRead>(reader: &mut R, region: &str) -> trackseek::Result<usize> {
///     let region: Region = region.parse()?;
///     let mut n = 0;
///     for record in reader.overlap(&region)? {
///         record?;
///         n += 1;
///     }
///     Ok(n)
/// }
/// ```
pub trait OverlapRead {
    type Record;
    type Iter<'a>: Iterator<Item = Result<Self::Record>>
    where
        Self: 'a;

    /// Lazily yields the records intersecting `region`
    ///
    /// Within each visited block records come in ascending `(chrom, start)` order.
    fn overlap<'a>(&'a mut self, region: &Region) -> Result<Self::Iter<'a>>;
}
