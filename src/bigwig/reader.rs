use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use log::{debug, trace};
use memmap2::Mmap;

use super::chrom::ChromDictionary;
use super::codec::Codec;
use super::header::{BbiHeader, Summary, ZoomHeader};
use super::index::{Block, BlockSearch, Blocks, Bounds, CirTreeHeader};
use super::read_exact_at;
use super::section::{SectionBlock, SectionPolicy, SignalRecord};
use super::zoom::{ZoomBlock, ZoomRecord};
use crate::error::{QueryError, Result};
use crate::interval::{Interval, Region, Strand};
use crate::overlap::OverlapRead;

/// Decoding of one kind of data block
///
/// Implemented by [`SectionBlock`] for full resolution data and by [`ZoomBlock`] for
/// zoom levels. Implementors own their decompression buffer and are reused across
/// blocks.
pub trait BlockDecode {
    type Item;

    /// Replaces the current contents with the decompressed `raw` block
    fn ingest(&mut self, block: &Block, raw: &[u8], codec: Codec, limit: usize) -> Result<()>;

    /// Decodes the next item of the block, `None` once the block is exhausted
    fn next_item(&mut self) -> Option<Result<Self::Item>>;

    /// `(chrom_id, start, end)` of an item, 0-based half-open
    fn locus(item: &Self::Item) -> (u32, u32, u32);

    /// Drops the remaining contents of the block
    fn clear(&mut self);
}

/// Shared read-only view of a memory-mapped file
#[derive(Debug, Clone)]
pub struct MmapSource(Arc<Mmap>);
impl AsRef<[u8]> for MmapSource {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

/// Builder for [`BigWigReader`]
///
/// # Examples
///
/// ```rust,no_run
/// use trackseek::bigwig::{BigWigReaderBuilder, Codec, SectionPolicy};
///
/// let file = std::fs::File::open("signal.bw").unwrap();
/// let reader = BigWigReaderBuilder::default()
///     .codec(Codec::Zstd)
///     .policy(SectionPolicy::SkipBlock)
///     .build(file)
///     .unwrap();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BigWigReaderBuilder {
    codec: Option<Codec>,
    policy: SectionPolicy,
}
impl BigWigReaderBuilder {
    /// Overrides the block codec announced by the header
    #[must_use]
    pub fn codec(mut self, codec: Codec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Sets how undecodable sections are handled
    #[must_use]
    pub fn policy(mut self, policy: SectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Opens a container over any seekable source
    ///
    /// Reads the header, zoom headers, total summary, chromosome dictionary and the
    /// header of the full resolution index. Data blocks are only read by queries.
    ///
    /// # Errors
    ///
    /// * `HeaderError` if the magic number or version is invalid
    /// * `IndexError` if the dictionary or index header is corrupt
    /// * I/O errors from the source
    pub fn build<R: Read + Seek>(self, mut src: R) -> Result<BigWigReader<R>> {
        let file_len = src.seek(SeekFrom::End(0))?;
        src.seek(SeekFrom::Start(0))?;

        let header = BbiHeader::from_reader(&mut src)?;
        let e = header.endianness;
        let zooms = ZoomHeader::read_all(&mut src, &header, file_len)?;
        let summary = Summary::read_optional(&mut src, &header, file_len)?;
        let chroms = ChromDictionary::read(&mut src, header.chrom_tree_offset, e, file_len)?;
        let index = CirTreeHeader::read(&mut src, header.full_index_offset, e, file_len)?;
        let codec = self.codec.unwrap_or_else(|| Codec::for_header(&header));

        debug!(
            "opened bigWig v{} ({:?} endian, {} chromosomes, {} blocks, {} zoom levels, {codec:?})",
            header.version,
            e,
            chroms.len(),
            index.item_count,
            zooms.len()
        );

        Ok(BigWigReader {
            src,
            header,
            zooms,
            summary,
            chroms: Arc::new(chroms),
            index: Arc::new(index),
            file_len,
            codec,
            policy: self.policy,
        })
    }

    /// Opens a file through a buffered reader
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<BigWigReader<BufReader<File>>> {
        self.build(BufReader::new(File::open(path)?))
    }

    /// Opens a file by memory-mapping it
    ///
    /// # Errors
    ///
    /// * I/O errors if the path is not a regular file or cannot be mapped
    pub fn open_mmap<P: AsRef<Path>>(self, path: P) -> Result<BigWigReader<Cursor<MmapSource>>> {
        let file = File::open(&path)?;
        if !file.metadata()?.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            )
            .into());
        }

        // Safety: the file is opened read-only and is not modified while mapped
        let mmap = unsafe { Mmap::map(&file)? };
        self.build(Cursor::new(MmapSource(Arc::new(mmap))))
    }
}

/// Reader for bigWig containers
///
/// Holds the parsed header, the chromosome dictionary and the index header. The
/// dictionary and index are shared behind `Arc`s by every iterator built from the
/// reader and by forks of it.
///
/// Iterators borrow the reader mutably since they share its single seek position.
/// For concurrent queries, [`BigWigReader::fork`] a reader over a cloneable source
/// such as [`MmapSource`].
#[derive(Debug)]
pub struct BigWigReader<R> {
    src: R,
    header: BbiHeader,
    zooms: Vec<ZoomHeader>,
    summary: Option<Summary>,
    chroms: Arc<ChromDictionary>,
    index: Arc<CirTreeHeader>,
    file_len: u64,
    codec: Codec,
    policy: SectionPolicy,
}
impl<R: Read + Seek> BigWigReader<R> {
    /// Opens a container with default options
    pub fn new(src: R) -> Result<Self> {
        BigWigReaderBuilder::default().build(src)
    }

    #[must_use]
    pub fn header(&self) -> BbiHeader {
        self.header
    }

    #[must_use]
    pub fn zoom_headers(&self) -> &[ZoomHeader] {
        &self.zooms
    }

    /// Summary over every covered base, if the file carries one
    #[must_use]
    pub fn total_summary(&self) -> Option<Summary> {
        self.summary
    }

    #[must_use]
    pub fn chroms(&self) -> &ChromDictionary {
        &self.chroms
    }

    /// Header of the full resolution index
    #[must_use]
    pub fn index(&self) -> &CirTreeHeader {
        &self.index
    }

    #[must_use]
    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn into_inner(self) -> R {
        self.src
    }

    /// Lazily lists the data blocks that may hold records in `[start, end)`
    pub fn blocks(&mut self, chrom_id: u32, start: u32, end: u32) -> Blocks<'_, R> {
        let search = BlockSearch::new(
            Arc::clone(&self.index),
            Bounds::on_chrom(chrom_id, start, end),
        );
        Blocks::new(&mut self.src, search)
    }

    /// Every record of the file, in index order
    ///
    /// For files written sorted this is chromosome id order, then position.
    pub fn records(&mut self) -> Values<'_, R> {
        let search = BlockSearch::new(Arc::clone(&self.index), Bounds::everything());
        let decoder = SectionBlock::new(self.header.endianness);
        self.values(search, decoder, None)
    }

    /// Records of one chromosome intersecting the 0-based half-open `[start, end)`
    pub fn query(&mut self, chrom_id: u32, start: u32, end: u32) -> Values<'_, R> {
        let search = BlockSearch::new(
            Arc::clone(&self.index),
            Bounds::on_chrom(chrom_id, start, end),
        );
        let decoder = SectionBlock::new(self.header.endianness);
        self.values(search, decoder, Some((chrom_id, start, end)))
    }

    /// Records intersecting a 1-based inclusive region
    ///
    /// # Errors
    ///
    /// * `QueryError::UnknownChromosome` if the region names a sequence absent from
    ///   the dictionary
    pub fn query_region(&mut self, region: &Region) -> Result<Values<'_, R>> {
        let (chrom_id, start, end) = self.resolve(region)?;
        Ok(self.query(chrom_id, start, end))
    }

    /// Zoom records of a reduction level intersecting a region
    ///
    /// # Parameters
    ///
    /// * `level` - Position of the level in [`BigWigReader::zoom_headers`]
    /// * `region` - 1-based inclusive query region
    ///
    /// # Errors
    ///
    /// * `QueryError::ZoomLevelOutOfRange` if the level does not exist
    /// * `QueryError::UnknownChromosome` if the chromosome is not in the dictionary
    /// * `IndexError` if the zoom index header is corrupt
    pub fn zoom_records(
        &mut self,
        level: usize,
        region: &Region,
    ) -> Result<Values<'_, R, ZoomBlock>> {
        let Some(zoom) = self.zooms.get(level).copied() else {
            return Err(QueryError::ZoomLevelOutOfRange(level, self.zooms.len()).into());
        };
        let (chrom_id, start, end) = self.resolve(region)?;
        let tree = CirTreeHeader::read(
            &mut self.src,
            zoom.index_offset,
            self.header.endianness,
            self.file_len,
        )?;
        trace!(
            "zoom level {level} (reduction {}) with {} blocks",
            zoom.reduction_level,
            tree.item_count
        );
        let search = BlockSearch::new(Arc::new(tree), Bounds::on_chrom(chrom_id, start, end));
        let decoder = ZoomBlock::new(self.header.endianness);
        Ok(self.values(search, decoder, Some((chrom_id, start, end))))
    }

    /// Projects a record onto a named 1-based interval carrying its value
    ///
    /// # Errors
    ///
    /// * `QueryError::UnknownChromosome` if the record's id is not in the dictionary
    /// * `QueryError::InvalidInterval` for zero-length records
    pub fn to_interval(&self, record: &SignalRecord) -> Result<Interval<f32>> {
        let Some((name, _)) = self.chroms.lookup_by_id(record.chrom_id) else {
            return Err(QueryError::UnknownChromosome(record.chrom_id.to_string()).into());
        };
        Interval::new(
            name,
            u64::from(record.start) + 1,
            u64::from(record.end),
            Strand::Both,
            record.value,
        )
    }

    /// Maps a region to a dictionary id and 0-based half-open bounds
    fn resolve(&self, region: &Region) -> Result<(u32, u32, u32)> {
        let Some((chrom_id, _)) = self.chroms.lookup_by_name(region.seqname()) else {
            return Err(QueryError::UnknownChromosome(region.seqname().to_string()).into());
        };
        let (start, end) = region.zero_based();
        let clamp = |v: u64| u32::try_from(v).unwrap_or(u32::MAX);
        Ok((chrom_id, clamp(start), clamp(end)))
    }

    fn values<D: BlockDecode>(
        &mut self,
        search: BlockSearch,
        decoder: D,
        filter: Option<(u32, u32, u32)>,
    ) -> Values<'_, R, D> {
        Values {
            src: &mut self.src,
            search,
            decoder,
            current: None,
            rbuf: Vec::new(),
            codec: self.codec,
            limit: self.header.uncompress_buf_size as usize,
            policy: self.policy,
            file_len: self.file_len,
            filter,
            done: false,
        }
    }
}
impl<R: Read + Seek + Clone> BigWigReader<R> {
    /// A second reader over a clone of the source
    ///
    /// The dictionary and index are shared with this reader, not re-read.
    #[must_use]
    pub fn fork(&self) -> Self {
        Self {
            src: self.src.clone(),
            header: self.header,
            zooms: self.zooms.clone(),
            summary: self.summary,
            chroms: Arc::clone(&self.chroms),
            index: Arc::clone(&self.index),
            file_len: self.file_len,
            codec: self.codec,
            policy: self.policy,
        }
    }
}
impl BigWigReader<Cursor<MmapSource>> {
    /// Memory-maps a file and opens it with default options
    pub fn open_mmap<P: AsRef<Path>>(path: P) -> Result<Self> {
        BigWigReaderBuilder::default().open_mmap(path)
    }
}

impl<R: Read + Seek> OverlapRead for BigWigReader<R> {
    type Record = SignalRecord;
    type Iter<'a>
        = Values<'a, R>
    where
        Self: 'a;

    fn overlap<'a>(&'a mut self, region: &Region) -> Result<Self::Iter<'a>> {
        self.query_region(region)
    }
}

/// Lazy iterator over the decoded items of the blocks found by an index search
///
/// Yields `Err` at most once: after an error the iterator is exhausted. Items
/// already yielded stay valid.
pub struct Values<'a, R, D = SectionBlock> {
    src: &'a mut R,
    search: BlockSearch,
    decoder: D,
    /// Block loaded into the decoder
    current: Option<Block>,
    /// Reusable buffer for compressed block bytes
    rbuf: Vec<u8>,
    codec: Codec,
    limit: usize,
    policy: SectionPolicy,
    file_len: u64,
    /// `(chrom_id, start, end)`, none for full scans
    filter: Option<(u32, u32, u32)>,
    done: bool,
}
impl<R: Read + Seek, D: BlockDecode> Values<'_, R, D> {
    fn keeps(&self, item: &D::Item) -> bool {
        let Some((chrom_id, start, end)) = self.filter else {
            return true;
        };
        let (item_chrom, item_start, item_end) = D::locus(item);
        item_chrom == chrom_id
            && item_start < end
            && start < item_end.max(item_start.saturating_add(1))
    }

    fn load(&mut self, block: &Block) -> Result<()> {
        trace!("loading block at byte {} ({} bytes)", block.offset, block.size);
        self.rbuf.resize(block.size as usize, 0);
        read_exact_at(
            &mut *self.src,
            block.offset,
            block.offset,
            self.file_len,
            &mut self.rbuf,
        )?;
        self.decoder.ingest(block, &self.rbuf, self.codec, self.limit)
    }

    fn fail(&mut self, err: crate::Error) -> Option<Result<D::Item>> {
        self.done = true;
        self.decoder.clear();
        Some(Err(err))
    }
}
impl<R: Read + Seek, D: BlockDecode> Iterator for Values<'_, R, D> {
    type Item = Result<D::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if self.current.is_some() {
                match self.decoder.next_item() {
                    Some(Ok(item)) => {
                        if self.keeps(&item) {
                            return Some(Ok(item));
                        }
                        continue;
                    }
                    Some(Err(err)) => {
                        let skip = self
                            .current
                            .as_ref()
                            .is_some_and(|block| self.policy.skips(&err, block));
                        if !skip {
                            return self.fail(err);
                        }
                        self.decoder.clear();
                    }
                    None => {}
                }
                self.current = None;
            }

            match self.search.next_block(&mut *self.src) {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(err)) => return self.fail(err),
                Some(Ok(block)) => {
                    if let Err(err) = self.load(&block) {
                        return self.fail(err);
                    }
                    self.current = Some(block);
                }
            }
        }
    }
}
