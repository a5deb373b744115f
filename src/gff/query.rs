use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use log::debug;

use crate::bgzf::{BgzfReader, VirtualOffset};
use crate::error::{Error, QueryError, RecordError, Result};
use crate::interval::Region;
use crate::overlap::OverlapRead;
use crate::tabix::{BlockOffsetIndex, Chunk, TabixIndex};

use super::reader::{CommentTally, GffReader, LineFilter, LineOutcome, Records};
use super::record::FeatureRecord;

/// GFF3 reader over a BGZF file with an optional sidecar index
///
/// Without an index the file can still be scanned in full with
/// [`IndexedGffReader::records`]; overlap queries need one.
pub struct IndexedGffReader<R, I> {
    reader: GffReader<BgzfReader<R>>,
    index: Option<I>,
}
impl<R: Read + Seek, I: BlockOffsetIndex> IndexedGffReader<R, I> {
    /// Creates a reader over a BGZF source positioned at its first member
    pub fn new(inner: R, index: Option<I>) -> Self {
        Self {
            reader: GffReader::new(BgzfReader::new(inner)),
            index,
        }
    }

    pub fn index(&self) -> Option<&I> {
        self.index.as_ref()
    }

    /// Line counts since the last full scan or query started
    #[must_use]
    pub fn tally(&self) -> CommentTally {
        self.reader.tally()
    }

    /// Every record of the file, from the beginning
    ///
    /// Line numbers in the returned records count from the start of the file, and
    /// the comment tally restarts.
    pub fn records(&mut self) -> Result<Records<'_, BgzfReader<R>>> {
        self.reader
            .get_mut()
            .seek_virtual(VirtualOffset::default())?;
        self.reader.reset();
        Ok(self.reader.records())
    }

    /// Lazily yields the features overlapping `region`
    ///
    /// Line numbers in the returned records count from the start of their chunk. A
    /// malformed line is reported with the virtual offset where its scan began.
    ///
    /// # Errors
    ///
    /// * `QueryError::IndexRequired` if the reader was built without an index
    /// * `QueryError::UnknownChromosome` if the index does not know the sequence
    pub fn query(&mut self, region: &Region) -> Result<Overlaps<'_, R>> {
        let Some(index) = &self.index else {
            return Err(QueryError::IndexRequired.into());
        };
        let chunks = index.find_overlaps(region.seqname(), region.first() - 1, region.last())?;
        debug!("{region}: scanning {} chunks", chunks.len());
        Ok(Overlaps {
            reader: &mut self.reader,
            chunks: chunks.into(),
            chunk_end: None,
            filter: LineFilter {
                seqname: region.seqname().to_string(),
                first: region.first(),
                last: region.last(),
            },
            record: FeatureRecord::new(),
            done: false,
        })
    }
}
impl IndexedGffReader<File, TabixIndex> {
    /// Opens a BGZF file and, when given, its tabix index
    pub fn from_paths<P: AsRef<Path>, Q: AsRef<Path>>(
        path: P,
        index: Option<Q>,
    ) -> Result<Self> {
        let index = index.map(TabixIndex::from_path).transpose()?;
        if index.is_none() {
            debug!("opening {} without an index", path.as_ref().display());
        }
        Ok(Self::new(File::open(path)?, index))
    }
}
impl<R: Read + Seek, I: BlockOffsetIndex> OverlapRead for IndexedGffReader<R, I> {
    type Record = FeatureRecord;
    type Iter<'a>
        = Overlaps<'a, R>
    where
        Self: 'a;

    fn overlap<'a>(&'a mut self, region: &Region) -> Result<Self::Iter<'a>> {
        self.query(region)
    }
}

/// Iterator over the features overlapping a region
///
/// Visits the index chunks in order, dropping lines of other sequences and lines
/// outside the region before their last columns are decoded. Fused after the
/// first error.
pub struct Overlaps<'a, R> {
    reader: &'a mut GffReader<BgzfReader<R>>,
    chunks: VecDeque<Chunk>,
    /// End of the chunk being scanned
    chunk_end: Option<VirtualOffset>,
    filter: LineFilter,
    record: FeatureRecord,
    done: bool,
}
impl<R: Read + Seek> Overlaps<'_, R> {
    fn enter(&mut self, chunk: Chunk) -> Result<()> {
        self.reader.get_mut().seek_virtual(chunk.start)?;
        self.reader.reset();
        self.chunk_end = Some(chunk.end);
        Ok(())
    }

    fn fail(&mut self, err: Error) -> Option<Result<FeatureRecord>> {
        self.done = true;
        Some(Err(err))
    }
}

/// Attaches the virtual offset of the line to a grammar error
fn locate(err: Error, at: VirtualOffset) -> Error {
    match err {
        Error::RecordError(RecordError::MalformedRecord {
            line,
            column,
            reason,
            offset: None,
        }) => RecordError::MalformedRecord {
            line,
            column,
            reason,
            offset: Some(at),
        }
        .into(),
        err => err,
    }
}
impl<R: Read + Seek> Iterator for Overlaps<'_, R> {
    type Item = Result<FeatureRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let Some(end) = self.chunk_end else {
                match self.chunks.pop_front() {
                    Some(chunk) => {
                        if let Err(e) = self.enter(chunk) {
                            return self.fail(e);
                        }
                    }
                    None => self.done = true,
                }
                continue;
            };
            let at = self.reader.get_ref().virtual_position();
            if at >= end {
                self.chunk_end = None;
                continue;
            }
            match self.reader.read_line(&mut self.record, Some(&self.filter)) {
                Ok(LineOutcome::Record) if self.record.is_feature() => {
                    return Some(Ok(self.record.clone()))
                }
                Ok(LineOutcome::Record | LineOutcome::Rejected { past_end: false }) => {}
                Ok(LineOutcome::Rejected { past_end: true } | LineOutcome::End(_)) => {
                    self.chunk_end = None;
                }
                Err(e) => return self.fail(locate(e, at)),
            }
        }
        None
    }
}
