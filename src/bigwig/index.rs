//! # R-tree spatial index
//!
//! Data blocks are indexed by a chromosome-aware R-tree (the "CIR tree"). Every node
//! item carries a bounding range over the composite `(chrom_id, base)` order, so a
//! range can start on one chromosome and end on another.
//!
//! ```text
//! +--------------+
//! | Tree Header  |  48 bytes: magic, block size, item count, overall bounds
//! +--------------+
//! | Root Node    |  4-byte node header + items
//! +--------------+
//! |   ...        |
//! ```
//!
//! Leaf items (32 bytes) point at a data block; branch items (24 bytes) point at a
//! child node. A query descends depth first and only enters items whose bounds
//! intersect the query, so only the blocks that may hold matching records are read.
//! Blocks are produced lazily, one node read at a time.

use std::collections::{HashSet, VecDeque};
use std::io::{Read, Seek};
use std::sync::Arc;

use log::trace;

use super::{read_exact_at, Endianness};
use crate::error::{IndexError, Result};

/// Magic number of the R-tree header
pub const CIR_TREE_MAGIC: u32 = 0x2468_ACE0;

/// Size of the R-tree header in bytes
pub const SIZE_CIR_HEADER: usize = 48;

/// Size of a leaf item in bytes
pub const SIZE_LEAF_ITEM: usize = 32;

/// Size of a branch item in bytes
pub const SIZE_BRANCH_ITEM: usize = 24;

/// Size of a node header in bytes
pub const SIZE_NODE_HEADER: usize = 4;

/// Deepest tree accepted before the index is considered corrupt
const MAX_DEPTH: usize = 64;

/// A closed range over the composite `(chrom_id, base)` order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bounds {
    pub start_chrom: u32,
    pub start_base: u32,
    pub end_chrom: u32,
    pub end_base: u32,
}
impl Bounds {
    #[must_use]
    pub fn new(start_chrom: u32, start_base: u32, end_chrom: u32, end_base: u32) -> Self {
        Self {
            start_chrom,
            start_base,
            end_chrom,
            end_base,
        }
    }

    /// Range covering a single chromosome span
    #[must_use]
    pub fn on_chrom(chrom_id: u32, start: u32, end: u32) -> Self {
        Self::new(chrom_id, start, chrom_id, end)
    }

    /// Range covering every position of every chromosome
    #[must_use]
    pub fn everything() -> Self {
        Self::new(0, 0, u32::MAX, u32::MAX)
    }

    /// Checks whether two ranges intersect
    ///
    /// `[a, b]` and `[c, d]` intersect iff `a <= d` and `c <= b`, comparing chromosome
    /// first and base second.
    #[must_use]
    pub fn overlaps(&self, other: &Bounds) -> bool {
        (self.start_chrom, self.start_base) <= (other.end_chrom, other.end_base)
            && (other.start_chrom, other.start_base) <= (self.end_chrom, self.end_base)
    }

    fn from_bytes(buf: &[u8], e: Endianness) -> Self {
        Self::new(
            e.read_u32(&buf[0..4]),
            e.read_u32(&buf[4..8]),
            e.read_u32(&buf[8..12]),
            e.read_u32(&buf[12..16]),
        )
    }
}

/// A compressed data block referenced by a leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
    /// Absolute file offset of the block
    pub offset: u64,
    /// Size of the block on disk
    pub size: u64,
    /// Bounds of the records stored in the block
    pub bounds: Bounds,
}

/// Header of an R-tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CirTreeHeader {
    /// Offset of the tree header itself
    pub offset: u64,
    pub block_size: u32,
    /// Number of leaf items in the tree
    pub item_count: u64,
    /// Bounds of everything indexed
    pub bounds: Bounds,
    pub end_file_offset: u64,
    pub items_per_slot: u32,
    pub endianness: Endianness,
    /// Size of the file holding the tree, used to bounds-check every pointer
    pub file_len: u64,
}
impl CirTreeHeader {
    /// Reads the tree header stored at `offset`
    ///
    /// # Errors
    ///
    /// * `IndexError::BadMagic` if the magic number does not match
    /// * `IndexError::OutOfBounds` if the header lies outside of the file
    pub fn read<R: Read + Seek>(
        src: &mut R,
        offset: u64,
        endianness: Endianness,
        file_len: u64,
    ) -> Result<Self> {
        let mut buffer = [0u8; SIZE_CIR_HEADER];
        read_exact_at(src, offset, offset, file_len, &mut buffer)?;
        let e = endianness;
        let magic = e.read_u32(&buffer[0..4]);
        if magic != CIR_TREE_MAGIC {
            return Err(IndexError::BadMagic {
                offset,
                found: magic,
            }
            .into());
        }
        Ok(Self {
            offset,
            block_size: e.read_u32(&buffer[4..8]),
            item_count: e.read_u64(&buffer[8..16]),
            bounds: Bounds::from_bytes(&buffer[16..32], e),
            end_file_offset: e.read_u64(&buffer[32..40]),
            items_per_slot: e.read_u32(&buffer[40..44]),
            endianness,
            file_len,
        })
    }

    /// Offset of the root node
    #[must_use]
    pub fn root_offset(&self) -> u64 {
        self.offset + SIZE_CIR_HEADER as u64
    }
}

/// Lazy depth-first traversal state of one query
///
/// The search owns no reader: each call to [`BlockSearch::next_block`] borrows the
/// source, seeks to absolute offsets and leaves it re-seekable. Dropping a search
/// part way through is always safe.
#[derive(Debug)]
pub struct BlockSearch {
    tree: Arc<CirTreeHeader>,
    query: Bounds,
    /// Nodes still to visit, with their depth; the next node is on top
    stack: Vec<(u64, usize)>,
    /// Matching leaves of the node visited last, in on-disk order
    pending: VecDeque<Block>,
    visited: HashSet<u64>,
    /// Reusable node buffer
    nbuf: Vec<u8>,
}
impl BlockSearch {
    #[must_use]
    pub fn new(tree: Arc<CirTreeHeader>, query: Bounds) -> Self {
        let stack = if tree.item_count > 0 && tree.bounds.overlaps(&query) {
            vec![(tree.root_offset(), 0)]
        } else {
            Vec::new()
        };
        Self {
            tree,
            query,
            stack,
            pending: VecDeque::new(),
            visited: HashSet::new(),
            nbuf: Vec::new(),
        }
    }

    /// The range being searched
    #[must_use]
    pub fn query(&self) -> Bounds {
        self.query
    }

    /// Produces the next block whose bounds intersect the query
    ///
    /// Returns `None` once the tree is exhausted. An error ends the traversal: every
    /// following call returns `None`.
    pub fn next_block<R: Read + Seek>(&mut self, src: &mut R) -> Option<Result<Block>> {
        loop {
            if let Some(block) = self.pending.pop_front() {
                return Some(Ok(block));
            }
            let (offset, depth) = self.stack.pop()?;
            if let Err(err) = self.visit(src, offset, depth) {
                self.stack.clear();
                self.pending.clear();
                return Some(Err(err));
            }
        }
    }

    fn visit<R: Read + Seek>(&mut self, src: &mut R, offset: u64, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(IndexError::TooDeep(offset).into());
        }
        if !self.visited.insert(offset) {
            return Err(IndexError::Cycle(offset).into());
        }
        let e = self.tree.endianness;
        let file_len = self.tree.file_len;

        let mut node = [0u8; SIZE_NODE_HEADER];
        read_exact_at(src, offset, offset, file_len, &mut node)?;
        let is_leaf = match node[0] {
            0 => false,
            1 => true,
            flag => {
                return Err(IndexError::Inconsistent {
                    offset,
                    reason: format!("node flag {flag} is neither leaf nor branch"),
                }
                .into())
            }
        };
        let count = e.read_u16(&node[2..4]) as usize;
        let item_size = if is_leaf {
            SIZE_LEAF_ITEM
        } else {
            SIZE_BRANCH_ITEM
        };
        self.nbuf.resize(count * item_size, 0);
        read_exact_at(
            src,
            offset,
            offset + SIZE_NODE_HEADER as u64,
            file_len,
            &mut self.nbuf,
        )?;
        trace!(
            "visiting {} node at byte {offset} with {count} items",
            if is_leaf { "leaf" } else { "branch" }
        );

        if is_leaf {
            for item in self.nbuf.chunks_exact(SIZE_LEAF_ITEM) {
                let bounds = Bounds::from_bytes(&item[0..16], e);
                if !bounds.overlaps(&self.query) {
                    continue;
                }
                let block = Block {
                    offset: e.read_u64(&item[16..24]),
                    size: e.read_u64(&item[24..32]),
                    bounds,
                };
                if block.offset.checked_add(block.size).is_none_or(|end| end > file_len) {
                    return Err(IndexError::OutOfBounds {
                        offset,
                        target: block.offset,
                        len: file_len,
                    }
                    .into());
                }
                self.pending.push_back(block);
            }
        } else {
            let first_child = self.stack.len();
            for item in self.nbuf.chunks_exact(SIZE_BRANCH_ITEM) {
                let bounds = Bounds::from_bytes(&item[0..16], e);
                if !bounds.overlaps(&self.query) {
                    continue;
                }
                let child = e.read_u64(&item[16..24]);
                if child >= file_len {
                    return Err(IndexError::OutOfBounds {
                        offset,
                        target: child,
                        len: file_len,
                    }
                    .into());
                }
                self.stack.push((child, depth + 1));
            }
            // first matching child on top
            self.stack[first_child..].reverse();
        }
        Ok(())
    }
}

/// Iterator over matching blocks, borrowing the source for its lifetime
pub struct Blocks<'a, R> {
    src: &'a mut R,
    search: BlockSearch,
}
impl<'a, R: Read + Seek> Blocks<'a, R> {
    pub fn new(src: &'a mut R, search: BlockSearch) -> Self {
        Self { src, search }
    }
}
impl<R: Read + Seek> Iterator for Blocks<'_, R> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        self.search.next_block(&mut *self.src)
    }
}

#[cfg(test)]
mod testing {
    use std::io::Cursor;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::fixtures::RTreeBuilder;

    fn search_all(bytes: &[u8], query: Bounds) -> anyhow::Result<Vec<Block>> {
        let mut src = Cursor::new(bytes);
        let tree = CirTreeHeader::read(&mut src, 0, Endianness::Little, bytes.len() as u64)?;
        let search = BlockSearch::new(Arc::new(tree), query);
        Ok(Blocks::new(&mut src, search).collect::<Result<Vec<_>>>()?)
    }

    fn leaf(chrom: u32, start: u32, end: u32, offset: u64) -> (Bounds, u64, u64) {
        (Bounds::on_chrom(chrom, start, end), offset, 10)
    }

    #[test]
    fn test_overlap_rule() {
        let a = Bounds::on_chrom(1, 100, 200);
        assert!(a.overlaps(&Bounds::on_chrom(1, 200, 300)));
        assert!(a.overlaps(&Bounds::on_chrom(1, 0, 100)));
        assert!(!a.overlaps(&Bounds::on_chrom(1, 201, 300)));
        assert!(!a.overlaps(&Bounds::on_chrom(2, 100, 200)));
        assert!(!a.overlaps(&Bounds::on_chrom(0, 100, 200)));

        // a range spanning chromosomes covers the tail of the first and head of the last
        let span = Bounds::new(1, 500, 3, 10);
        assert!(span.overlaps(&Bounds::on_chrom(2, 0, 1)));
        assert!(span.overlaps(&Bounds::on_chrom(1, 600, 700)));
        assert!(!span.overlaps(&Bounds::on_chrom(1, 0, 499)));
        assert!(!span.overlaps(&Bounds::on_chrom(3, 11, 20)));
    }

    #[test]
    fn test_only_overlapping_leaf_visited() -> anyhow::Result<()> {
        // chr1 = 0, chr2 = 1
        let leaves = vec![
            leaf(0, 0, 1000, 10),
            leaf(1, 99, 400, 20),
            leaf(1, 549, 700, 30),
        ];
        let bytes = RTreeBuilder::new(leaves).fan_out(2).build(0);
        let blocks = search_all(&bytes, Bounds::on_chrom(1, 499, 600))?;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].offset, 30);
        Ok(())
    }

    #[test]
    fn test_empty_tree() -> anyhow::Result<()> {
        let bytes = RTreeBuilder::new(Vec::new()).build(0);
        assert!(search_all(&bytes, Bounds::everything())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = RTreeBuilder::new(vec![leaf(0, 0, 10, 0)]).build(0);
        bytes[1] ^= 0xFF;
        let err = search_all(&bytes, Bounds::everything()).unwrap_err();
        let err = err.downcast::<crate::Error>().map(|e| e.is_corrupt_index());
        assert!(matches!(err, Ok(true)));
    }

    #[test]
    fn test_rejects_block_past_end_of_file() {
        let bytes = RTreeBuilder::new(vec![leaf(0, 0, 10, 1 << 40)]).build(0);
        let err = search_all(&bytes, Bounds::everything()).unwrap_err();
        let err = err.downcast::<crate::Error>().map(|e| e.is_corrupt_index());
        assert!(matches!(err, Ok(true)));
    }

    #[test]
    fn test_rejects_cycles() -> anyhow::Result<()> {
        let leaves = (0..8).map(|i| leaf(0, i * 10, i * 10 + 9, 0)).collect();
        let mut bytes = RTreeBuilder::new(leaves).fan_out(2).build(0);
        // point the root's second child back at the root
        let root = SIZE_CIR_HEADER;
        let second_child = root + SIZE_NODE_HEADER + SIZE_BRANCH_ITEM + 16;
        bytes[second_child..second_child + 8].copy_from_slice(&(root as u64).to_le_bytes());
        let mut src = Cursor::new(bytes.as_slice());
        let tree = CirTreeHeader::read(&mut src, 0, Endianness::Little, bytes.len() as u64)?;
        let mut search = BlockSearch::new(Arc::new(tree), Bounds::everything());
        let mut saw_error = false;
        while let Some(block) = search.next_block(&mut src) {
            if let Err(err) = block {
                assert!(err.is_corrupt_index());
                saw_error = true;
            }
        }
        assert!(saw_error);
        assert!(search.next_block(&mut src).is_none());
        Ok(())
    }

    #[test]
    fn test_leaves_in_disk_order() -> anyhow::Result<()> {
        let leaves: Vec<_> = (0..3u32)
            .flat_map(|c| (0..40u32).map(move |i| (c, i)))
            .enumerate()
            .map(|(n, (c, i))| leaf(c, i * 100, i * 100 + 150, n as u64))
            .collect();
        for fan_out in [2, 3, 5, 64] {
            let bytes = RTreeBuilder::new(leaves.clone()).fan_out(fan_out).build(0);
            let blocks = search_all(&bytes, Bounds::new(0, 1234, 2, 800))?;
            let keys: Vec<_> = blocks
                .iter()
                .map(|b| (b.bounds.start_chrom, b.bounds.start_base))
                .collect();
            assert!(keys.windows(2).all(|w| w[0] <= w[1]), "fan out {fan_out}");
        }
        Ok(())
    }

    /// Random leaf sets and queries: a leaf is returned iff it intersects the query
    #[test]
    fn test_randomized_search_is_exact() -> anyhow::Result<()> {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut trials = 0;
        while trials < 10_000 {
            let n_chroms = rng.random_range(1..4u32);
            let n_leaves = rng.random_range(0..60usize);
            let mut leaves = Vec::with_capacity(n_leaves);
            for n in 0..n_leaves {
                let chrom = rng.random_range(0..n_chroms);
                let start = rng.random_range(0..5000u32);
                let end = start + rng.random_range(0..300u32);
                leaves.push(leaf(chrom, start, end, n as u64));
            }
            leaves.sort_by_key(|(b, _, _)| (b.start_chrom, b.start_base));
            let fan_out = rng.random_range(2..9usize);
            let bytes = RTreeBuilder::new(leaves.clone()).fan_out(fan_out).build(0);

            for _ in 0..50 {
                let chrom = rng.random_range(0..n_chroms);
                let start = rng.random_range(0..5500u32);
                let end = start + rng.random_range(0..800u32);
                let query = Bounds::on_chrom(chrom, start, end);

                let mut found: Vec<u64> = search_all(&bytes, query)?
                    .iter()
                    .map(|b| b.offset)
                    .collect();
                let mut expected: Vec<u64> = leaves
                    .iter()
                    .filter(|(b, _, _)| b.overlaps(&query))
                    .map(|(_, offset, _)| *offset)
                    .collect();
                found.sort_unstable();
                expected.sort_unstable();
                assert_eq!(found, expected);
                trials += 1;
            }
        }
        Ok(())
    }
}
