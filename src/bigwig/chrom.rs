//! # Chromosome dictionary
//!
//! Names are stored in a B+ tree whose leaves map a NUL-padded key to a
//! `(chrom_id, length)` pair. The whole tree is read once when a container is opened
//! and kept as two lookup tables.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek};

use log::debug;

use super::{read_exact_at, Endianness};
use crate::error::{IndexError, Result};

/// Magic number of the chromosome B+ tree
pub const CHROM_TREE_MAGIC: u32 = 0x78CA_8C91;

/// Size of the B+ tree header in bytes
pub const SIZE_CHROM_TREE_HEADER: usize = 32;

/// Size of a node header in bytes (`is_leaf`, reserved, `count`)
pub const SIZE_NODE_HEADER: usize = 4;

/// Deepest tree accepted before the file is considered corrupt
const MAX_DEPTH: usize = 64;

/// One sequence of the dictionary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromEntry {
    pub name: String,
    pub id: u32,
    pub length: u64,
}

/// Name <-> ID <-> length mapping of a container
///
/// Immutable once read. Name comparison is byte-exact.
#[derive(Debug, Clone, Default)]
pub struct ChromDictionary {
    /// Entries sorted by name
    entries: Vec<ChromEntry>,
    /// Position in `entries` for each id
    by_id: HashMap<u32, usize>,
}
impl ChromDictionary {
    /// Builds a dictionary from already decoded entries
    ///
    /// # Errors
    ///
    /// * `IndexError::Inconsistent` if a name or an id appears twice
    pub fn from_entries(mut entries: Vec<ChromEntry>, offset: u64) -> Result<Self> {
        entries.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        if let Some(pair) = entries.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(IndexError::Inconsistent {
                offset,
                reason: format!("duplicate chromosome name {}", pair[0].name),
            }
            .into());
        }
        let mut by_id = HashMap::with_capacity(entries.len());
        for (pos, entry) in entries.iter().enumerate() {
            if by_id.insert(entry.id, pos).is_some() {
                return Err(IndexError::Inconsistent {
                    offset,
                    reason: format!("two names share chromosome id {}", entry.id),
                }
                .into());
            }
        }
        Ok(Self { entries, by_id })
    }

    /// Reads the B+ tree stored at `offset`
    ///
    /// # Errors
    ///
    /// * `IndexError` for a bad magic number, a value size other than 8, broken node
    ///   flags, pointers outside the file, unordered keys or an item count that does
    ///   not match the leaves
    /// * I/O errors from the underlying source
    pub fn read<R: Read + Seek>(
        src: &mut R,
        offset: u64,
        endianness: Endianness,
        file_len: u64,
    ) -> Result<Self> {
        let mut buffer = [0u8; SIZE_CHROM_TREE_HEADER];
        read_exact_at(src, offset, offset, file_len, &mut buffer)?;
        let e = endianness;

        let magic = e.read_u32(&buffer[0..4]);
        if magic != CHROM_TREE_MAGIC {
            return Err(IndexError::BadMagic {
                offset,
                found: magic,
            }
            .into());
        }
        let key_size = e.read_u32(&buffer[8..12]) as usize;
        let val_size = e.read_u32(&buffer[12..16]);
        let item_count = e.read_u64(&buffer[16..24]);
        if val_size != 8 {
            return Err(IndexError::Inconsistent {
                offset,
                reason: format!("value size is {val_size}, expected 8"),
            }
            .into());
        }
        if key_size == 0 || key_size > 255 {
            return Err(IndexError::Inconsistent {
                offset,
                reason: format!("key size {key_size} is out of range"),
            }
            .into());
        }

        let mut walker = TreeWalker {
            src,
            e,
            key_size,
            file_len,
            entries: Vec::new(),
            visited: HashSet::new(),
        };
        walker.visit(offset + SIZE_CHROM_TREE_HEADER as u64, 0, &[], None)?;

        if walker.entries.len() as u64 != item_count {
            return Err(IndexError::Inconsistent {
                offset,
                reason: format!(
                    "header announces {item_count} chromosomes but leaves hold {}",
                    walker.entries.len()
                ),
            }
            .into());
        }
        debug!("read {item_count} chromosomes from tree at byte {offset}");
        Self::from_entries(walker.entries, offset)
    }

    /// Returns `(id, length)` for a name
    #[must_use]
    pub fn lookup_by_name(&self, name: &str) -> Option<(u32, u64)> {
        self.entries
            .binary_search_by(|entry| entry.name.as_bytes().cmp(name.as_bytes()))
            .ok()
            .map(|pos| (self.entries[pos].id, self.entries[pos].length))
    }

    /// Returns `(name, length)` for an id
    #[must_use]
    pub fn lookup_by_id(&self, id: u32) -> Option<(&str, u64)> {
        self.by_id
            .get(&id)
            .map(|&pos| (self.entries[pos].name.as_str(), self.entries[pos].length))
    }

    /// All entries, sorted by name
    #[must_use]
    pub fn list(&self) -> &[ChromEntry] {
        &self.entries
    }

    /// Largest id in the dictionary
    #[must_use]
    pub fn max_id(&self) -> Option<u32> {
        self.by_id.keys().copied().max()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Recursive state for one pass over the B+ tree
struct TreeWalker<'a, R> {
    src: &'a mut R,
    e: Endianness,
    key_size: usize,
    file_len: u64,
    entries: Vec<ChromEntry>,
    visited: HashSet<u64>,
}
impl<R: Read + Seek> TreeWalker<'_, R> {
    /// Visits the node at `offset`, whose keys must lie in `[lower, upper)`
    fn visit(
        &mut self,
        offset: u64,
        depth: usize,
        lower: &[u8],
        upper: Option<&[u8]>,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(IndexError::TooDeep(offset).into());
        }
        if !self.visited.insert(offset) {
            return Err(IndexError::Cycle(offset).into());
        }

        let mut node = [0u8; SIZE_NODE_HEADER];
        read_exact_at(&mut *self.src, offset, offset, self.file_len, &mut node)?;
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
        let count = self.e.read_u16(&node[2..4]) as usize;

        let item_size = self.key_size + 8;
        let mut items = vec![0u8; count * item_size];
        read_exact_at(
            &mut *self.src,
            offset,
            offset + SIZE_NODE_HEADER as u64,
            self.file_len,
            &mut items,
        )?;

        let keys: Vec<&[u8]> = items
            .chunks_exact(item_size)
            .map(|item| trim_key(&item[..self.key_size]))
            .collect();
        for (i, key) in keys.iter().enumerate() {
            let ordered = (i == 0 || keys[i - 1] < *key)
                && *key >= lower
                && upper.is_none_or(|upper| *key < upper);
            if !ordered {
                return Err(IndexError::Inconsistent {
                    offset,
                    reason: format!("key {} is out of order", String::from_utf8_lossy(key)),
                }
                .into());
            }
        }

        if is_leaf {
            for (item, key) in items.chunks_exact(item_size).zip(&keys) {
                let name = std::str::from_utf8(key).map_err(|_| IndexError::Inconsistent {
                    offset,
                    reason: "chromosome name is not UTF-8".to_string(),
                })?;
                let value = &item[self.key_size..];
                self.entries.push(ChromEntry {
                    name: name.to_string(),
                    id: self.e.read_u32(&value[0..4]),
                    length: u64::from(self.e.read_u32(&value[4..8])),
                });
            }
        } else {
            for (i, item) in items.chunks_exact(item_size).enumerate() {
                let child = self.e.read_u64(&item[self.key_size..]);
                let child_upper = keys.get(i + 1).copied().or(upper);
                self.visit(child, depth + 1, keys[i], child_upper)?;
            }
        }
        Ok(())
    }
}

/// Strips the NUL padding of a key
fn trim_key(key: &[u8]) -> &[u8] {
    let end = memchr::memchr(0, key).unwrap_or(key.len());
    &key[..end]
}
