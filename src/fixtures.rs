//! Writers for the binary layouts read by this crate, used to build test inputs

use std::collections::BTreeMap;
use std::io::Write;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use flate2::write::{DeflateEncoder, ZlibEncoder};
use flate2::{Compression, Crc};

use crate::bgzf::VirtualOffset;
use crate::bigwig::chrom::CHROM_TREE_MAGIC;
use crate::bigwig::header::{BIGWIG_MAGIC, SIZE_HEADER, SIZE_SUMMARY, SIZE_ZOOM_HEADER};
use crate::bigwig::index::{Bounds, CIR_TREE_MAGIC};
use crate::tabix::TBI_MAGIC;

/// Byte sink writing in either byte order
struct Out {
    buf: Vec<u8>,
    big: bool,
}
impl Out {
    fn new(big: bool) -> Self {
        Self {
            buf: Vec::new(),
            big,
        }
    }

    fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    fn u16(&mut self, v: u16) -> &mut Self {
        let mut b = [0u8; 2];
        if self.big {
            BigEndian::write_u16(&mut b, v);
        } else {
            LittleEndian::write_u16(&mut b, v);
        }
        self.buf.extend_from_slice(&b);
        self
    }

    fn u32(&mut self, v: u32) -> &mut Self {
        let mut b = [0u8; 4];
        if self.big {
            BigEndian::write_u32(&mut b, v);
        } else {
            LittleEndian::write_u32(&mut b, v);
        }
        self.buf.extend_from_slice(&b);
        self
    }

    fn u64(&mut self, v: u64) -> &mut Self {
        let mut b = [0u8; 8];
        if self.big {
            BigEndian::write_u64(&mut b, v);
        } else {
            LittleEndian::write_u64(&mut b, v);
        }
        self.buf.extend_from_slice(&b);
        self
    }

    fn f32(&mut self, v: f32) -> &mut Self {
        self.u32(v.to_bits())
    }

    fn f64(&mut self, v: f64) -> &mut Self {
        self.u64(v.to_bits())
    }

    fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    fn bounds(&mut self, b: Bounds) -> &mut Self {
        self.u32(b.start_chrom)
            .u32(b.start_base)
            .u32(b.end_chrom)
            .u32(b.end_base)
    }
}

/// Groups `n` items into nodes of at most `fan_out`, level by level, up to a
/// single root. Returns the levels root first; each node lists indices into the
/// level below (or into the items for the last level).
fn tree_levels(n: usize, fan_out: usize) -> Vec<Vec<Vec<usize>>> {
    let group = |count: usize| -> Vec<Vec<usize>> {
        let nodes: Vec<Vec<usize>> = (0..count)
            .collect::<Vec<_>>()
            .chunks(fan_out.max(2))
            .map(<[usize]>::to_vec)
            .collect();
        if nodes.is_empty() {
            vec![Vec::new()]
        } else {
            nodes
        }
    };
    let mut levels = vec![group(n)];
    while levels.last().map_or(0, Vec::len) > 1 {
        let below = levels.last().map_or(0, Vec::len);
        levels.push(group(below));
    }
    levels.reverse();
    levels
}

/// Offsets of every node, given the node sizes per level (root first)
fn node_offsets(
    levels: &[Vec<Vec<usize>>],
    start: u64,
    size: impl Fn(usize, usize) -> u64,
) -> Vec<Vec<u64>> {
    let n_levels = levels.len();
    let mut offset = start;
    levels
        .iter()
        .enumerate()
        .map(|(depth, nodes)| {
            nodes
                .iter()
                .map(|node| {
                    let at = offset;
                    offset += size(n_levels - 1 - depth, node.len());
                    at
                })
                .collect()
        })
        .collect()
}

/// Chromosome B+ tree writer
pub struct ChromTreeBuilder {
    /// `(name, id, length)` in key order
    entries: Vec<(String, u32, u32)>,
    block_size: usize,
}
impl ChromTreeBuilder {
    /// Entries get ids in input order and are sorted by name
    pub fn new(chroms: &[(String, u32)]) -> Self {
        let mut builder = Self::unsorted(chroms);
        builder.entries.sort_by(|a, b| a.0.cmp(&b.0));
        builder
    }

    /// Keeps the input order, producing an invalid tree for unsorted input
    pub fn unsorted(chroms: &[(String, u32)]) -> Self {
        Self {
            entries: chroms
                .iter()
                .enumerate()
                .map(|(id, (name, len))| (name.clone(), id as u32, *len))
                .collect(),
            block_size: 256,
        }
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Little-endian tree whose header sits at `base`
    pub fn build(&self, base: u64) -> Vec<u8> {
        self.write(base, false)
    }

    fn write(&self, base: u64, big: bool) -> Vec<u8> {
        let key_size = self.entries.iter().map(|e| e.0.len()).max().unwrap_or(1).max(1);
        let item_size = key_size as u64 + 8;
        let levels = tree_levels(self.entries.len(), self.block_size);
        let offsets = node_offsets(&levels, base + 32, |_, n| 4 + n as u64 * item_size);

        // first entry under every node, leaves up
        let mut first: Vec<Vec<usize>> = vec![Vec::new(); levels.len()];
        for depth in (0..levels.len()).rev() {
            first[depth] = levels[depth]
                .iter()
                .map(|node| match node.first() {
                    Some(&i) if depth + 1 == levels.len() => i,
                    Some(&i) => first[depth + 1][i],
                    None => 0,
                })
                .collect();
        }

        let mut out = Out::new(big);
        out.u32(CHROM_TREE_MAGIC)
            .u32(self.block_size as u32)
            .u32(key_size as u32)
            .u32(8)
            .u64(self.entries.len() as u64)
            .u64(0);
        let key = |name: &str| {
            let mut key = name.as_bytes().to_vec();
            key.resize(key_size, 0);
            key
        };
        for (depth, nodes) in levels.iter().enumerate() {
            let is_leaf = depth + 1 == levels.len();
            for node in nodes {
                out.u8(u8::from(is_leaf)).u8(0).u16(node.len() as u16);
                for &i in node {
                    if is_leaf {
                        let (name, id, len) = &self.entries[i];
                        out.bytes(&key(name)).u32(*id).u32(*len);
                    } else {
                        let name = &self.entries[first[depth + 1][i]].0;
                        out.bytes(&key(name)).u64(offsets[depth + 1][i]);
                    }
                }
            }
        }
        out.buf
    }
}

/// CIR tree writer over `(bounds, block offset, block size)` leaves
pub struct RTreeBuilder {
    leaves: Vec<(Bounds, u64, u64)>,
    fan_out: usize,
}
impl RTreeBuilder {
    pub fn new(leaves: Vec<(Bounds, u64, u64)>) -> Self {
        Self {
            leaves,
            fan_out: 256,
        }
    }

    pub fn fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Little-endian tree whose header sits at `base`
    pub fn build(&self, base: u64) -> Vec<u8> {
        self.write(base, false, base)
    }

    fn write(&self, base: u64, big: bool, end_file_offset: u64) -> Vec<u8> {
        let levels = tree_levels(self.leaves.len(), self.fan_out);
        let offsets = node_offsets(&levels, base + 48, |height, n| {
            let item = if height == 0 { 32 } else { 24 };
            4 + n as u64 * item
        });

        // bounds of every node, leaves up
        let mut bounds: Vec<Vec<Bounds>> = vec![Vec::new(); levels.len()];
        for depth in (0..levels.len()).rev() {
            bounds[depth] = levels[depth]
                .iter()
                .map(|node| {
                    let items = node.iter().map(|&i| {
                        if depth + 1 == levels.len() {
                            self.leaves[i].0
                        } else {
                            bounds[depth + 1][i]
                        }
                    });
                    union(items)
                })
                .collect();
        }

        let mut out = Out::new(big);
        out.u32(CIR_TREE_MAGIC)
            .u32(self.fan_out as u32)
            .u64(self.leaves.len() as u64)
            .bounds(bounds[0][0])
            .u64(end_file_offset)
            .u32(1)
            .u32(0);
        for (depth, nodes) in levels.iter().enumerate() {
            let is_leaf = depth + 1 == levels.len();
            for node in nodes {
                out.u8(u8::from(is_leaf)).u8(0).u16(node.len() as u16);
                for &i in node {
                    if is_leaf {
                        let (b, offset, size) = self.leaves[i];
                        out.bounds(b).u64(offset).u64(size);
                    } else {
                        out.bounds(bounds[depth + 1][i]).u64(offsets[depth + 1][i]);
                    }
                }
            }
        }
        out.buf
    }
}

/// Smallest range covering every input, all zero when empty
fn union(items: impl Iterator<Item = Bounds>) -> Bounds {
    items
        .reduce(|a, b| {
            let (sc, sb) = (a.start_chrom, a.start_base).min((b.start_chrom, b.start_base));
            let (ec, eb) = (a.end_chrom, a.end_base).max((b.end_chrom, b.end_base));
            Bounds::new(sc, sb, ec, eb)
        })
        .unwrap_or(Bounds::new(0, 0, 0, 0))
}

/// One data section, kept as `(start, end, value)` items whatever its encoding
#[derive(Debug, Clone)]
pub struct Section {
    pub chrom_id: u32,
    pub start: u32,
    pub end: u32,
    pub step: u32,
    pub span: u32,
    /// Encoding written in the header; anything but 1, 2 and 3 is written as bedGraph
    pub tag: u8,
    pub items: Vec<(u32, u32, f32)>,
}
impl Section {
    fn with_items(
        chrom_id: u32,
        tag: u8,
        step: u32,
        span: u32,
        items: Vec<(u32, u32, f32)>,
    ) -> Self {
        Self {
            chrom_id,
            start: items.first().map_or(0, |i| i.0),
            end: items.iter().map(|i| i.1).max().unwrap_or(0),
            step,
            span,
            tag,
            items,
        }
    }

    pub fn fixed_step(chrom_id: u32, start: u32, step: u32, span: u32, values: &[f32]) -> Self {
        let items = values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let s = start + i as u32 * step;
                (s, s + span, v)
            })
            .collect();
        let mut section = Self::with_items(chrom_id, 3, step, span, items);
        section.start = start;
        section
    }

    pub fn var_step(chrom_id: u32, span: u32, items: &[(u32, f32)]) -> Self {
        let items = items.iter().map(|&(s, v)| (s, s + span, v)).collect();
        Self::with_items(chrom_id, 2, 0, span, items)
    }

    pub fn bedgraph(chrom_id: u32, items: &[(u32, u32, f32)]) -> Self {
        Self::with_items(chrom_id, 1, 0, 0, items.to_vec())
    }

    /// Little-endian section bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.write(false)
    }

    fn write(&self, big: bool) -> Vec<u8> {
        let mut out = Out::new(big);
        out.u32(self.chrom_id)
            .u32(self.start)
            .u32(self.end)
            .u32(self.step)
            .u32(self.span)
            .u8(self.tag)
            .u8(0)
            .u16(self.items.len() as u16);
        for &(start, end, value) in &self.items {
            match self.tag {
                2 => out.u32(start).f32(value),
                3 => out.f32(value),
                _ => out.u32(start).u32(end).f32(value),
            };
        }
        out.buf
    }

    fn bounds(&self) -> Bounds {
        Bounds::on_chrom(self.chrom_id, self.start, self.end)
    }
}

/// Running statistics over covered bases
#[derive(Debug, Clone, Copy)]
struct Stats {
    bases: u64,
    min: f64,
    max: f64,
    sum: f64,
    sum_sq: f64,
}
impl Default for Stats {
    fn default() -> Self {
        Self {
            bases: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }
}
impl Stats {
    fn add(&mut self, bases: u32, value: f32) {
        let (n, v) = (f64::from(bases), f64::from(value));
        self.bases += u64::from(bases);
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.sum += v * n;
        self.sum_sq += v * v * n;
    }
}

/// Whole bigWig container writer
pub struct BigWigBuilder {
    chroms: Vec<(String, u32)>,
    blocks: Vec<Vec<Section>>,
    fan_out: usize,
    compressed: bool,
    big_endian: bool,
    zstd: bool,
    zoom: Option<u32>,
}
impl BigWigBuilder {
    /// Chromosome ids follow the order of `chroms`
    pub fn new(chroms: &[(&str, u32)]) -> Self {
        Self {
            chroms: chroms.iter().map(|(n, l)| ((*n).to_string(), *l)).collect(),
            blocks: Vec::new(),
            fan_out: 256,
            compressed: true,
            big_endian: false,
            zstd: false,
            zoom: None,
        }
    }

    /// Adds a data block; blocks are written sorted by their first section
    pub fn block(mut self, sections: Vec<Section>) -> Self {
        self.blocks.push(sections);
        self
    }

    pub fn fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Zlib compression of blocks, on by default
    pub fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub fn big_endian(mut self, big_endian: bool) -> Self {
        self.big_endian = big_endian;
        self
    }

    /// Zstd compression of blocks instead of zlib
    pub fn zstd(mut self, zstd: bool) -> Self {
        self.zstd = zstd;
        self
    }

    /// Adds one zoom level with the given reduction
    pub fn zoom(mut self, reduction: u32) -> Self {
        self.zoom = Some(reduction);
        self
    }

    fn pack(&self, raw: &[u8]) -> Vec<u8> {
        if self.zstd {
            zstd::bulk::compress(raw, 3).expect("zstd compression")
        } else if self.compressed {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(raw).expect("zlib compression");
            encoder.finish().expect("zlib compression")
        } else {
            raw.to_vec()
        }
    }

    /// Zoom records of every chromosome, one raw block per chromosome
    fn zoom_blocks(&self, reduction: u32) -> Vec<(Bounds, Vec<u8>, usize)> {
        let mut bins: BTreeMap<(u32, u32), Stats> = BTreeMap::new();
        for section in self.blocks.iter().flatten().filter(|s| (1..=3).contains(&s.tag)) {
            for &(start, end, value) in &section.items {
                let mut pos = start;
                while pos < end {
                    let bin = pos / reduction;
                    let stop = end.min((bin + 1) * reduction);
                    bins.entry((section.chrom_id, bin))
                        .or_default()
                        .add(stop - pos, value);
                    pos = stop;
                }
            }
        }

        let mut per_chrom: BTreeMap<u32, (Out, Vec<Bounds>, usize)> = BTreeMap::new();
        for (&(chrom_id, bin), stats) in &bins {
            let length = self.chroms[chrom_id as usize].1;
            let start = bin * reduction;
            let end = ((bin + 1) * reduction).min(length);
            let (out, bounds, count) = per_chrom
                .entry(chrom_id)
                .or_insert_with(|| (Out::new(self.big_endian), Vec::new(), 0));
            out.u32(chrom_id)
                .u32(start)
                .u32(end)
                .u32(stats.bases as u32)
                .f32(stats.min as f32)
                .f32(stats.max as f32)
                .f32(stats.sum as f32)
                .f32(stats.sum_sq as f32);
            bounds.push(Bounds::on_chrom(chrom_id, start, end));
            *count += 1;
        }
        per_chrom
            .into_values()
            .map(|(out, bounds, count)| (union(bounds.into_iter()), out.buf, count))
            .collect()
    }

    pub fn build(&self) -> Vec<u8> {
        let big = self.big_endian;
        let mut blocks = self.blocks.clone();
        blocks.sort_by_key(|sections| {
            sections
                .first()
                .map(|s| (s.chrom_id, s.start))
                .unwrap_or_default()
        });
        let raw_blocks: Vec<Vec<u8>> = blocks
            .iter()
            .map(|sections| sections.iter().flat_map(|s| s.write(big)).collect())
            .collect();
        let zoom_blocks = self.zoom.map(|r| self.zoom_blocks(r)).unwrap_or_default();

        let compressed = self.compressed || self.zstd;
        let max_raw = raw_blocks
            .iter()
            .map(Vec::len)
            .chain(zoom_blocks.iter().map(|z| z.1.len()))
            .max()
            .unwrap_or(0);
        let buf_size = if compressed { max_raw.max(1) as u32 } else { 0 };

        let n_zoom = usize::from(self.zoom.is_some());
        let summary_offset = SIZE_HEADER + n_zoom * SIZE_ZOOM_HEADER;
        let chrom_offset = summary_offset + SIZE_SUMMARY;

        let mut file = vec![0u8; chrom_offset];
        file.extend(ChromTreeBuilder::new(&self.chroms).write(chrom_offset as u64, big));

        let data_offset = file.len() as u64;
        let n_sections = blocks.iter().map(Vec::len).sum::<usize>();
        file.extend(Out::new(big).u64(n_sections as u64).buf.iter());
        let mut leaves = Vec::with_capacity(blocks.len());
        for (sections, raw) in blocks.iter().zip(&raw_blocks) {
            let packed = self.pack(raw);
            let bounds = union(sections.iter().map(Section::bounds));
            leaves.push((bounds, file.len() as u64, packed.len() as u64));
            file.extend(packed);
        }
        let index_offset = file.len() as u64;
        let index = RTreeBuilder::new(leaves)
            .fan_out(self.fan_out)
            .write(index_offset, big, index_offset);
        file.extend(index);

        let mut zoom_header = None;
        if let Some(reduction) = self.zoom {
            let zoom_data = file.len() as u64;
            let n_records = zoom_blocks.iter().map(|z| z.2).sum::<usize>();
            file.extend(Out::new(big).u64(n_records as u64).buf.iter());
            let mut leaves = Vec::with_capacity(zoom_blocks.len());
            for (bounds, raw, _) in &zoom_blocks {
                let packed = self.pack(raw);
                leaves.push((*bounds, file.len() as u64, packed.len() as u64));
                file.extend(packed);
            }
            let zoom_index = file.len() as u64;
            let index = RTreeBuilder::new(leaves)
                .fan_out(self.fan_out)
                .write(zoom_index, big, zoom_index);
            file.extend(index);
            zoom_header = Some((reduction, zoom_data, zoom_index));
        }

        let mut total = Stats::default();
        for section in blocks.iter().flatten().filter(|s| (1..=3).contains(&s.tag)) {
            for &(start, end, value) in &section.items {
                total.add(end - start, value);
            }
        }
        if total.bases == 0 {
            total.min = 0.0;
            total.max = 0.0;
        }

        let mut head = Out::new(big);
        head.u32(BIGWIG_MAGIC)
            .u16(4)
            .u16(n_zoom as u16)
            .u64(chrom_offset as u64)
            .u64(data_offset)
            .u64(index_offset)
            .u16(0)
            .u16(0)
            .u64(0)
            .u64(summary_offset as u64)
            .u32(buf_size)
            .u64(0);
        if let Some((reduction, data, index)) = zoom_header {
            head.u32(reduction).u32(0).u64(data).u64(index);
        }
        head.u64(total.bases)
            .f64(total.min)
            .f64(total.max)
            .f64(total.sum)
            .f64(total.sum_sq);
        file[..chrom_offset].copy_from_slice(&head.buf);
        file
    }
}

/// BGZF stream writer cutting the input into members of `block_size` bytes
pub struct BgzfWriter {
    block_size: usize,
}

/// A written BGZF stream and the layout of its members
pub struct Bgzf {
    pub bytes: Vec<u8>,
    /// `(compressed offset, uncompressed start, uncompressed length)` per data member
    members: Vec<(u64, u64, u64)>,
    /// Compressed offset of the empty end-of-file member
    eof_offset: u64,
}
impl Bgzf {
    /// Virtual offset of a position in the uncompressed input
    ///
    /// A position at the end of a member maps to the start of the next one.
    pub fn virtual_offset(&self, uoffset: u64) -> VirtualOffset {
        self.members
            .iter()
            .find(|(_, start, len)| uoffset >= *start && uoffset < start + len)
            .map_or(VirtualOffset::new(self.eof_offset, 0), |(c, start, _)| {
                VirtualOffset::new(*c, (uoffset - start) as u16)
            })
    }
}
impl BgzfWriter {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.clamp(1, 0xFF00),
        }
    }

    pub fn write(&self, data: &[u8]) -> Bgzf {
        let mut bytes = Vec::new();
        let mut members = Vec::new();
        for (i, chunk) in data.chunks(self.block_size).enumerate() {
            let start = (i * self.block_size) as u64;
            members.push((bytes.len() as u64, start, chunk.len() as u64));
            bytes.extend(member(chunk));
        }
        let eof_offset = bytes.len() as u64;
        bytes.extend(member(&[]));
        Bgzf {
            bytes,
            members,
            eof_offset,
        }
    }
}

/// One BGZF member holding `data`
fn member(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("deflate");
    let deflated = encoder.finish().expect("deflate");
    let mut crc = Crc::new();
    crc.update(data);

    let bsize = 18 + deflated.len() + 8;
    let mut out = Vec::with_capacity(bsize);
    out.extend_from_slice(&[31, 139, 8, 4, 0, 0, 0, 0, 0, 255, 6, 0, b'B', b'C', 2, 0]);
    out.write_u16::<LittleEndian>((bsize - 1) as u16).expect("write");
    out.extend_from_slice(&deflated);
    out.write_u32::<LittleEndian>(crc.sum()).expect("write");
    out.write_u32::<LittleEndian>(data.len() as u32).expect("write");
    out
}

/// Tabix index writer, one chunk per added line
pub struct TabixBuilder {
    names: Vec<String>,
    /// Per reference: bin -> chunks, and the linear index
    refs: Vec<(BTreeMap<u32, Vec<(u64, u64)>>, Vec<u64>)>,
}
impl TabixBuilder {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| (*n).to_string()).collect(),
            refs: vec![(BTreeMap::new(), Vec::new()); names.len()],
        }
    }

    /// Indexes a line covering the 0-based half-open `[beg, end)`
    pub fn add(
        &mut self,
        rid: usize,
        beg: u64,
        end: u64,
        start: VirtualOffset,
        stop: VirtualOffset,
    ) {
        let end = end.max(beg + 1);
        let (bins, linear) = &mut self.refs[rid];
        bins.entry(reg2bin(beg, end))
            .or_default()
            .push((start.as_raw(), stop.as_raw()));
        let last = ((end - 1) >> 14) as usize;
        if linear.len() <= last {
            linear.resize(last + 1, 0);
        }
        for slot in &mut linear[(beg >> 14) as usize..=last] {
            if *slot == 0 || start.as_raw() < *slot {
                *slot = start.as_raw();
            }
        }
    }

    /// Uncompressed index bytes
    pub fn build(&self) -> Vec<u8> {
        let mut names = Vec::new();
        for name in &self.names {
            names.extend_from_slice(name.as_bytes());
            names.push(0);
        }
        let mut out = Out::new(false);
        out.bytes(TBI_MAGIC)
            .u32(self.names.len() as u32)
            .u32(0)
            .u32(1)
            .u32(4)
            .u32(5)
            .u32(u32::from(b'#'))
            .u32(0)
            .u32(names.len() as u32)
            .bytes(&names);
        for (bins, linear) in &self.refs {
            out.u32(bins.len() as u32);
            for (bin, chunks) in bins {
                out.u32(*bin).u32(chunks.len() as u32);
                for &(start, stop) in chunks {
                    out.u64(start).u64(stop);
                }
            }
            out.u32(linear.len() as u32);
            for &offset in linear {
                out.u64(offset);
            }
        }
        out.buf
    }
}

/// Smallest bin fully containing `[beg, end)`
fn reg2bin(beg: u64, end: u64) -> u32 {
    let end = end - 1;
    for level in (1..=5u32).rev() {
        let shift = 29 - 3 * level;
        if beg >> shift == end >> shift {
            let offset = ((1u64 << (3 * level)) - 1) / 7;
            return (offset + (beg >> shift)) as u32;
        }
    }
    0
}
