#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use htsfetch::Result;
use htsfetch::bgzf::VirtualOffset;
use htsfetch::binning::{LINEAR_SHIFT, bin_for};
use htsfetch::formats::{IndexManifest, IndexSection};
use htsfetch::storage::{ByteRange, ByteSource};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// The empty block that terminates every BGZF file.
pub const EOF_BLOCK: [u8; 28] = [
    31, 139, 8, 4, 0, 0, 0, 0, 0, 255, 6, 0, 66, 67, 2, 0, 27, 0, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

pub fn bgzf_block(payload: &[u8]) -> Vec<u8> {
    let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
    enc.write_all(payload).unwrap();
    let cdata = enc.finish().unwrap();

    let bsize = (cdata.len() + 25) as u16;
    let mut block = vec![31, 139, 8, 4, 0, 0, 0, 0, 0, 255, 6, 0, b'B', b'C', 2, 0];
    block.extend_from_slice(&bsize.to_le_bytes());
    block.extend_from_slice(&cdata);
    block.extend_from_slice(&0u32.to_le_bytes());
    block.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    block
}

/// One alignment to write into a test BAM file.
#[derive(Debug, Clone)]
pub struct TestRead {
    pub ref_id: i32,
    pub pos: i32,
    pub len: usize,
    pub flag: u16,
    pub name: String,
}

impl TestRead {
    pub fn new(ref_id: i32, pos: i32, len: usize) -> Self {
        Self {
            ref_id,
            pos,
            len,
            flag: 0,
            name: format!("r{}_{}", ref_id, pos),
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.ref_id.to_le_bytes());
        body.extend_from_slice(&self.pos.to_le_bytes());
        let bin = bin_for(self.pos as i64, self.pos as i64 + self.len as i64);
        let name_len = self.name.len() as u32 + 1;
        body.extend_from_slice(&((bin << 16) | (37 << 8) | name_len).to_le_bytes());
        body.extend_from_slice(&(((self.flag as u32) << 16) | 1).to_le_bytes());
        body.extend_from_slice(&(self.len as i32).to_le_bytes());
        body.extend_from_slice(&(-1i32).to_le_bytes());
        body.extend_from_slice(&(-1i32).to_le_bytes());
        body.extend_from_slice(&0i32.to_le_bytes());
        body.extend_from_slice(self.name.as_bytes());
        body.push(0);
        body.extend_from_slice(&((self.len as u32) << 4).to_le_bytes());
        // ACGT repeated: codes 1 2 4 8.
        let codes = [1u8, 2, 4, 8];
        for i in (0..self.len).step_by(2) {
            let hi = codes[i % 4];
            let lo = if i + 1 < self.len { codes[(i + 1) % 4] } else { 0 };
            body.push((hi << 4) | lo);
        }
        body.extend(std::iter::repeat_n(30u8, self.len));
        body.extend_from_slice(b"RGZtest\0");

        let mut out = (body.len() as i32).to_le_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }
}

/// Bins and linear index of one reference, ready to encode.
#[derive(Debug, Clone, Default)]
pub struct TestReferenceIndex {
    pub bins: BTreeMap<u32, Vec<(VirtualOffset, VirtualOffset)>>,
    pub linear: Vec<VirtualOffset>,
}

/// Encodes a BAI file, returning the bytes and each reference's section.
pub fn encode_bai(references: &[TestReferenceIndex]) -> (Vec<u8>, Vec<IndexSection>) {
    let mut out = Vec::new();
    out.extend_from_slice(&0x0149_4142u32.to_le_bytes());
    out.extend_from_slice(&(references.len() as u32).to_le_bytes());

    let mut sections = Vec::new();
    for reference in references {
        let start = out.len();
        out.extend_from_slice(&(reference.bins.len() as u32).to_le_bytes());
        for (bin, chunks) in &reference.bins {
            out.extend_from_slice(&bin.to_le_bytes());
            out.extend_from_slice(&(chunks.len() as u32).to_le_bytes());
            for (cs, ce) in chunks {
                out.extend_from_slice(&u64::from(*cs).to_le_bytes());
                out.extend_from_slice(&u64::from(*ce).to_le_bytes());
            }
        }
        out.extend_from_slice(&(reference.linear.len() as u32).to_le_bytes());
        for vo in &reference.linear {
            out.extend_from_slice(&u64::from(*vo).to_le_bytes());
        }
        sections.push(IndexSection(start as u64, (out.len() - start) as u64));
    }
    (out, sections)
}

pub fn header_bytes(refs: &[(&str, u32)]) -> Vec<u8> {
    let text = "@HD\tVN:1.6\tSO:coordinate\n";
    let mut out = 0x014d_4142u32.to_le_bytes().to_vec();
    out.extend_from_slice(&(text.len() as i32).to_le_bytes());
    out.extend_from_slice(text.as_bytes());
    out.extend_from_slice(&(refs.len() as i32).to_le_bytes());
    for (name, len) in refs {
        out.extend_from_slice(&(name.len() as i32 + 1).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(&len.to_le_bytes());
    }
    out
}

/// A BAM file with its index, built from sorted reads.
pub struct BamFixture {
    pub bam: Vec<u8>,
    pub bai: Vec<u8>,
    pub manifest: IndexManifest,
    /// Compressed start of every record block.
    pub blocks: Vec<u64>,
}

/// Writes the header into its own block, then `per_block` records per
/// block, then the EOF marker, and indexes the result.
pub fn build_bam(refs: &[(&str, u32)], reads: &[TestRead], per_block: usize) -> BamFixture {
    let mut bam = bgzf_block(&header_bytes(refs));

    let groups: Vec<&[TestRead]> = reads.chunks(per_block.max(1)).collect();
    let compressed: Vec<(Vec<u8>, Vec<(u16, u16)>)> = groups
        .iter()
        .map(|group| {
            let mut payload = Vec::new();
            let mut spans = Vec::new();
            for read in *group {
                let start = payload.len() as u16;
                payload.extend_from_slice(&read.encode());
                spans.push((start, payload.len() as u16));
            }
            (bgzf_block(&payload), spans)
        })
        .collect();

    let mut indices = vec![TestReferenceIndex::default(); refs.len()];
    let mut blocks = Vec::new();
    let mut read_iter = reads.iter();

    for (block, spans) in &compressed {
        let block_start = bam.len() as u64;
        let next_start = block_start + block.len() as u64;
        blocks.push(block_start);

        for (i, (start, end)) in spans.iter().enumerate() {
            let read = read_iter.next().unwrap();
            let cs = VirtualOffset::new(block_start, *start);
            let ce = if i + 1 == spans.len() {
                VirtualOffset::new(next_start, 0)
            } else {
                VirtualOffset::new(block_start, *end)
            };
            if read.ref_id < 0 {
                continue;
            }

            let index = &mut indices[read.ref_id as usize];
            let (begin, stop) = (read.pos as i64, read.pos as i64 + read.len as i64);
            let chunks = index.bins.entry(bin_for(begin, stop)).or_default();
            match chunks.last_mut() {
                Some(last) if last.1 == cs || last.1.block() == cs.block() => last.1 = ce,
                _ => chunks.push((cs, ce)),
            }

            let first_tile = (begin >> LINEAR_SHIFT) as usize;
            let last_tile = ((stop - 1) >> LINEAR_SHIFT) as usize;
            if index.linear.len() <= last_tile {
                index.linear.resize(last_tile + 1, VirtualOffset::default());
            }
            for tile in first_tile..=last_tile {
                if index.linear[tile].is_zero() {
                    index.linear[tile] = cs;
                }
            }
        }
        bam.extend_from_slice(block);
    }
    bam.extend_from_slice(&EOF_BLOCK);

    let (bai, sections) = encode_bai(&indices);
    let min_block_index = blocks.first().copied().unwrap_or(bam.len() as u64);
    BamFixture {
        bam,
        bai,
        manifest: IndexManifest {
            min_block_index,
            chunks: sections.into_iter().map(Some).collect(),
        },
        blocks,
    }
}

/// Packs `bases` into a version 0 little-endian 2bit file.
pub fn twobit_file(sequences: &[(&str, &str, &[(u32, u32)])]) -> Vec<u8> {
    let mut header = Vec::new();
    for v in [0x1A41_2743u32, 0, sequences.len() as u32, 0] {
        header.extend_from_slice(&v.to_le_bytes());
    }
    let table_len: usize = sequences.iter().map(|(name, _, _)| 1 + name.len() + 4).sum();

    let mut records = Vec::new();
    let mut offset = (header.len() + table_len) as u32;
    for (name, bases, n_blocks) in sequences {
        header.push(name.len() as u8);
        header.extend_from_slice(name.as_bytes());
        header.extend_from_slice(&offset.to_le_bytes());

        let mut record = Vec::new();
        record.extend_from_slice(&(bases.len() as u32).to_le_bytes());
        record.extend_from_slice(&(n_blocks.len() as u32).to_le_bytes());
        for (start, _) in *n_blocks {
            record.extend_from_slice(&start.to_le_bytes());
        }
        for (_, size) in *n_blocks {
            record.extend_from_slice(&size.to_le_bytes());
        }
        record.extend_from_slice(&0u32.to_le_bytes());
        record.extend_from_slice(&0u32.to_le_bytes());
        for group in bases.as_bytes().chunks(4) {
            let mut byte = 0u8;
            for (i, b) in group.iter().enumerate() {
                let code = match b {
                    b'T' => 0,
                    b'C' => 1,
                    b'A' => 2,
                    _ => 3,
                };
                byte |= code << (6 - 2 * i);
            }
            record.push(byte);
        }
        offset += record.len() as u32;
        records.extend_from_slice(&record);
    }

    header.extend_from_slice(&records);
    header
}

/// Wraps a source and records every range fetched through it.
pub struct CountingSource {
    inner: Arc<dyn ByteSource>,
    pub fetches: Mutex<Vec<ByteRange>>,
}

impl CountingSource {
    pub fn new(inner: Arc<dyn ByteSource>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fetches: Mutex::new(Vec::new()),
        })
    }

    pub fn fetched(&self) -> Vec<ByteRange> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ByteSource for CountingSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self, range: ByteRange) -> Result<Bytes> {
        self.fetches.lock().unwrap().push(range);
        self.inner.fetch(range).await
    }
}
