//! BAI index parsing and chunk resolution.
//!
//! ```text
//! BAI file (little-endian):
//! - magic (char[4]): "BAI\1"
//! - n_ref (int32)
//! - per reference:
//!   - n_bin (int32)
//!   - per bin: bin (uint32), n_chunk (int32), n_chunk x (chunk_beg, chunk_end) (uint64 virtual offsets)
//!   - n_intv (int32)
//!   - n_intv x ioffset (uint64 virtual offsets, one per 16kb tile)
//! ```
//!
//! Reference sections are kept as raw bytes and walked once per query, so
//! bins outside the query cost nothing beyond skipping their chunk list.

use crate::bgzf::{Chunk, MAX_BLOCK_SIZE, VirtualOffset};
use crate::binning::{LEAF_OFFSET, LINEAR_SHIFT, candidate_bins};
use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const BAI_MAGIC: u32 = 0x0149_4142;

/// Placeholder minimum block index used when no linear index entry exists.
pub const UNKNOWN_MIN_BLOCK: u64 = 1_000_000_000;

/// Byte range `(offset, length)` of one reference's section in the index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSection(pub u64, pub u64);

/// Where each reference's index section lives, so sections can be fetched
/// on demand instead of downloading the whole index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    #[serde(rename = "minBlockIndex")]
    pub min_block_index: u64,
    pub chunks: Vec<Option<IndexSection>>,
}

/// Index section for one reference sequence.
#[derive(Debug, Clone)]
pub struct ReferenceIndex {
    data: Bytes,
    n_bin: u32,
    min_block_index: u64,
}

struct SectionLayout {
    n_bin: u32,
    length: usize,
    min_block_index: u64,
}

fn read_u32(data: &[u8], p: usize) -> Result<u32> {
    data.get(p..p + 4)
        .map(LittleEndian::read_u32)
        .ok_or_else(|| Error::CorruptIndex(format!("index truncated at byte {}", p)))
}

fn read_vo(data: &[u8], p: usize, allow_zero: bool) -> Result<Option<VirtualOffset>> {
    data.get(p..p + 8)
        .map(|b| VirtualOffset::read(b, allow_zero))
        .ok_or_else(|| Error::CorruptIndex(format!("index truncated at byte {}", p)))
}

/// Measures the section starting at `offset` and finds its first linear
/// index entry.
fn layout(data: &[u8], offset: usize) -> Result<SectionLayout> {
    let mut p = offset;
    let n_bin = read_u32(data, p)?;
    p += 4;
    for _ in 0..n_bin {
        let n_chunk = read_u32(data, p + 4)? as usize;
        p += 8 + n_chunk * 16;
    }

    let n_intv = read_u32(data, p)? as usize;
    p += 4;

    let mut min_block_index = UNKNOWN_MIN_BLOCK;
    for i in 0..n_intv {
        if let Some(vo) = read_vo(data, p + i * 8, false)? {
            let mut block = vo.block();
            if vo.within() > 0 {
                block += MAX_BLOCK_SIZE;
            }
            min_block_index = min_block_index.min(block);
            break;
        }
    }
    p += n_intv * 8;

    if p > data.len() {
        return Err(Error::CorruptIndex(format!(
            "reference section needs {} bytes, only {} available",
            p - offset,
            data.len() - offset
        )));
    }

    Ok(SectionLayout {
        n_bin,
        length: p - offset,
        min_block_index,
    })
}

impl ReferenceIndex {
    /// Parses a single reference section, as fetched through a manifest.
    ///
    /// Returns `None` for a reference with no bins.
    pub fn parse(data: Bytes) -> Result<Option<Self>> {
        let layout = layout(&data, 0)?;
        Ok(Self::from_layout(data.slice(..layout.length), &layout))
    }

    fn from_layout(data: Bytes, layout: &SectionLayout) -> Option<Self> {
        (layout.n_bin > 0).then(|| Self {
            data,
            n_bin: layout.n_bin,
            min_block_index: layout.min_block_index,
        })
    }

    /// Smallest compressed offset at which this reference's records begin,
    /// rounded up to cover the block holding the first record.
    pub fn min_block_index(&self) -> u64 {
        self.min_block_index
    }

    /// Chunks that may contain records overlapping `[min, max]`, sorted and
    /// merged.
    pub fn blocks_for_range(&self, min: i64, max: i64) -> Result<Vec<Chunk>> {
        let data = &self.data[..];
        let bins: HashSet<u32> = candidate_bins(min, max + 1).into_iter().collect();

        let mut leaf_chunks = Vec::new();
        let mut other_chunks = Vec::new();
        let mut p = 4;

        for _ in 0..self.n_bin {
            let bin = read_u32(data, p)?;
            let n_chunk = read_u32(data, p + 4)? as usize;
            p += 8;

            if bins.contains(&bin) {
                let bucket = if bin < LEAF_OFFSET {
                    &mut other_chunks
                } else {
                    &mut leaf_chunks
                };
                for _ in 0..n_chunk {
                    let cs = read_vo(data, p, true)?.unwrap_or_default();
                    let ce = read_vo(data, p + 8, true)?.unwrap_or_default();
                    if ce < cs {
                        return Err(Error::CorruptIndex(format!(
                            "bin {} has a chunk ending at {} before its start {}",
                            bin, ce, cs
                        )));
                    }
                    bucket.push(Chunk::new(cs, ce));
                    p += 16;
                }
            } else {
                p += n_chunk * 16;
            }
        }

        let n_intv = read_u32(data, p)? as i64;
        p += 4;

        if n_intv > 0 {
            let lowest = lowest_offset(data, p, n_intv, min, max)?;
            other_chunks = match lowest {
                Some(lowest) => other_chunks
                    .into_iter()
                    .filter(|c| c.max >= lowest)
                    .collect(),
                None => Vec::new(),
            };
        }

        other_chunks.append(&mut leaf_chunks);
        other_chunks.sort_by_key(|c| c.min);

        Ok(merge_chunks(&other_chunks))
    }
}

/// Smallest linear index offset among the tiles overlapping `[min, max]`.
fn lowest_offset(
    data: &[u8],
    p: usize,
    n_intv: i64,
    min: i64,
    max: i64,
) -> Result<Option<VirtualOffset>> {
    let min_lin = (min >> LINEAR_SHIFT).min(n_intv - 1).max(0);
    let max_lin = (max >> LINEAR_SHIFT).min(n_intv - 1);

    let mut lowest: Option<VirtualOffset> = None;
    for i in min_lin..=max_lin {
        if let Some(lb) = read_vo(data, p + i as usize * 8, false)? {
            if lowest.is_none_or(|l| lb < l) {
                lowest = Some(lb);
            }
        }
    }
    Ok(lowest)
}

/// Merges consecutive chunks that end and start in the same compressed
/// block. Input must be sorted by start offset.
///
/// Only the block positions are compared, so two chunks with a gap inside
/// one block are fetched as one.
pub fn merge_chunks(chunks: &[Chunk]) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());

    for &chunk in chunks {
        match merged.last_mut() {
            Some(cur) if chunk.min.block() == cur.max.block() => {
                cur.max = cur.max.max(chunk.max);
            }
            _ => merged.push(chunk),
        }
    }

    merged
}

/// A whole index file split into per-reference sections.
#[derive(Debug, Clone)]
pub struct BaiIndex {
    pub references: Vec<Option<ReferenceIndex>>,
    pub min_block_index: u64,
}

impl BaiIndex {
    pub fn parse(data: Bytes) -> Result<Self> {
        let magic = data
            .get(0..4)
            .map(LittleEndian::read_u32)
            .ok_or_else(|| Error::Format("index shorter than its magic".to_string()))?;
        if magic != BAI_MAGIC {
            return Err(Error::BadMagic {
                what: "BAI",
                expected: BAI_MAGIC,
                found: magic,
            });
        }

        let n_ref = read_u32(&data, 4)? as usize;
        let mut references = Vec::new();
        let mut min_block_index = UNKNOWN_MIN_BLOCK;
        let mut p = 8;

        for _ in 0..n_ref {
            let layout = layout(&data, p)?;
            min_block_index = min_block_index.min(layout.min_block_index);
            references.push(ReferenceIndex::from_layout(
                data.slice(p..p + layout.length),
                &layout,
            ));
            p += layout.length;
        }

        Ok(Self {
            references,
            min_block_index,
        })
    }
}
