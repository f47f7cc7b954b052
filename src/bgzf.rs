//! BGZF virtual offsets and block inflation.
//!
//! A BGZF stream is a series of gzip members, each at most 64 KiB, carrying
//! its own compressed size in a `BC` extra subfield. Offsets into the stream
//! are "virtual": the compressed position of a block plus an offset inside
//! its inflated contents.
//!
//! ```text
//! BGZF block:
//! - ID1 ID2 CM FLG (4 bytes): 31 139 8 4
//! - MTIME XFL OS (6 bytes)
//! - XLEN (uint16): length of extra field
//! - extra subfields; BC subfield holds BSIZE (uint16) = block size - 1
//! - CDATA: raw deflate data
//! - CRC32 (uint32), ISIZE (uint32)
//! ```

use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use flate2::read::DeflateDecoder;
use std::cmp::Ordering;
use std::fmt;
use std::io::Read;

/// Largest size of a single BGZF block, compressed or inflated.
pub const MAX_BLOCK_SIZE: u64 = 1 << 16;

const HEADER_SIZE: usize = 12;
const TRAILER_SIZE: usize = 8;

/// Address of a byte inside a BGZF stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
pub struct VirtualOffset {
    block: u64,
    within: u16,
}

impl VirtualOffset {
    pub fn new(block: u64, within: u16) -> Self {
        Self { block, within }
    }

    /// Compressed position of the containing block.
    pub fn block(&self) -> u64 {
        self.block
    }

    /// Offset inside the inflated block.
    pub fn within(&self) -> u16 {
        self.within
    }

    pub fn is_zero(&self) -> bool {
        self.block == 0 && self.within == 0
    }

    /// Decodes the 8-byte little-endian index encoding.
    ///
    /// An all-zero offset means "absent" and yields `None` unless
    /// `allow_zero` is set.
    pub fn read(buf: &[u8], allow_zero: bool) -> Option<Self> {
        let raw = LittleEndian::read_u64(buf);
        let vo = Self::from(raw);
        (allow_zero || !vo.is_zero()).then_some(vo)
    }
}

impl From<u64> for VirtualOffset {
    fn from(raw: u64) -> Self {
        Self {
            block: raw >> 16,
            within: (raw & 0xffff) as u16,
        }
    }
}

impl From<VirtualOffset> for u64 {
    fn from(vo: VirtualOffset) -> Self {
        (vo.block << 16) | u64::from(vo.within)
    }
}

impl Ord for VirtualOffset {
    fn cmp(&self, other: &Self) -> Ordering {
        self.block
            .cmp(&other.block)
            .then_with(|| self.within.cmp(&other.within))
    }
}

impl PartialOrd for VirtualOffset {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.within)
    }
}

/// A candidate region of the compressed stream, bounded by two virtual offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Chunk {
    pub min: VirtualOffset,
    pub max: VirtualOffset,
}

impl Chunk {
    pub fn new(min: VirtualOffset, max: VirtualOffset) -> Self {
        Self { min, max }
    }
}

/// One inflated block and the number of compressed bytes it occupied.
#[derive(Debug)]
pub struct InflatedBlock {
    pub data: Vec<u8>,
    pub compressed_size: usize,
}

/// Inflates the block at the start of `data`.
///
/// Returns `Ok(None)` when `data` ends before the block does, which happens
/// at the tail of every range fetch that does not stop on a block boundary.
pub fn inflate_block(data: &[u8]) -> Result<Option<InflatedBlock>> {
    if data.len() < HEADER_SIZE {
        return Ok(None);
    }
    if data[0] != 31 || data[1] != 139 {
        return Err(Error::Format(format!(
            "bad gzip header bytes {:#x} {:#x}",
            data[0], data[1]
        )));
    }

    let xlen = LittleEndian::read_u16(&data[10..12]) as usize;
    let extra_end = HEADER_SIZE + xlen;
    if data.len() < extra_end {
        return Ok(None);
    }

    let block_size = block_size(&data[HEADER_SIZE..extra_end])?;
    if data.len() < block_size {
        return Ok(None);
    }
    if block_size < extra_end + TRAILER_SIZE {
        return Err(Error::Format(format!("BGZF block size {} too small", block_size)));
    }

    let cdata = &data[extra_end..block_size - TRAILER_SIZE];
    let isize = LittleEndian::read_u32(&data[block_size - 4..block_size]) as usize;
    if isize as u64 > MAX_BLOCK_SIZE {
        return Err(Error::Format(format!(
            "BGZF block declares {} inflated bytes, more than {}",
            isize, MAX_BLOCK_SIZE
        )));
    }

    let mut out = Vec::with_capacity(isize);
    DeflateDecoder::new(cdata)
        .read_to_end(&mut out)
        .map_err(|e| Error::Format(format!("inflate failed: {}", e)))?;

    if out.len() != isize {
        return Err(Error::Format(format!(
            "inflated {} bytes, block declares {}",
            out.len(),
            isize
        )));
    }

    Ok(Some(InflatedBlock {
        data: out,
        compressed_size: block_size,
    }))
}

/// Scans the extra field for the `BC` subfield holding BSIZE.
fn block_size(extra: &[u8]) -> Result<usize> {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let sub_len = LittleEndian::read_u16(&extra[pos + 2..pos + 4]) as usize;
        if extra[pos] == b'B' && extra[pos + 1] == b'C' && sub_len == 2 && pos + 6 <= extra.len() {
            return Ok(LittleEndian::read_u16(&extra[pos + 4..pos + 6]) as usize + 1);
        }
        pos += 4 + sub_len;
    }
    Err(Error::Format("gzip member lacks BGZF BC subfield".to_string()))
}

/// Inflated contents of consecutive blocks, with the position of each block.
#[derive(Debug, Default)]
pub struct Inflated {
    pub data: Vec<u8>,
    /// `(compressed offset, inflated offset)` of each block start.
    pub blocks: Vec<(u64, usize)>,
    /// Compressed bytes consumed by the inflated blocks.
    pub consumed: u64,
}

impl Inflated {
    /// Inflated position of a block starting at `compressed` bytes into the
    /// fetched range, if that block was inflated.
    pub fn block_start(&self, compressed: u64) -> Option<usize> {
        self.blocks
            .iter()
            .find(|(c, _)| *c == compressed)
            .map(|(_, u)| *u)
    }
}

/// Inflates every complete block that starts before `limit` compressed bytes.
///
/// Incomplete trailing blocks are left alone; callers that need them detect
/// the shortfall from the returned block positions.
pub fn decompress(data: &[u8], limit: u64) -> Result<Inflated> {
    let mut out = Inflated::default();
    let mut pos = 0usize;

    while (pos as u64) < limit && pos < data.len() {
        let Some(block) = inflate_block(&data[pos..])? else {
            break;
        };
        out.blocks.push((pos as u64, out.data.len()));
        out.data.extend_from_slice(&block.data);
        pos += block.compressed_size;
    }

    out.consumed = pos as u64;
    Ok(out)
}
