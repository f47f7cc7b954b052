//! Packed 2bit reference sequences.
//!
//! ```text
//! 2bit file:
//! - magic (uint32): 0x1A412743, read in the file's byte order
//! - version (uint32): 0 (32-bit offsets) or 1 (64-bit offsets)
//! - sequence count (uint32), reserved (uint32)
//! - per sequence: name length (uint8), name, record offset (uint32 / uint64)
//!
//! sequence record:
//! - DNA length (uint32)
//! - N-block count, starts[], sizes[]
//! - mask-block count, starts[], sizes[]
//! - reserved (uint32)
//! - packed bases, 4 per byte, most significant bits first
//! ```

use crate::spans::{Compound, Range, Ranges, intersection};
use crate::storage::{ByteRange, ByteSource, MAX_FETCH};
use crate::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub const TWOBIT_MAGIC: u32 = 0x1A41_2743;
const TWOBIT_MAGIC_SWAPPED: u32 = 0x4327_411A;

const HEADER_BLOCK_SIZE: u64 = 12_500;
const TWOBIT_TABLE: [char; 4] = ['T', 'C', 'A', 'G'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u32(self, buf: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }

    fn u64(self, buf: &[u8]) -> u64 {
        match self {
            Endian::Little => LittleEndian::read_u64(buf),
            Endian::Big => BigEndian::read_u64(buf),
        }
    }
}

/// Layout of one sequence record, read on first use.
#[derive(Debug, Clone)]
struct SequenceRecord {
    length: u32,
    n_blocks: Compound,
    mask_blocks: u32,
    /// Absolute offset of the packed bases.
    packed_offset: u64,
}

/// A named sequence in a 2bit file.
#[derive(Debug)]
pub struct TwoBitSequence {
    offset: u64,
    record: OnceCell<SequenceRecord>,
}

/// An open 2bit file.
pub struct TwoBitFile {
    source: Arc<dyn ByteSource>,
    endian: Endian,
    version: u32,
    sequences: HashMap<String, TwoBitSequence>,
}

impl std::fmt::Debug for TwoBitFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoBitFile")
            .field("source", &self.source.name())
            .field("version", &self.version)
            .field("sequences", &self.sequences.len())
            .finish()
    }
}

impl TwoBitFile {
    /// Reads the header and sequence table.
    pub async fn open(source: Arc<dyn ByteSource>) -> Result<Self> {
        let mut buf = source
            .fetch(ByteRange::new(0, HEADER_BLOCK_SIZE))
            .await?
            .to_vec();
        if buf.len() < 16 {
            return Err(Error::Format(format!(
                "{} is too short for a 2bit header",
                source.name()
            )));
        }

        let endian = match LittleEndian::read_u32(&buf[0..4]) {
            TWOBIT_MAGIC => Endian::Little,
            TWOBIT_MAGIC_SWAPPED => Endian::Big,
            found => {
                return Err(Error::BadMagic {
                    what: "2bit",
                    expected: TWOBIT_MAGIC,
                    found,
                });
            }
        };

        let version = endian.u32(&buf[4..8]);
        if version > 1 {
            return Err(Error::UnsupportedVersion {
                what: "2bit",
                version,
            });
        }
        let offset_width = if version == 0 { 4 } else { 8 };
        let count = endian.u32(&buf[8..12]) as usize;

        let mut sequences = HashMap::new();
        let mut parsed = 0usize;
        let mut p = 16;
        while parsed < count {
            let fits = buf
                .get(p)
                .is_some_and(|&ns| p + 1 + usize::from(ns) + offset_width <= buf.len());
            if !fits {
                // Size the next fetch from the average entry size so far.
                let estimate = (buf.len() as u64 * count as u64 / parsed.max(1) as u64)
                    .clamp(HEADER_BLOCK_SIZE, MAX_FETCH);
                let more = source
                    .fetch(ByteRange::new(buf.len() as u64, estimate))
                    .await?;
                if more.is_empty() {
                    return Err(Error::Format(format!(
                        "{} ends inside its sequence table",
                        source.name()
                    )));
                }
                tracing::debug!("2bit sequence table needs {} more bytes", more.len());
                buf.extend_from_slice(&more);
                continue;
            }

            let ns = usize::from(buf[p]);
            let name = String::from_utf8_lossy(&buf[p + 1..p + 1 + ns]).into_owned();
            p += 1 + ns;
            let offset = if version == 0 {
                u64::from(endian.u32(&buf[p..p + 4]))
            } else {
                endian.u64(&buf[p..p + 8])
            };
            p += offset_width;
            parsed += 1;

            sequences.insert(
                name,
                TwoBitSequence {
                    offset,
                    record: OnceCell::new(),
                },
            );
        }

        tracing::info!(
            "opened 2bit {} with {} sequences (version {})",
            source.name(),
            sequences.len(),
            version
        );
        Ok(Self {
            source,
            endian,
            version,
            sequences,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sequences.keys().map(String::as_str)
    }

    /// Looks a sequence up by name, then with a `chr` prefix.
    pub fn sequence(&self, name: &str) -> Option<&TwoBitSequence> {
        self.sequences
            .get(name)
            .or_else(|| self.sequences.get(&format!("chr{}", name)))
    }

    /// Number of bases in a sequence.
    pub async fn length(&self, name: &str) -> Result<Option<u32>> {
        let Some(seq) = self.sequence(name) else {
            return Ok(None);
        };
        Ok(Some(self.record(seq).await?.length))
    }

    /// Number of soft-masked blocks in a sequence.
    pub async fn mask_block_count(&self, name: &str) -> Result<Option<u32>> {
        let Some(seq) = self.sequence(name) else {
            return Ok(None);
        };
        Ok(Some(self.record(seq).await?.mask_blocks))
    }

    /// Bases `min..=max` (1-based) of a sequence, with N-blocks as `N`.
    pub async fn fetch(&self, name: &str, min: i64, max: i64) -> Result<Option<String>> {
        let Some(seq) = self.sequence(name) else {
            return Ok(None);
        };
        if max < min {
            return Ok(Some(String::new()));
        }

        let record = self.record(seq).await?;
        if min < 1 || max > i64::from(record.length) {
            return Err(Error::InvalidRange(format!(
                "{}:{}-{} outside sequence of length {}",
                name, min, max, record.length
            )));
        }

        let (min, max) = (min - 1, max - 1);
        let fetch_min = (min >> 2) as u64;
        let fetch_max = (max >> 2) as u64 + 1;
        let packed = self
            .source
            .fetch(ByteRange::new(
                record.packed_offset + fetch_min,
                fetch_max - fetch_min,
            ))
            .await?;
        if (packed.len() as u64) < fetch_max - fetch_min {
            return Err(Error::Format(format!(
                "{} ends inside the bases of {}",
                self.source.name(),
                name
            )));
        }

        let base = |pos: i64| {
            let byte = packed[((pos >> 2) as u64 - fetch_min) as usize];
            let shift = 6 - 2 * (pos & 0x3);
            TWOBIT_TABLE[usize::from((byte >> shift) & 0x3)]
        };

        let query = Range::new(min, max)?;
        let n_spans = match intersection(&query, &record.n_blocks) {
            Some(spans) => spans.ranges().to_vec(),
            None => Vec::new(),
        };

        let mut seq = String::with_capacity((max - min + 1) as usize);
        let mut ptr = min;
        for span in &n_spans {
            seq.extend((ptr..span.min()).map(&base));
            seq.extend(std::iter::repeat_n('N', (span.max() - span.min() + 1) as usize));
            ptr = span.max() + 1;
        }
        seq.extend((ptr..=max).map(&base));

        Ok(Some(seq))
    }

    async fn record<'a>(&self, seq: &'a TwoBitSequence) -> Result<&'a SequenceRecord> {
        seq.record
            .get_or_try_init(|| self.read_record(seq.offset))
            .await
    }

    async fn read_record(&self, offset: u64) -> Result<SequenceRecord> {
        let head = self.fetch_exact(offset, 8).await?;
        let length = self.endian.u32(&head[0..4]);
        let n_count = self.endian.u32(&head[4..8]) as u64;

        let blocks = self.fetch_exact(offset + 8, n_count * 8 + 4).await?;
        let mut n_blocks = Compound::default();
        for b in 0..n_count as usize {
            let start = i64::from(self.endian.u32(&blocks[b * 4..]));
            let size = i64::from(self.endian.u32(&blocks[(b + n_count as usize) * 4..]));
            if size > 0 {
                n_blocks.insert_range(Range::new(start, start + size - 1)?);
            }
        }
        let mask_pos = n_count as usize * 8;
        let mask_blocks = self.endian.u32(&blocks[mask_pos..mask_pos + 4]);

        Ok(SequenceRecord {
            length,
            n_blocks,
            mask_blocks,
            packed_offset: offset + 16 + (n_count + u64::from(mask_blocks)) * 8,
        })
    }

    async fn fetch_exact(&self, offset: u64, length: u64) -> Result<bytes::Bytes> {
        let bytes = self.source.fetch(ByteRange::new(offset, length)).await?;
        if (bytes.len() as u64) < length {
            return Err(Error::Format(format!(
                "{} ends inside the sequence record at {}",
                self.source.name(),
                offset
            )));
        }
        Ok(bytes)
    }
}
