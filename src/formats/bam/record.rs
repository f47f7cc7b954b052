//! BAM record decoding.
//!
//! ```text
//! BAM Record (binary, little-endian):
//! - block_size (int32): Total record size in bytes (excluding this field)
//! - refID (int32): Reference sequence ID (-1 for unmapped)
//! - pos (int32): 0-based leftmost position (-1 for unmapped)
//! - l_read_name (uint8), mapq (uint8), bin (uint16)
//! - n_cigar_op (uint16), flag (uint16)
//! - l_seq (int32): Sequence length
//! - next_refID (int32), next_pos (int32), tlen (int32)
//! - read_name (char[l_read_name]): NUL-terminated read name
//! - cigar (uint32[n_cigar_op]): op_len << 4 | op
//! - seq (uint8[(l_seq+1)/2]): 4-bit encoded sequence
//! - qual (char[l_seq]): Phred quality scores
//! - tags: until the end of the record
//! ```

use super::header::ReferenceDictionary;
use super::tags::{Tags, parse_tags};
use crate::types::ReadOptions;
use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

const FIXED_SIZE: usize = 32;

const SEQ_DECODER: &[u8; 16] = b"=ACxGxxxTxxxxxxN";
const CIGAR_DECODER: &[u8; 16] = b"MIDNSHP=X???????";

/// Bitwise record flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Flags(pub u16);

impl Flags {
    pub const MULTIPLE_SEGMENTS: u16 = 0x1;
    pub const ALL_SEGMENTS_ALIGN: u16 = 0x2;
    pub const SEGMENT_UNMAPPED: u16 = 0x4;
    pub const NEXT_SEGMENT_UNMAPPED: u16 = 0x8;
    pub const REVERSE_COMPLEMENT: u16 = 0x10;
    pub const NEXT_REVERSE_COMPLEMENT: u16 = 0x20;
    pub const FIRST_SEGMENT: u16 = 0x40;
    pub const LAST_SEGMENT: u16 = 0x80;
    pub const SECONDARY_ALIGNMENT: u16 = 0x100;
    pub const QC_FAIL: u16 = 0x200;
    pub const DUPLICATE: u16 = 0x400;
    pub const SUPPLEMENTARY: u16 = 0x800;

    pub fn contains(&self, bits: u16) -> bool {
        self.0 & bits == bits
    }

    pub fn is_paired(&self) -> bool {
        self.contains(Self::MULTIPLE_SEGMENTS)
    }

    pub fn is_unmapped(&self) -> bool {
        self.contains(Self::SEGMENT_UNMAPPED)
    }

    pub fn is_reverse_complemented(&self) -> bool {
        self.contains(Self::REVERSE_COMPLEMENT)
    }

    pub fn is_mate_reverse_complemented(&self) -> bool {
        self.contains(Self::NEXT_REVERSE_COMPLEMENT)
    }

    pub fn is_secondary(&self) -> bool {
        self.contains(Self::SECONDARY_ALIGNMENT)
    }

    pub fn is_qc_fail(&self) -> bool {
        self.contains(Self::QC_FAIL)
    }

    pub fn is_duplicate(&self) -> bool {
        self.contains(Self::DUPLICATE)
    }

    pub fn is_supplementary(&self) -> bool {
        self.contains(Self::SUPPLEMENTARY)
    }
}

/// One decoded alignment.
///
/// Light decoding fills only the reference, position, mapping quality,
/// flags and sequence length (plus the read name when asked for).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AlignmentRecord {
    pub segment: Option<String>,
    pub pos: i32,
    pub mq: u8,
    pub flags: Flags,
    pub seq_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_segment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_pos: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cigar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quals: Option<String>,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

/// Inclusive coordinate bounds a record must overlap to be kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: i64,
    pub max: i64,
}

/// What a scan of one buffer asks of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The next record at `offset` does not fit in the buffer.
    NeedMoreData { offset: usize },
    /// A record started past the query maximum; later data cannot match.
    PastMax,
}

/// Where a record's reference sits relative to the one being queried.
/// Unmapped records sort after every reference.
#[derive(Clone, Copy)]
enum ReferenceOrder {
    Before,
    Target,
    After,
}

/// Parameters of one buffer scan.
#[derive(Debug, Clone, Copy)]
pub struct DecodeRequest<'a> {
    pub references: &'a ReferenceDictionary,
    /// Records must overlap these bounds; `None` keeps everything.
    pub bounds: Option<Bounds>,
    /// Only keep records on this reference; `None` keeps every reference.
    pub reference_id: Option<usize>,
    pub options: ReadOptions,
}

/// Decodes records from `data` starting at `offset`, pushing matches into
/// `sink` until the buffer runs out or a record lies past the bounds.
pub fn read_bam_records(
    data: &[u8],
    mut offset: usize,
    sink: &mut Vec<AlignmentRecord>,
    request: &DecodeRequest<'_>,
) -> Result<ScanOutcome> {
    loop {
        let Some(size_bytes) = data.get(offset..offset + 4) else {
            return Ok(ScanOutcome::NeedMoreData { offset });
        };
        let block_size = LittleEndian::read_i32(size_bytes);
        let block_size = usize::try_from(block_size)
            .ok()
            .filter(|&s| s >= FIXED_SIZE)
            .ok_or_else(|| Error::Format(format!("bad record size {} at byte {}", block_size, offset)))?;

        let block_end = offset + 4 + block_size;
        if block_end > data.len() {
            return Ok(ScanOutcome::NeedMoreData { offset });
        }

        let block = &data[offset + 4..block_end];
        let (record, ref_id) = decode_record(block, request)?;

        let reference = match (request.reference_id, ref_id) {
            (None, _) => ReferenceOrder::Target,
            (Some(target), Some(id)) if id == target => ReferenceOrder::Target,
            (Some(target), Some(id)) if id < target => ReferenceOrder::Before,
            _ => ReferenceOrder::After,
        };

        match (request.bounds, reference) {
            (None, ReferenceOrder::Target) => sink.push(record),
            (None, _) => {}
            (Some(_), ReferenceOrder::Before) => {}
            (Some(_), ReferenceOrder::After) => return Ok(ScanOutcome::PastMax),
            (Some(bounds), ReferenceOrder::Target) => {
                let pos = i64::from(record.pos);
                if pos > bounds.max {
                    return Ok(ScanOutcome::PastMax);
                }
                if pos + record.seq_length as i64 >= bounds.min {
                    sink.push(record);
                }
            }
        }

        offset = block_end;
    }
}

fn reference_id(raw: i32, field: &str) -> Result<Option<usize>> {
    match raw {
        -1 => Ok(None),
        n if n >= 0 => Ok(Some(n as usize)),
        n => Err(Error::Format(format!("invalid {} reference id {}", field, n))),
    }
}

/// Decodes one record body (everything after `block_size`).
fn decode_record(block: &[u8], request: &DecodeRequest<'_>) -> Result<(AlignmentRecord, Option<usize>)> {
    let ref_id = reference_id(LittleEndian::read_i32(&block[0..4]), "read")?;
    let pos = LittleEndian::read_i32(&block[4..8]);
    let bin_mq_nl = LittleEndian::read_u32(&block[8..12]);
    let mq = ((bin_mq_nl & 0xff00) >> 8) as u8;
    let name_len = (bin_mq_nl & 0xff) as usize;
    let flag_nc = LittleEndian::read_u32(&block[12..16]);
    let flags = Flags((flag_nc >> 16) as u16);
    let n_cigar = (flag_nc & 0xffff) as usize;
    let l_seq = LittleEndian::read_i32(&block[16..20]);
    let l_seq = usize::try_from(l_seq)
        .map_err(|_| Error::Format(format!("negative sequence length {}", l_seq)))?;
    let next_ref = reference_id(LittleEndian::read_i32(&block[20..24]), "mate")?;
    let next_pos = LittleEndian::read_i32(&block[24..28]);

    let names = request.references;
    let mut record = AlignmentRecord {
        segment: ref_id.and_then(|id| names.name(id)).map(str::to_string),
        pos,
        mq,
        flags,
        seq_length: l_seq,
        ..Default::default()
    };

    let options = request.options;
    if options.light && !options.include_name {
        return Ok((record, ref_id));
    }

    let mut p = FIXED_SIZE;
    let name_end = p + name_len;
    let name = block
        .get(p..name_end)
        .ok_or_else(|| Error::Format("read name runs past record end".to_string()))?;
    record.read_name = Some(String::from_utf8_lossy(name.strip_suffix(&[0]).unwrap_or(name)).into_owned());
    p = name_end;

    if options.light {
        return Ok((record, ref_id));
    }

    if let Some(id) = next_ref {
        record.next_segment = names.name(id).map(str::to_string);
        record.next_pos = Some(next_pos);
    }

    let seq_bytes = l_seq.div_ceil(2);
    let needed = n_cigar * 4 + seq_bytes + l_seq;
    if p + needed > block.len() {
        return Err(Error::Format(format!(
            "record declares {} bytes of cigar/sequence/quality, only {} remain",
            needed,
            block.len() - p
        )));
    }

    let mut cigar = String::new();
    for chunk in block[p..p + n_cigar * 4].chunks_exact(4) {
        let op = LittleEndian::read_u32(chunk);
        cigar.push_str(&(op >> 4).to_string());
        cigar.push(char::from(CIGAR_DECODER[(op & 0xf) as usize]));
    }
    p += n_cigar * 4;
    record.cigar = Some(cigar);

    let mut seq = String::with_capacity(l_seq);
    for &b in &block[p..p + seq_bytes] {
        seq.push(char::from(SEQ_DECODER[(b >> 4) as usize]));
        if seq.len() < l_seq {
            seq.push(char::from(SEQ_DECODER[(b & 0x0f) as usize]));
        }
    }
    p += seq_bytes;
    record.seq = Some(seq);

    record.quals = Some(
        block[p..p + l_seq]
            .iter()
            .map(|&q| char::from(q.saturating_add(33)))
            .collect(),
    );
    p += l_seq;

    record.tags = parse_tags(&block[p..])?;

    Ok((record, ref_id))
}
