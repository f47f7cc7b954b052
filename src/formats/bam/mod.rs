//! Indexed random access to BAM files.
//!
//! A [`BamFile`] holds the header and reference dictionary of one BAM file
//! together with a per-reference cache of its BAI sections. Queries resolve
//! a reference name, make sure that reference's index section is parsed,
//! and then fetch, inflate and decode the candidate chunks in ascending
//! offset order until a record lies past the query maximum.
//!
//! The index may be read whole when the file is opened, or described by an
//! [`IndexManifest`] so that each reference's section is fetched on its
//! first query.

mod header;
mod record;
mod tags;

pub use header::{BAM_MAGIC, BamHeader, ReferenceDictionary};
pub use record::{
    AlignmentRecord, Bounds, DecodeRequest, Flags, ScanOutcome, read_bam_records,
};
pub use tags::{TagArray, TagValue, Tags, parse_tags};

use crate::bgzf::{self, Chunk, MAX_BLOCK_SIZE};
use crate::formats::bai::{BaiIndex, IndexManifest, IndexSection, ReferenceIndex};
use crate::storage::{ByteRange, ByteSource, MAX_FETCH, replaced_index_name};
use crate::types::{ReadOptions, Region};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Bytes fetched for the header when the index gives no better estimate.
const INITIAL_HEADER_FETCH: u64 = 1 << 20;

/// Cached index state of one reference.
#[derive(Debug)]
struct ReferenceSlot {
    /// Byte range of the section in the index file, when loaded lazily.
    section: Option<IndexSection>,
    index: OnceCell<Option<Arc<ReferenceIndex>>>,
}

impl ReferenceSlot {
    fn loaded(index: Option<ReferenceIndex>) -> Self {
        Self {
            section: None,
            index: OnceCell::new_with(Some(index.map(Arc::new))),
        }
    }

    fn deferred(section: Option<IndexSection>) -> Self {
        Self {
            section,
            index: OnceCell::new(),
        }
    }
}

/// An open, indexed BAM file.
pub struct BamFile {
    data: Arc<dyn ByteSource>,
    index: Arc<dyn ByteSource>,
    header: BamHeader,
    references: Vec<ReferenceSlot>,
}

impl std::fmt::Debug for BamFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BamFile")
            .field("data", &self.data.name())
            .field("index", &self.index.name())
            .field("references", &self.header.references.len())
            .finish()
    }
}

impl BamFile {
    /// Opens a BAM file.
    ///
    /// `index` defaults to the data name with `.bai` appended. Without a
    /// manifest the whole index is fetched now; if it cannot be reached,
    /// the sibling named by replacing `.bam` with `.bai` is tried once.
    pub async fn open(
        data: Arc<dyn ByteSource>,
        index: Option<Arc<dyn ByteSource>>,
        manifest: Option<IndexManifest>,
    ) -> Result<Self> {
        data.fetch(ByteRange::new(0, 10)).await?;

        let index = index.or_else(|| data.with_name(&format!("{}.bai", data.name())));

        let (index, references, min_block_index) = match manifest {
            Some(manifest) => {
                let index = index.ok_or_else(|| {
                    Error::unavailable(data.name(), "no index source for manifest sections")
                })?;
                let slots = manifest
                    .chunks
                    .into_iter()
                    .map(ReferenceSlot::deferred)
                    .collect();
                (index, slots, manifest.min_block_index)
            }
            None => {
                let (index, bai) = load_index(data.as_ref(), index).await?;
                let slots = bai.references.into_iter().map(ReferenceSlot::loaded).collect();
                (index, slots, bai.min_block_index)
            }
        };

        let header = read_header(data.as_ref(), min_block_index).await?;
        tracing::info!(
            "opened {} with {} references (index {})",
            data.name(),
            header.references.len(),
            index.name()
        );

        Ok(Self {
            data,
            index,
            header,
            references,
        })
    }

    pub fn header(&self) -> &BamHeader {
        &self.header
    }

    pub fn references(&self) -> &ReferenceDictionary {
        &self.header.references
    }

    /// Records on `chr` overlapping the 0-based inclusive range `[min, max]`.
    ///
    /// An unknown reference or a reference without index data yields an
    /// empty result.
    pub async fn fetch(
        &self,
        chr: &str,
        min: i64,
        max: i64,
        options: ReadOptions,
    ) -> Result<Vec<AlignmentRecord>> {
        if min < 0 || max < min {
            return Err(Error::InvalidRange(format!(
                "{}:{}-{} is not a valid range",
                chr, min, max
            )));
        }

        let Some(reference_id) = self.header.references.lookup(chr) else {
            tracing::debug!("{} has no reference named {}", self.data.name(), chr);
            return Ok(Vec::new());
        };

        let chunks = self.chunks_for(reference_id, min, max).await?;
        let request = DecodeRequest {
            references: &self.header.references,
            bounds: Some(Bounds { min, max }),
            reference_id: Some(reference_id),
            options,
        };

        let mut records = Vec::new();
        for chunk in &chunks {
            if self.read_chunk(chunk, &mut records, &request).await? == ScanOutcome::PastMax {
                break;
            }
        }

        tracing::debug!(
            "{}:{}-{} read {} records from {} chunks",
            chr,
            min,
            max,
            records.len(),
            chunks.len()
        );
        Ok(records)
    }

    /// Same as [`fetch`](Self::fetch) for a parsed region.
    pub async fn fetch_region(
        &self,
        region: &Region,
        options: ReadOptions,
    ) -> Result<Vec<AlignmentRecord>> {
        let (min, max) = region.bounds()?;
        self.fetch(&region.reference_name, min, max, options).await
    }

    /// Chunks to scan for `[min, max]` on a reference id.
    pub async fn chunks_for(&self, reference_id: usize, min: i64, max: i64) -> Result<Vec<Chunk>> {
        match self.reference_index(reference_id).await? {
            Some(index) => index.blocks_for_range(min, max),
            None => Ok(Vec::new()),
        }
    }

    async fn reference_index(&self, reference_id: usize) -> Result<Option<Arc<ReferenceIndex>>> {
        let Some(slot) = self.references.get(reference_id) else {
            return Ok(None);
        };
        let index = slot
            .index
            .get_or_try_init(|| self.load_section(reference_id, slot.section))
            .await?;
        Ok(index.clone())
    }

    async fn load_section(
        &self,
        reference_id: usize,
        section: Option<IndexSection>,
    ) -> Result<Option<Arc<ReferenceIndex>>> {
        let Some(IndexSection(offset, length)) = section else {
            return Ok(None);
        };
        tracing::debug!(
            "loading index section {} of {} ({} bytes at {})",
            reference_id,
            self.index.name(),
            length,
            offset
        );

        let bytes = self.index.fetch(ByteRange::new(offset, length)).await?;
        if (bytes.len() as u64) < length {
            return Err(Error::CorruptIndex(format!(
                "section {} of {} is {} bytes, manifest says {}",
                reference_id,
                self.index.name(),
                bytes.len(),
                length
            )));
        }
        Ok(ReferenceIndex::parse(bytes)?.map(Arc::new))
    }

    /// Fetches, inflates and decodes one chunk.
    async fn read_chunk(
        &self,
        chunk: &Chunk,
        sink: &mut Vec<AlignmentRecord>,
        request: &DecodeRequest<'_>,
    ) -> Result<ScanOutcome> {
        if chunk.max < chunk.min {
            return Err(Error::CorruptIndex(format!(
                "chunk {} - {} ends before it starts",
                chunk.min, chunk.max
            )));
        }
        let start = chunk.min.block();
        let span = chunk.max.block() - start;
        tracing::debug!("fetching chunk {} - {}", chunk.min, chunk.max);

        let bytes = self
            .data
            .fetch(ByteRange::new(start, span + MAX_BLOCK_SIZE))
            .await?;
        let inflated = bgzf::decompress(&bytes, span + 1)?;

        let chunk_end = match inflated.block_start(span) {
            Some(last) => last + usize::from(chunk.max.within()),
            None if chunk.max.within() == 0 && inflated.consumed == span => inflated.data.len(),
            None => {
                return Err(Error::unavailable(
                    self.data.name(),
                    format!("chunk {} - {} ends past the fetched data", chunk.min, chunk.max),
                ));
            }
        };

        let outcome = read_bam_records(
            &inflated.data,
            usize::from(chunk.min.within()),
            sink,
            request,
        )?;
        if let ScanOutcome::NeedMoreData { offset } = outcome {
            if offset < chunk_end {
                return Err(Error::CorruptIndex(format!(
                    "record at {} crosses the end of chunk {} - {}",
                    offset, chunk.min, chunk.max
                )));
            }
        }
        Ok(outcome)
    }
}

/// Fetches and parses the whole index, falling back once to the `.bai`
/// sibling of the data file.
async fn load_index(
    data: &dyn ByteSource,
    index: Option<Arc<dyn ByteSource>>,
) -> Result<(Arc<dyn ByteSource>, BaiIndex)> {
    let primary = match index {
        Some(index) => match index.fetch(ByteRange::from_offset(0)).await {
            Ok(bytes) => return Ok((index, BaiIndex::parse(bytes)?)),
            Err(err @ Error::SourceUnavailable { .. }) => err,
            Err(err) => return Err(err),
        },
        None => Error::unavailable(data.name(), "no index source"),
    };

    let Some(fallback) = replaced_index_name(data.name()).and_then(|name| data.with_name(&name))
    else {
        return Err(primary);
    };
    tracing::warn!(
        "index unavailable ({}), trying {}",
        primary,
        fallback.name()
    );

    let bytes = fallback.fetch(ByteRange::from_offset(0)).await?;
    Ok((fallback, BaiIndex::parse(bytes)?))
}

/// Reads the header from the first `min_block_index` compressed bytes,
/// fetching more while it does not fit.
async fn read_header(data: &dyn ByteSource, min_block_index: u64) -> Result<BamHeader> {
    let mut length = min_block_index.clamp(MAX_BLOCK_SIZE, INITIAL_HEADER_FETCH);

    loop {
        let bytes = data.fetch(ByteRange::new(0, length)).await?;
        let inflated = bgzf::decompress(&bytes, length)?;
        if let Some(header) = BamHeader::parse(&inflated.data)? {
            return Ok(header);
        }

        if (bytes.len() as u64) < length || length >= MAX_FETCH {
            return Err(Error::Format(format!(
                "{} ends inside its header",
                data.name()
            )));
        }
        length = (length * 2).min(MAX_FETCH);
        tracing::debug!("header of {} needs more data, fetching {} bytes", data.name(), length);
    }
}
