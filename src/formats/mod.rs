//! File format readers.
//!
//! - [`bam`] - indexed BAM retrieval ([`BamFile`])
//! - [`bai`] - BAI index parsing and chunk queries
//! - [`twobit`] - packed 2bit reference sequences ([`TwoBitFile`])

pub mod bai;
pub mod bam;
pub mod twobit;

pub use bai::{BaiIndex, IndexManifest, IndexSection, ReferenceIndex};
pub use bam::{AlignmentRecord, BamFile, Flags, TagArray, TagValue};
pub use twobit::TwoBitFile;
