//! Range-fetchable byte sources.
//!
//! This module provides a trait-based abstraction over anything that can hand
//! back a byte range of a remote or local file, so the index and record
//! readers never care where the bytes live.
//!
//! # Implementations
//!
//! - [`MemorySource`] - In-memory buffer
//! - [`LocalSource`] - Local filesystem
//! - [`HttpSource`] - HTTP/HTTPS with `Range` requests (feature `http`)
//! - [`S3Source`] - S3 ranged `GetObject` (feature `s3`)
//!
//! # Example
//!
//! ```no_run
//! use htsfetch::storage::{open_source, ByteRange, SourceOptions};
//!
//! # async fn run() -> htsfetch::Result<()> {
//! let source = open_source("https://example.com/sample.bam", &SourceOptions::default()).await?;
//! let magic = source.fetch(ByteRange::new(0, 4)).await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "http")]
mod http;
mod local;
mod memory;
#[cfg(feature = "s3")]
mod s3;

#[cfg(feature = "http")]
pub use http::HttpSource;
pub use local::LocalSource;
pub use memory::MemorySource;
#[cfg(feature = "s3")]
pub use s3::S3Source;

use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Largest single fetch we are willing to issue.
pub const MAX_FETCH: u64 = 100_000_000;

/// Byte range within a file: an offset plus an optional length.
///
/// Without a length the range runs to the end of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, length: u64) -> Self {
        Self {
            start,
            length: Some(length),
        }
    }

    pub fn from_offset(start: u64) -> Self {
        Self {
            start,
            length: None,
        }
    }

    /// Exclusive end offset, if bounded.
    pub fn end(&self) -> Option<u64> {
        self.length.map(|len| self.start + len)
    }

    /// Value for an HTTP `Range` header (inclusive end).
    pub fn header_value(&self) -> String {
        match self.length {
            Some(len) => format!("bytes={}-{}", self.start, self.start + len.max(1) - 1),
            None => format!("bytes={}-", self.start),
        }
    }

    pub(crate) fn check_size(&self, name: &str) -> Result<()> {
        match self.length {
            Some(len) if len > MAX_FETCH => Err(Error::unavailable(
                name,
                format!("refusing to fetch {} bytes in one request", len),
            )),
            _ => Ok(()),
        }
    }
}

/// Transport tuning shared by the network sources.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Attempts before a fetch is reported as unavailable.
    pub max_attempts: u32,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

/// A file that can be read by byte range.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Name of the underlying resource (path or URL).
    fn name(&self) -> &str;

    /// Fetch a byte range. May return fewer bytes than asked for when the
    /// range runs past the end of the file.
    async fn fetch(&self, range: ByteRange) -> Result<Bytes>;

    /// A source for a sibling resource of the same kind, e.g. an index file
    /// next to a data file.
    fn with_name(&self, _name: &str) -> Option<Arc<dyn ByteSource>> {
        None
    }
}

/// Open a source for a path or URL.
pub async fn open_source(location: &str, options: &SourceOptions) -> Result<Arc<dyn ByteSource>> {
    if location.starts_with("http://") || location.starts_with("https://") {
        #[cfg(feature = "http")]
        return Ok(Arc::new(HttpSource::new(location, options.clone())?));
        #[cfg(not(feature = "http"))]
        return Err(Error::Internal(format!(
            "{} needs the `http` feature",
            location
        )));
    }

    if location.starts_with("s3://") {
        #[cfg(feature = "s3")]
        return Ok(Arc::new(S3Source::from_url(location).await?));
        #[cfg(not(feature = "s3"))]
        return Err(Error::Internal(format!("{} needs the `s3` feature", location)));
    }

    let _ = options;
    Ok(Arc::new(LocalSource::new(location)))
}

/// Name of the index sibling of a data file: `x.bam` becomes `x.bai`.
pub fn replaced_index_name(data_name: &str) -> Option<String> {
    data_name
        .strip_suffix(".bam")
        .map(|stem| format!("{}.bai", stem))
}
