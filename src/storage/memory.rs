use super::{ByteRange, ByteSource};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

/// A byte source backed by a buffer already in memory.
///
/// Sibling resources can be registered with [`MemorySource::with_sibling`]
/// so index-name fallbacks behave as they would against a server.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    data: Bytes,
    siblings: Arc<HashMap<String, Bytes>>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            siblings: Arc::new(HashMap::new()),
        }
    }

    pub fn with_sibling(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Arc::make_mut(&mut self.siblings).insert(name.into(), data.into());
        self
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, range: ByteRange) -> Result<Bytes> {
        range.check_size(&self.name)?;
        let len = self.data.len() as u64;
        if range.start > len {
            return Err(Error::unavailable(
                &self.name,
                format!("offset {} beyond end of {} bytes", range.start, len),
            ));
        }
        let end = range.end().unwrap_or(len).min(len);
        Ok(self.data.slice(range.start as usize..end as usize))
    }

    fn with_name(&self, name: &str) -> Option<Arc<dyn ByteSource>> {
        let data = self.siblings.get(name)?.clone();
        Some(Arc::new(MemorySource {
            name: name.to_string(),
            data,
            siblings: self.siblings.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_clips_to_end() {
        let source = MemorySource::new("mem", b"0123456789".to_vec());
        let bytes = source.fetch(ByteRange::new(8, 10)).await.unwrap();
        assert_eq!(&bytes[..], b"89");
        let bytes = source.fetch(ByteRange::from_offset(3)).await.unwrap();
        assert_eq!(bytes.len(), 7);
        assert!(source.fetch(ByteRange::new(11, 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_siblings() {
        let source = MemorySource::new("a.bam", b"data".to_vec()).with_sibling("a.bai", b"index".to_vec());
        let sibling = source.with_name("a.bai").unwrap();
        assert_eq!(&sibling.fetch(ByteRange::from_offset(0)).await.unwrap()[..], b"index");
        assert!(source.with_name("b.bai").is_none());
    }
}
