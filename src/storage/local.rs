use super::{ByteRange, ByteSource};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

pub struct LocalSource {
    name: String,
    path: PathBuf,
}

impl LocalSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            path,
        }
    }
}

#[async_trait]
impl ByteSource for LocalSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, range: ByteRange) -> Result<Bytes> {
        range.check_size(&self.name)?;

        let mut file = fs::File::open(&self.path)
            .await
            .map_err(|e| Error::unavailable(&self.name, e))?;
        file.seek(std::io::SeekFrom::Start(range.start)).await?;

        let mut buf = Vec::new();
        match range.length {
            Some(len) => {
                file.take(len).read_to_end(&mut buf).await?;
            }
            None => {
                file.read_to_end(&mut buf).await?;
            }
        }

        Ok(Bytes::from(buf))
    }

    fn with_name(&self, name: &str) -> Option<Arc<dyn ByteSource>> {
        let path = PathBuf::from(name);
        path.exists()
            .then(|| Arc::new(LocalSource::new(path)) as Arc<dyn ByteSource>)
    }
}
