//! S3 byte source.
//!
//! Reads objects with ranged `GetObject` calls. Credentials and region come
//! from the standard AWS environment; a custom endpoint (MinIO, LocalStack)
//! can be supplied through [`S3Source::new`].

use super::{ByteRange, ByteSource};
use crate::{Error, Result};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::sync::Arc;

pub struct S3Source {
    client: Client,
    bucket: String,
    key: String,
    name: String,
}

impl S3Source {
    /// Create a source for one object.
    ///
    /// # Arguments
    ///
    /// * `bucket` - S3 bucket name
    /// * `key` - Object key
    /// * `region` - Optional AWS region (uses SDK defaults if not specified)
    /// * `endpoint` - Optional custom endpoint URL (for S3-compatible services)
    pub async fn new(
        bucket: String,
        key: String,
        region: Option<String>,
        endpoint: Option<String>,
    ) -> Result<Self> {
        let mut config_loader = aws_config::from_env();

        if let Some(region) = region {
            config_loader = config_loader.region(aws_config::Region::new(region));
        }

        let sdk_config = config_loader.load().await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = endpoint {
            s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self::with_client(Client::from_conf(s3_config.build()), bucket, key))
    }

    /// Create a source from an `s3://bucket/key` URL.
    pub async fn from_url(url: &str) -> Result<Self> {
        let (bucket, key) = parse_s3_url(url)?;
        Self::new(bucket, key, None, None).await
    }

    fn with_client(client: Client, bucket: String, key: String) -> Self {
        Self {
            name: format!("s3://{}/{}", bucket, key),
            client,
            bucket,
            key,
        }
    }
}

fn parse_s3_url(url: &str) -> Result<(String, String)> {
    let rest = url
        .strip_prefix("s3://")
        .ok_or_else(|| Error::unavailable(url, "not an s3:// URL"))?;
    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((bucket.to_string(), key.to_string()))
        }
        _ => Err(Error::unavailable(url, "expected s3://bucket/key")),
    }
}

#[async_trait]
impl ByteSource for S3Source {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, range: ByteRange) -> Result<Bytes> {
        range.check_size(&self.name)?;

        let mut request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key);

        if range.start > 0 || range.length.is_some() {
            request = request.range(range.header_value());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::unavailable(&self.name, format!("S3 get_object failed: {}", e)))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| Error::unavailable(&self.name, format!("S3 read failed: {}", e)))?;

        Ok(body.into_bytes())
    }

    fn with_name(&self, name: &str) -> Option<Arc<dyn ByteSource>> {
        let (bucket, key) = match parse_s3_url(name) {
            Ok(parts) => parts,
            Err(_) => (self.bucket.clone(), name.to_string()),
        };
        Some(Arc::new(Self::with_client(self.client.clone(), bucket, key)))
    }
}
