//! HTTP/HTTPS byte source.
//!
//! Fetches use `Range` requests with a per-attempt timeout. Failed attempts
//! and responses of unexpected length are retried up to the configured
//! attempt budget; a short response is accepted once the same short length
//! has been seen twice, which is how a range running past end-of-file looks.

use super::{ByteRange, ByteSource, SourceOptions};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::sync::Arc;
use url::Url;

pub struct HttpSource {
    client: Client,
    url: Url,
    name: String,
    options: SourceOptions,
}

enum Attempt {
    Done(Bytes),
    Truncated(Bytes),
    Failed(String),
}

impl HttpSource {
    pub fn new(url: &str, options: SourceOptions) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::unavailable(url, format!("bad URL: {}", e)))?;
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            name: url.to_string(),
            url,
            options,
        })
    }

    async fn attempt(&self, range: &ByteRange, truncated_length: Option<usize>) -> Attempt {
        let mut request = self.client.get(self.url.clone());
        if range.start > 0 || range.length.is_some() {
            request = request.header(reqwest::header::RANGE, range.header_value());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Failed(format!("HTTP GET request failed: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            return Attempt::Failed(format!("HTTP status {}", status));
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Attempt::Failed(format!("failed to read HTTP response: {}", e)),
        };

        classify(range.length, bytes, truncated_length)
    }
}

/// Accepts a response of the requested length, or a short one whose length
/// matches the previous short response.
fn classify(requested: Option<u64>, bytes: Bytes, truncated_length: Option<usize>) -> Attempt {
    match requested {
        Some(len) if len as usize != bytes.len() && truncated_length != Some(bytes.len()) => {
            Attempt::Truncated(bytes)
        }
        _ => Attempt::Done(bytes),
    }
}

#[async_trait]
impl ByteSource for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, range: ByteRange) -> Result<Bytes> {
        range.check_size(&self.name)?;

        let mut truncated_length = None;
        let mut last_error = String::from("no attempts made");

        for attempt in 1..=self.options.max_attempts {
            match self.attempt(&range, truncated_length).await {
                Attempt::Done(bytes) => return Ok(bytes),
                Attempt::Truncated(bytes) => {
                    tracing::debug!(
                        "short read from {} (attempt {}): got {} bytes for {}",
                        self.name,
                        attempt,
                        bytes.len(),
                        range.header_value()
                    );
                    truncated_length = Some(bytes.len());
                    last_error = format!("expected {:?} bytes, got {}", range.length, bytes.len());
                }
                Attempt::Failed(reason) => {
                    tracing::warn!("fetch of {} failed (attempt {}): {}", self.name, attempt, reason);
                    truncated_length = None;
                    last_error = reason;
                }
            }
        }

        Err(Error::unavailable(&self.name, last_error))
    }

    fn with_name(&self, name: &str) -> Option<Arc<dyn ByteSource>> {
        let url = self.url.join(name).ok()?;
        HttpSource::new(url.as_str(), self.options.clone())
            .ok()
            .map(|s| Arc::new(s) as Arc<dyn ByteSource>)
    }
}
