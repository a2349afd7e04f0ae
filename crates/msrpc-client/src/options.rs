use std::time::Duration;

use msrpc_common::config::ClientSection;
use msrpc_common::{CompressType, Result, SerializerType};

/// Client-side call settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Retries after the first attempt; a call makes at most `retries + 1` attempts.
    pub retries: u32,
    pub connection_timeout: Duration,
    pub read_timeout: Duration,
    pub serialize_type: SerializerType,
    pub compress_type: CompressType,
    pub retry_backoff_ms: u64,
    pub retry_backoff_max_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            connection_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            serialize_type: SerializerType::MSGPACK,
            compress_type: CompressType::GZIP,
            retry_backoff_ms: 50,
            retry_backoff_max_ms: 1_000,
        }
    }
}

impl ClientOptions {
    /// # Errors
    ///
    /// Returns an error if the configured serializer or compressor name is unknown.
    pub fn from_config(section: &ClientSection) -> Result<Self> {
        Ok(Self {
            retries: section.retries,
            connection_timeout: Duration::from_millis(section.connection_timeout_ms),
            read_timeout: Duration::from_millis(section.read_timeout_ms),
            serialize_type: section.serialize_type()?,
            compress_type: section.compress_type()?,
            retry_backoff_ms: section.retry_backoff_ms,
            retry_backoff_max_ms: section.retry_backoff_max_ms,
        })
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_codec(mut self, serialize_type: SerializerType, compress_type: CompressType) -> Self {
        self.serialize_type = serialize_type;
        self.compress_type = compress_type;
        self
    }

    pub fn with_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.retry_backoff_ms = base_ms;
        self.retry_backoff_max_ms = max_ms;
        self
    }
}
