use std::time::Duration;

use msrpc_common::config::MsrpcConfig;
use msrpc_common::rate_limit::RateLimitConfig;
use msrpc_common::{CompressType, Result, SerializerType};
use msrpc_pool::PoolConfig;

/// Runtime settings for a [`TcpServer`](crate::TcpServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Host announced to the registry. Defaults to the bound IP.
    pub advertise_host: Option<String>,
    /// `None` admits every connection.
    pub rate_limit: Option<RateLimitConfig>,
    /// Longest a connection waits for a rate limiter token before it is
    /// answered with code 700.
    pub limiter_timeout: Duration,
    pub read_timeout: Duration,
    /// Codec for replies when the request's own codec is unknown.
    pub serialize_type: SerializerType,
    pub compress_type: CompressType,
    /// Run handlers on a bounded worker pool instead of tokio's blocking threads.
    pub worker_pool: Option<PoolConfig>,
}

impl ServerConfig {
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            advertise_host: None,
            rate_limit: None,
            limiter_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(5),
            serialize_type: SerializerType::default(),
            compress_type: CompressType::default(),
            worker_pool: None,
        }
    }

    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    pub fn with_limiter_timeout(mut self, timeout: Duration) -> Self {
        self.limiter_timeout = timeout;
        self
    }

    pub fn with_worker_pool(mut self, config: PoolConfig) -> Self {
        self.worker_pool = Some(config);
        self
    }

    /// Builds the server settings from a loaded configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured serializer or compressor name is unknown.
    pub fn from_config(config: &MsrpcConfig) -> Result<Self> {
        let server = &config.server;
        let worker_pool = server.use_worker_pool.then(|| {
            PoolConfig::new(
                config.pool.capacity,
                Duration::from_secs(config.pool.expire_secs),
            )
        });

        Ok(Self {
            bind_address: server.bind_address.clone(),
            advertise_host: server.advertise_host.clone(),
            rate_limit: config.rate_limit.to_config(),
            limiter_timeout: Duration::from_millis(server.limiter_timeout_ms),
            read_timeout: Duration::from_millis(server.read_timeout_ms),
            serialize_type: server.serialize_type()?,
            compress_type: server.compress_type()?,
            worker_pool,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(format!("0.0.0.0:{}", msrpc_common::config::DEFAULT_PORT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msrpc_common::config::parse_config;

    #[test]
    fn test_from_default_config() {
        let config = ServerConfig::from_config(&MsrpcConfig::default()).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:9222");
        assert!(config.rate_limit.is_none());
        assert!(config.worker_pool.is_none());
        assert_eq!(config.limiter_timeout, Duration::from_secs(1));
        assert_eq!(config.serialize_type, SerializerType::MSGPACK);
        assert_eq!(config.compress_type, CompressType::GZIP);
    }

    #[test]
    fn test_from_file_config() {
        let config = parse_config(
            r#"
            [server]
            bind_address = "127.0.0.1:7000"
            serializer = "json"
            compressor = "none"
            use_worker_pool = true

            [pool]
            capacity = 8

            [rate_limit]
            enabled = true
            requests_per_second = 10.0
            burst_size = 5
            "#,
        )
        .unwrap();

        let config = ServerConfig::from_config(&config).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:7000");
        assert_eq!(config.serialize_type, SerializerType::JSON);
        assert_eq!(config.compress_type, CompressType::NONE);
        assert_eq!(config.rate_limit, Some(RateLimitConfig::new(10.0, 5)));
        assert_eq!(config.worker_pool.map(|p| p.capacity), Some(8));
    }

    #[test]
    fn test_unknown_codec_name() {
        let mut config = MsrpcConfig::default();
        config.server.serializer = "xml".to_string();
        assert!(ServerConfig::from_config(&config).is_err());
    }
}
