//! TOML configuration.
//!
//! Every field has a default, so an empty or partial file is valid:
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0:9222"
//! serializer = "msgpack"
//! compressor = "gzip"
//!
//! [client]
//! retries = 3
//!
//! [pool]
//! capacity = 64
//! expire_secs = 3
//!
//! [rate_limit]
//! enabled = true
//! requests_per_second = 100.0
//! burst_size = 200
//!
//! [breaker]
//! enabled = true
//! failure_threshold = 5
//! ```
//!
//! Loading is split into parsing (serde) and semantic checks
//! ([`validate_config`]).

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::error::{MsrpcError, Result};
use crate::protocol::header::{CompressType, SerializerType};
use crate::rate_limit::RateLimitConfig;
use crate::registry::RegistryOptions;

/// Path used when no `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = "conf/app.toml";

/// Default port servers bind to.
pub const DEFAULT_PORT: u16 = 9222;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MsrpcConfig {
    pub server: ServerSection,
    pub client: ClientSection,
    pub pool: PoolSection,
    pub rate_limit: RateLimitSection,
    pub breaker: BreakerSection,
    pub registry: RegistryOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind_address: String,
    /// Host announced to the registry; defaults to the bound IP.
    pub advertise_host: Option<String>,
    pub read_timeout_ms: u64,
    /// Longest a connection may wait for a rate limiter token.
    pub limiter_timeout_ms: u64,
    /// Codec used for replies to frames that could not be decoded.
    pub serializer: String,
    pub compressor: String,
    /// Run handlers on the worker pool instead of tokio's blocking threads.
    pub use_worker_pool: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{}", DEFAULT_PORT),
            advertise_host: None,
            read_timeout_ms: 5_000,
            limiter_timeout_ms: 1_000,
            serializer: "msgpack".to_string(),
            compressor: "gzip".to_string(),
            use_worker_pool: false,
        }
    }
}

impl ServerSection {
    pub fn serialize_type(&self) -> Result<SerializerType> {
        parse_serializer(&self.serializer)
    }

    pub fn compress_type(&self) -> Result<CompressType> {
        parse_compressor(&self.compressor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub retries: u32,
    pub connection_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub serializer: String,
    pub compressor: String,
    pub retry_backoff_ms: u64,
    pub retry_backoff_max_ms: u64,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            retries: 3,
            connection_timeout_ms: 5_000,
            read_timeout_ms: 5_000,
            serializer: "msgpack".to_string(),
            compressor: "gzip".to_string(),
            retry_backoff_ms: 50,
            retry_backoff_max_ms: 1_000,
        }
    }
}

impl ClientSection {
    pub fn serialize_type(&self) -> Result<SerializerType> {
        parse_serializer(&self.serializer)
    }

    pub fn compress_type(&self) -> Result<CompressType> {
        parse_compressor(&self.compressor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    pub capacity: usize,
    pub expire_secs: u64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            capacity: 64,
            expire_secs: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub enabled: bool,
    pub requests_per_second: f64,
    pub burst_size: u32,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 100.0,
            burst_size: 200,
        }
    }
}

impl RateLimitSection {
    /// The limiter configuration, or `None` when limiting is off.
    pub fn to_config(&self) -> Option<RateLimitConfig> {
        self.enabled
            .then(|| RateLimitConfig::new(self.requests_per_second, self.burst_size))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    pub enabled: bool,
    pub max_requests: u32,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    /// Trip after more than this many consecutive failures.
    pub failure_threshold: u32,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            enabled: false,
            max_requests: 1,
            interval_ms: 0,
            timeout_ms: 20_000,
            failure_threshold: 5,
        }
    }
}

impl BreakerSection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn parse_serializer(name: &str) -> Result<SerializerType> {
    SerializerType::from_name(name)
        .ok_or_else(|| MsrpcError::Config(format!("unknown serializer '{}'", name)))
}

fn parse_compressor(name: &str) -> Result<CompressType> {
    CompressType::from_name(name)
        .ok_or_else(|| MsrpcError::Config(format!("unknown compressor '{}'", name)))
}

/// Parses a TOML document and validates it.
pub fn parse_config(content: &str) -> Result<MsrpcConfig> {
    let config: MsrpcConfig = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Loads and validates configuration from a TOML file.
///
/// # Errors
///
/// Returns `MsrpcError::Config` if the file cannot be read, is not valid
/// TOML, or fails validation.
pub fn load_config(path: &Path) -> Result<MsrpcConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| MsrpcError::Config(format!("{}: {}", path.display(), e)))?;
    parse_config(&content)
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_config_or_default(path: &Path) -> Result<MsrpcConfig> {
    if !path.exists() {
        tracing::info!("{} not found, using default configuration", path.display());
        return Ok(MsrpcConfig::default());
    }
    load_config(path)
}

/// Semantic checks serde cannot express.
pub fn validate_config(config: &MsrpcConfig) -> Result<()> {
    let mut problems = Vec::new();

    if config.pool.capacity == 0 {
        problems.push("pool.capacity must be greater than 0".to_string());
    }
    if config.pool.expire_secs == 0 {
        problems.push("pool.expire_secs must be greater than 0".to_string());
    }
    if config.rate_limit.enabled
        && !(config.rate_limit.requests_per_second.is_finite()
            && config.rate_limit.requests_per_second > 0.0)
    {
        problems.push("rate_limit.requests_per_second must be a positive number".to_string());
    }
    if config.rate_limit.enabled && config.rate_limit.burst_size == 0 {
        problems.push("rate_limit.burst_size must be greater than 0".to_string());
    }
    for (field, millis) in [
        ("client.connection_timeout_ms", config.client.connection_timeout_ms),
        ("client.read_timeout_ms", config.client.read_timeout_ms),
        ("server.read_timeout_ms", config.server.read_timeout_ms),
    ] {
        if millis == 0 {
            problems.push(format!("{} must be greater than 0", field));
        }
    }
    for (field, result) in [
        ("server.serializer", config.server.serialize_type().err()),
        ("client.serializer", config.client.serialize_type().err()),
    ] {
        if let Some(e) = result {
            problems.push(format!("{}: {}", field, e));
        }
    }
    for (field, result) in [
        ("server.compressor", config.server.compress_type().err()),
        ("client.compressor", config.client.compress_type().err()),
    ] {
        if let Some(e) = result {
            problems.push(format!("{}: {}", field, e));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(MsrpcError::Config(problems.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, MsrpcConfig::default());
        assert_eq!(config.server.bind_address, "0.0.0.0:9222");
        assert_eq!(config.client.retries, 3);
        assert_eq!(config.pool.expire_secs, 3);
        assert_eq!(config.breaker.timeout(), Duration::from_secs(20));
        assert!(config.rate_limit.to_config().is_none());
    }

    #[test]
    fn test_partial_document() {
        let config = parse_config(
            r#"
            [client]
            retries = 5
            serializer = "json"

            [pool]
            capacity = 8

            [rate_limit]
            enabled = true
            requests_per_second = 10.0
            burst_size = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.client.retries, 5);
        assert_eq!(config.client.serialize_type().unwrap(), SerializerType::JSON);
        assert_eq!(config.client.compress_type().unwrap(), CompressType::GZIP);
        assert_eq!(config.pool.capacity, 8);
        assert_eq!(config.rate_limit.to_config(), Some(RateLimitConfig::new(10.0, 1)));
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let err = parse_config(
            r#"
            [pool]
            capacity = 0
            expire_secs = 0

            [server]
            serializer = "gob"
            "#,
        )
        .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("pool.capacity"));
        assert!(msg.contains("pool.expire_secs"));
        assert!(msg.contains("unknown serializer 'gob'"));
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        let err = parse_config(
            r#"
            [client]
            read_timeout_ms = 0

            [server]
            read_timeout_ms = 0
            "#,
        )
        .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("client.read_timeout_ms must be greater than 0"));
        assert!(msg.contains("server.read_timeout_ms must be greater than 0"));
        assert!(!msg.contains("connection_timeout_ms"));

        let err = parse_config("[client]\nconnection_timeout_ms = 0\n").unwrap_err();
        assert!(err.to_string().contains("client.connection_timeout_ms"));
    }

    #[test]
    fn test_pool_capacity_has_no_short_key() {
        let config = parse_config("[pool]\nc = 8\n").unwrap();
        assert_eq!(config.pool.capacity, PoolSection::default().capacity);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        assert!(matches!(parse_config("[pool"), Err(MsrpcError::Config(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind_address = \"127.0.0.1:7000\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:7000");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");

        assert!(load_config(&path).is_err());
        assert_eq!(load_config_or_default(&path).unwrap(), MsrpcConfig::default());
    }
}
