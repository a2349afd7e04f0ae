use thiserror::Error;

#[derive(Error, Debug)]
pub enum MsrpcError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unsupported {kind} type: {tag}")]
    UnsupportedCodec { kind: &'static str, tag: u8 },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Application error (code {code}): {message}")]
    Application { code: u16, message: String },

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Too many requests in half-open state")]
    TooManyRequests,

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<MsrpcError> },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl MsrpcError {
    /// Whether a proxy should try the call again on a fresh connection.
    ///
    /// Transport faults and rate limiting are transient. Application and
    /// dispatch errors travelled inside a well-formed response and are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MsrpcError::Protocol(_)
                | MsrpcError::Codec(_)
                | MsrpcError::RateLimited(_)
                | MsrpcError::Connection(_)
                | MsrpcError::Timeout(_)
                | MsrpcError::Io(_)
                | MsrpcError::Registry(_)
        )
    }
}

impl From<serde_json::Error> for MsrpcError {
    fn from(err: serde_json::Error) -> Self {
        MsrpcError::Codec(format!("json: {}", err))
    }
}

impl From<rmp_serde::encode::Error> for MsrpcError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        MsrpcError::Codec(format!("msgpack encode: {}", err))
    }
}

impl From<rmp_serde::decode::Error> for MsrpcError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        MsrpcError::Codec(format!("msgpack decode: {}", err))
    }
}

impl From<prost::DecodeError> for MsrpcError {
    fn from(err: prost::DecodeError) -> Self {
        MsrpcError::Codec(format!("protobuf decode: {}", err))
    }
}

impl From<toml::de::Error> for MsrpcError {
    fn from(err: toml::de::Error) -> Self {
        MsrpcError::Config(err.to_string())
    }
}

impl From<std::net::AddrParseError> for MsrpcError {
    fn from(err: std::net::AddrParseError) -> Self {
        MsrpcError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MsrpcError>;
