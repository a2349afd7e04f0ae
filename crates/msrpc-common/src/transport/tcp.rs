use std::time::Duration;

use tokio::net::{lookup_host, TcpStream};

use crate::protocol::error::{MsrpcError, Result};

/// Default timeout for establishing a connection (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Dials TCP endpoints with a bounded connect time.
///
/// # Example
///
/// ```no_run
/// use msrpc_common::transport::TcpTransport;
/// use std::time::Duration;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let transport = TcpTransport::new(Duration::from_secs(2));
/// let stream = transport.connect("127.0.0.1:9222").await.unwrap();
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Connects to a remote endpoint.
    ///
    /// The address may resolve to several socket addresses; each is tried in
    /// turn until one accepts. The timeout covers the whole attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The address cannot be resolved (`Connection`)
    /// - Every resolved address refuses (`Connection`)
    /// - The timeout elapses first (`Timeout`)
    pub async fn connect(&self, addr: &str) -> Result<TcpStream> {
        match tokio::time::timeout(self.connect_timeout, Self::connect_any(addr)).await {
            Ok(result) => result,
            Err(_) => Err(MsrpcError::Timeout(self.connect_timeout.as_millis() as u64)),
        }
    }

    async fn connect_any(addr: &str) -> Result<TcpStream> {
        let socket_addrs = lookup_host(addr)
            .await
            .map_err(|e| MsrpcError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match TcpStream::connect(socket_addr).await {
                Ok(stream) => {
                    stream
                        .set_nodelay(true)
                        .map_err(|e| MsrpcError::Connection(format!("Failed to set nodelay: {}", e)))?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(MsrpcError::Connection(format!(
            "Failed to connect to {}: {}",
            addr,
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no addresses resolved".to_string())
        )))
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}
