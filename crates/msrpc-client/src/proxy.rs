use std::sync::Arc;
use std::time::Duration;

use msrpc_breaker::{BreakerError, CircuitBreaker, Settings};
use msrpc_common::config::BreakerSection;
use msrpc_common::registry::ServiceRegistry;
use msrpc_common::transport::FrameCodec;
use msrpc_common::{MsrpcError, RequestIdSequence, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::backoff::calculate_backoff;
use crate::client::TcpClient;
use crate::options::ClientOptions;

/// Breaker guarding proxy calls.
pub type CallBreaker = CircuitBreaker<Value, MsrpcError>;

/// Builds a call breaker from configuration, or `None` when disabled.
pub fn breaker_from_config(name: &str, section: &BreakerSection) -> Option<Arc<CallBreaker>> {
    if !section.enabled {
        return None;
    }
    let settings = Settings::new(name)
        .with_max_requests(section.max_requests)
        .with_interval(section.interval())
        .with_timeout(section.timeout())
        .with_failure_threshold(section.failure_threshold);
    Some(Arc::new(CircuitBreaker::new(settings)))
}

/// Calls services by name through a registry.
///
/// Every attempt resolves the service, opens a fresh connection, invokes the
/// method and closes the connection. Transport failures and code 700 replies
/// are retried with jittered exponential backoff. Application errors (code
/// 500) are returned immediately.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use msrpc_client::{ClientOptions, TcpClientProxy};
/// use msrpc_common::registry::StaticRegistry;
/// use serde_json::json;
///
/// # async fn run() -> msrpc_common::Result<()> {
/// let registry = Arc::new(StaticRegistry::new().with_service("Echo", "127.0.0.1:9222"));
/// let proxy = TcpClientProxy::new(ClientOptions::default(), registry);
///
/// let reply: String = proxy.call_typed("Echo", "Say", vec![json!("hi")]).await?;
/// assert_eq!(reply, "hi");
/// # Ok(())
/// # }
/// ```
pub struct TcpClientProxy {
    options: ClientOptions,
    registry: Arc<dyn ServiceRegistry>,
    ids: RequestIdSequence,
    codec: FrameCodec,
    breaker: Option<Arc<CallBreaker>>,
}

impl TcpClientProxy {
    pub fn new(options: ClientOptions, registry: Arc<dyn ServiceRegistry>) -> Self {
        Self {
            options,
            registry,
            ids: RequestIdSequence::new(),
            codec: FrameCodec::new(),
            breaker: None,
        }
    }

    /// Routes every call through `breaker`. A call counts once toward the
    /// breaker, however many attempts it takes.
    pub fn with_breaker(mut self, breaker: Arc<CallBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn with_codec(mut self, codec: FrameCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn breaker(&self) -> Option<&Arc<CallBreaker>> {
        self.breaker.as_ref()
    }

    /// Calls `service.method` with positional arguments.
    ///
    /// # Errors
    ///
    /// - `Application` for a code 500 reply
    /// - `RetriesExhausted` once `retries + 1` attempts failed with retryable errors
    /// - `CircuitOpen` / `TooManyRequests` when the breaker rejects the call
    pub async fn call(&self, service: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        match &self.breaker {
            Some(breaker) => breaker
                .execute_async(|| self.call_with_retries(service, method, &args))
                .await
                .map_err(from_breaker_error),
            None => self.call_with_retries(service, method, &args).await,
        }
    }

    /// Like [`call`](Self::call), decoding the result into `R`.
    pub async fn call_typed<R>(&self, service: &str, method: &str, args: Vec<Value>) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let value = self.call(service, method, args).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Pings the server hosting `service` once, without retries.
    pub async fn ping(&self, service: &str) -> Result<Duration> {
        let addr = self.registry.resolve(service).await?;
        let mut client =
            TcpClient::connect_with_codec(&addr, &self.options, self.ids.clone(), self.codec.clone()).await?;
        let rtt = client.ping().await;
        let _ = client.close().await;
        rtt
    }

    async fn call_with_retries(&self, service: &str, method: &str, args: &[Value]) -> Result<Value> {
        let attempts = self.options.retries.saturating_add(1);
        let mut last = MsrpcError::Connection("no attempt made".to_string());

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = calculate_backoff(
                    attempt - 1,
                    self.options.retry_backoff_ms,
                    self.options.retry_backoff_max_ms,
                );
                tracing::info!(
                    service = service,
                    method = method,
                    attempt = attempt,
                    delay = ?delay,
                    "Retrying call"
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(service, method, args).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    tracing::warn!("{}.{} attempt {} failed: {}", service, method, attempt, e);
                    last = e;
                }
                Err(e) => return Err(e),
            }
        }

        Err(MsrpcError::RetriesExhausted {
            attempts,
            last: Box::new(last),
        })
    }

    async fn attempt(&self, service: &str, method: &str, args: &[Value]) -> Result<Value> {
        let addr = self.registry.resolve(service).await?;
        let mut client =
            TcpClient::connect_with_codec(&addr, &self.options, self.ids.clone(), self.codec.clone()).await?;
        let response = client.invoke(service, method, args.to_vec()).await;
        if let Err(e) = client.close().await {
            tracing::debug!("Failed to close connection to {}: {}", addr, e);
        }
        response?.into_result()
    }
}

fn from_breaker_error(err: BreakerError<MsrpcError>) -> MsrpcError {
    match err {
        BreakerError::Open => MsrpcError::CircuitOpen,
        BreakerError::TooManyRequests => MsrpcError::TooManyRequests,
        BreakerError::Failed(e) => e,
    }
}
