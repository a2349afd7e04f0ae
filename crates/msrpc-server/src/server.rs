use std::net::SocketAddr;
use std::sync::Arc;

use msrpc_common::rate_limit::RateLimiter;
use msrpc_common::registry::ServiceRegistry;
use msrpc_common::transport::FrameCodec;
use msrpc_common::{
    CompressType, Header, Message, MsrpcError, Payload, Request, Response, Result, SerializerType,
};
use msrpc_pool::Pool;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::ServerConfig;
use crate::service::{DispatchError, HandlerResult, ServiceTable};
use crate::shutdown::Shutdown;

/// State shared by every connection task.
struct Shared {
    services: ServiceTable,
    codec: FrameCodec,
    limiter: Option<RateLimiter>,
    pool: Option<Arc<Pool>>,
    config: ServerConfig,
}

/// Async TCP server dispatching framed requests to registered services.
///
/// Each connection carries one exchange: the server reads one frame, answers
/// it, and closes the connection. A reader and a writer task per connection
/// are joined by a single-slot channel.
pub struct TcpServer {
    listener: TcpListener,
    shared: Arc<Shared>,
    shutdown: Shutdown,
    shutdown_rx: broadcast::Receiver<()>,
}

impl TcpServer {
    /// Binds the listener and prepares the service table.
    ///
    /// # Arguments
    /// * `config` - Server settings, including the bind address
    /// * `services` - Every service the server exposes
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the worker pool
    /// settings are invalid.
    pub async fn bind(config: ServerConfig, services: ServiceTable) -> Result<Self> {
        Self::bind_with_codec(config, services, FrameCodec::new()).await
    }

    /// Like [`TcpServer::bind`], with a caller-supplied codec registry.
    pub async fn bind_with_codec(
        config: ServerConfig,
        services: ServiceTable,
        codec: FrameCodec,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_address).await.map_err(|e| {
            MsrpcError::Connection(format!("Failed to bind to {}: {}", config.bind_address, e))
        })?;

        let limiter = config.rate_limit.clone().map(RateLimiter::new);
        let pool = match &config.worker_pool {
            Some(pool_config) => Some(Arc::new(
                Pool::new(pool_config.clone()).map_err(|e| MsrpcError::Config(e.to_string()))?,
            )),
            None => None,
        };

        let local_addr = listener.local_addr()?;
        tracing::info!(
            address = %local_addr,
            services = services.len(),
            rate_limited = limiter.is_some(),
            worker_pool = pool.is_some(),
            "Listener bound"
        );

        let shutdown = Shutdown::new();
        let shutdown_rx = shutdown.subscribe();

        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                services,
                codec,
                limiter,
                pool,
                config,
            }),
            shutdown,
            shutdown_rx,
        })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| MsrpcError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Returns a handle that stops [`TcpServer::run`] when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn services(&self) -> &ServiceTable {
        &self.shared.services
    }

    /// Announces every service under this server's address.
    ///
    /// The host is the configured advertise host, or the bound IP. An
    /// unspecified bind IP (`0.0.0.0`) is announced as `127.0.0.1`.
    pub async fn register_with(&self, registry: &dyn ServiceRegistry) -> Result<()> {
        let addr = self.local_addr()?;
        let host = match &self.shared.config.advertise_host {
            Some(host) => host.clone(),
            None if addr.ip().is_unspecified() => "127.0.0.1".to_string(),
            None => addr.ip().to_string(),
        };

        for name in self.shared.services.service_names() {
            registry.register_service(name, &host, addr.port()).await?;
        }
        Ok(())
    }

    /// Accepts connections until the shutdown handle is triggered.
    ///
    /// Connections already accepted finish on their own tasks.
    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!("Connection established from {}", peer);
                            let shared = Arc::clone(&self.shared);
                            tokio::spawn(handle_connection(stream, peer, shared));
                        }
                        Err(e) => {
                            tracing::warn!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        if let Some(pool) = &self.shared.pool {
            pool.release();
        }
        Ok(())
    }
}

/// Serves one exchange on a connection.
async fn handle_connection(stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) {
    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::channel::<Message>(1);

    let writer_task = tokio::spawn(write_replies(writer, rx, shared.codec.clone(), peer));

    let reply = read_and_dispatch(&mut reader, peer, &shared).await;
    if tx.send(reply).await.is_err() {
        tracing::warn!("Writer for {} exited before the reply was sent", peer);
    }
    drop(tx);

    if let Err(e) = writer_task.await {
        tracing::error!("Writer task for {} failed: {}", peer, e);
    }
}

async fn write_replies(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Message>,
    codec: FrameCodec,
    peer: SocketAddr,
) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = codec.write_frame(&mut writer, &message).await {
            tracing::warn!("Failed to send reply to {}: {}", peer, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Reads one frame and produces the reply for it.
async fn read_and_dispatch(reader: &mut OwnedReadHalf, peer: SocketAddr, shared: &Shared) -> Message {
    if let Some(limiter) = &shared.limiter {
        if let Err(e) = limiter.acquire_within(shared.config.limiter_timeout).await {
            tracing::warn!("Rejecting request from {}: {}", peer, e);
            return rate_limited_reply(reader, shared).await;
        }
    }

    let message = match read_header_and_body(reader, shared).await {
        Ok((header, body)) => match shared.codec.decode_body(header, &body) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Failed to decode frame from {}: {}", peer, e);
                return error_reply(shared, Some(&header), e.to_string());
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read frame from {}: {}", peer, e);
            return error_reply(shared, None, e.to_string());
        }
    };

    let (serialize_type, compress_type) = reply_codec(shared, &message.header);
    let request_id = message.request_id();

    match message.payload {
        Payload::Request(request) => {
            let response = dispatch(shared, request).await;
            Message::response(
                response.with_codec(serialize_type, compress_type),
                serialize_type,
                compress_type,
            )
        }
        Payload::Ping => Message::pong(request_id, serialize_type, compress_type),
        Payload::Response(_) | Payload::Pong => {
            let response = Response::error(request_id, "unexpected message type")
                .with_codec(serialize_type, compress_type);
            Message::response(response, serialize_type, compress_type)
        }
    }
}

async fn read_header_and_body(
    reader: &mut OwnedReadHalf,
    shared: &Shared,
) -> Result<(Header, Vec<u8>)> {
    match tokio::time::timeout(shared.config.read_timeout, shared.codec.read_raw(reader)).await {
        Ok(result) => result,
        Err(_) => Err(MsrpcError::Timeout(shared.config.read_timeout.as_millis() as u64)),
    }
}

/// Drains the pending frame so the peer sees a reply rather than a reset.
async fn rate_limited_reply(reader: &mut OwnedReadHalf, shared: &Shared) -> Message {
    let (request_id, serialize_type, compress_type) =
        match read_header_and_body(reader, shared).await {
            Ok((header, _)) => {
                let (ser, comp) = reply_codec(shared, &header);
                (header.request_id, ser, comp)
            }
            Err(_) => (0, shared.config.serialize_type, shared.config.compress_type),
        };

    let response = Response::rate_limited(request_id).with_codec(serialize_type, compress_type);
    Message::response(response, serialize_type, compress_type)
}

fn error_reply(shared: &Shared, header: Option<&Header>, msg: String) -> Message {
    let (request_id, serialize_type, compress_type) = match header {
        Some(header) => {
            let (ser, comp) = reply_codec(shared, header);
            (header.request_id, ser, comp)
        }
        None => (0, shared.config.serialize_type, shared.config.compress_type),
    };
    let response = Response::error(request_id, msg).with_codec(serialize_type, compress_type);
    Message::response(response, serialize_type, compress_type)
}

/// Replies use the request's codec when this server supports it.
fn reply_codec(shared: &Shared, header: &Header) -> (SerializerType, CompressType) {
    if shared
        .codec
        .registry()
        .supports(header.serialize_type, header.compress_type)
    {
        (header.serialize_type, header.compress_type)
    } else {
        (shared.config.serialize_type, shared.config.compress_type)
    }
}

async fn dispatch(shared: &Shared, request: Request) -> Response {
    let request_id = request.request_id;
    let outcome = match shared
        .services
        .lookup(&request.service_name, &request.method_name)
    {
        Ok(handler) => {
            let args = request.args;
            match &shared.pool {
                Some(pool) => run_on_pool(Arc::clone(pool), move || handler(args)).await,
                None => tokio::task::spawn_blocking(move || handler(args))
                    .await
                    .unwrap_or(Err(DispatchError::Panicked)),
            }
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(data) => Response::success(request_id, data),
        Err(e) => {
            tracing::warn!(
                "{}.{} failed: {}",
                request.service_name,
                request.method_name,
                e
            );
            Response::error(request_id, e.to_string())
        }
    }
}

/// Runs a handler on the worker pool. `submit` blocks while every worker is
/// busy, so it is called from a blocking thread.
async fn run_on_pool<F>(pool: Arc<Pool>, handler: F) -> HandlerResult
where
    F: FnOnce() -> HandlerResult + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let submitted = tokio::task::spawn_blocking(move || {
        pool.submit(move || {
            let _ = tx.send(handler());
        })
    })
    .await;

    match submitted {
        Ok(Ok(())) => rx.await.unwrap_or(Err(DispatchError::Panicked)),
        Ok(Err(_)) => Err(DispatchError::PoolClosed),
        Err(_) => Err(DispatchError::Panicked),
    }
}
