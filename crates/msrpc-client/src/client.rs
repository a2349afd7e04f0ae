use std::time::Duration;

use msrpc_common::transport::{FrameCodec, TcpTransport};
use msrpc_common::{Message, MsrpcError, Payload, Request, RequestId, RequestIdSequence, Response, Result};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::options::ClientOptions;

/// A single connection to a server.
///
/// A background task decodes every frame the server sends and hands it to
/// the caller waiting in [`invoke`](Self::invoke) or [`ping`](Self::ping).
/// Servers answer one exchange per connection, so a client is normally used
/// for one call and then closed.
pub struct TcpClient {
    addr: String,
    writer: Option<OwnedWriteHalf>,
    frames: mpsc::Receiver<Result<Message>>,
    reader: JoinHandle<()>,
    codec: FrameCodec,
    options: ClientOptions,
    ids: RequestIdSequence,
}

impl TcpClient {
    /// Dials `addr` within the connection timeout.
    ///
    /// # Arguments
    /// * `addr` - Server address (e.g., "127.0.0.1:9222")
    /// * `options` - Codec tags and timeouts
    /// * `ids` - Request id source shared with other clients of the same proxy
    pub async fn connect(addr: &str, options: &ClientOptions, ids: RequestIdSequence) -> Result<Self> {
        Self::connect_with_codec(addr, options, ids, FrameCodec::new()).await
    }

    pub async fn connect_with_codec(
        addr: &str,
        options: &ClientOptions,
        ids: RequestIdSequence,
        codec: FrameCodec,
    ) -> Result<Self> {
        let transport = TcpTransport::new(options.connection_timeout);
        let stream = transport.connect(addr).await?;
        let (read_half, write_half) = stream.into_split();

        let (tx, frames) = mpsc::channel(4);
        let reader = tokio::spawn(read_frames(read_half, codec.clone(), tx));

        Ok(Self {
            addr: addr.to_string(),
            writer: Some(write_half),
            frames,
            reader,
            codec,
            options: options.clone(),
            ids,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends one request and waits for its response.
    ///
    /// Any response code is returned as-is; use
    /// [`Response::into_result`] to map codes to errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be written, the connection drops,
    /// a frame cannot be decoded, or no response arrives within the read timeout.
    pub async fn invoke(&mut self, service: &str, method: &str, args: Vec<Value>) -> Result<Response> {
        let request_id = self.ids.next_id();
        let request = Request::new(request_id, service, method, args);
        let message = Message::request(request, self.options.serialize_type, self.options.compress_type);
        self.send(&message).await?;

        let reply = self.await_reply(request_id).await?;
        match reply.payload {
            Payload::Response(response) => Ok(response),
            other => Err(MsrpcError::Protocol(format!(
                "expected a response, got {:?}",
                other.message_type()
            ))),
        }
    }

    /// Sends a Ping and waits for the matching Pong. Returns the round trip time.
    pub async fn ping(&mut self) -> Result<Duration> {
        let started = tokio::time::Instant::now();
        let request_id = self.ids.next_id();
        let message = Message::ping(request_id, self.options.serialize_type, self.options.compress_type);
        self.send(&message).await?;

        let reply = self.await_reply(request_id).await?;
        match reply.payload {
            Payload::Pong => Ok(started.elapsed()),
            other => Err(MsrpcError::Protocol(format!(
                "expected a pong, got {:?}",
                other.message_type()
            ))),
        }
    }

    /// Shuts down the write half and stops the reader task.
    pub async fn close(&mut self) -> Result<()> {
        self.reader.abort();
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }

    async fn send(&mut self, message: &Message) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| MsrpcError::Connection(format!("client for {} is closed", self.addr)))?;
        self.codec.write_frame(writer, message).await
    }

    /// Waits for the frame answering `request_id`, skipping any other.
    async fn await_reply(&mut self, request_id: RequestId) -> Result<Message> {
        let deadline = tokio::time::Instant::now() + self.options.read_timeout;
        loop {
            let frame = match tokio::time::timeout_at(deadline, self.frames.recv()).await {
                Ok(Some(frame)) => frame?,
                Ok(None) => {
                    return Err(MsrpcError::Connection(format!(
                        "{}: connection closed before a reply arrived",
                        self.addr
                    )))
                }
                Err(_) => return Err(MsrpcError::Timeout(self.options.read_timeout.as_millis() as u64)),
            };

            if frame.request_id() == request_id {
                return Ok(frame);
            }
            tracing::debug!(
                "Ignoring frame for request {} while waiting for {}",
                frame.request_id(),
                request_id
            );
        }
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Forwards decoded frames until the stream ends or a frame is malformed.
async fn read_frames(mut reader: OwnedReadHalf, codec: FrameCodec, tx: mpsc::Sender<Result<Message>>) {
    loop {
        let frame = codec.read_frame(&mut reader).await;
        let failed = frame.is_err();
        if tx.send(frame).await.is_err() || failed {
            break;
        }
    }
}
