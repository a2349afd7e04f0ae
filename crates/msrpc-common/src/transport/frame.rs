use std::io::Read;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{MsrpcError, Result};
use crate::protocol::header::{Header, MessageType, HEADER_LEN, MAX_FRAME_SIZE};
use crate::protocol::{Message, Payload};
use crate::transport::codec::CodecRegistry;
use crate::transport::map_io_error;

/// Encodes messages into frames and decodes frames back into messages.
///
/// Body layout is `compress(serialize(payload))` with both strategies
/// chosen by the header tags. Ping and Pong frames have an empty body.
///
/// Decoding reads exactly the header, then exactly the number of body bytes
/// the header announces, so a frame is never consumed partially. The body
/// buffer grows with the bytes that actually arrive, never with the length
/// a header claims.
///
/// # Example
///
/// ```
/// use msrpc_common::transport::FrameCodec;
/// use msrpc_common::{CompressType, Message, Request, SerializerType};
/// use serde_json::json;
///
/// let codec = FrameCodec::new();
/// let request = Request::new(1, "Echo", "Say", vec![json!("hi")]);
/// let message = Message::request(request, SerializerType::MSGPACK, CompressType::GZIP);
///
/// let frame = codec.encode(&message).unwrap();
/// let decoded = codec.decode_frame(&frame).unwrap();
/// assert_eq!(decoded.payload, message.payload);
/// ```
#[derive(Clone)]
pub struct FrameCodec {
    registry: Arc<CodecRegistry>,
}

impl FrameCodec {
    /// Creates a codec over the built-in serializers and compressors.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(CodecRegistry::new()))
    }

    pub fn with_registry(registry: Arc<CodecRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    /// Encodes a message into a complete frame.
    ///
    /// The header's `full_length` is recomputed from the encoded body.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Either codec tag is not registered (`UnsupportedCodec`)
    /// - Serialization or compression fails (`Codec`)
    /// - The frame would exceed `MAX_FRAME_SIZE` (`Protocol`)
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        let body = self.encode_body(message)?;

        let full_length = HEADER_LEN + body.len();
        if full_length > MAX_FRAME_SIZE {
            return Err(MsrpcError::Protocol(format!(
                "frame too large: {} bytes (max {} bytes)",
                full_length, MAX_FRAME_SIZE
            )));
        }

        let mut header = message.header;
        header.message_type = message.payload.message_type();
        header.full_length = full_length as u32;

        let mut frame = Vec::with_capacity(full_length);
        frame.extend_from_slice(&header.to_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    fn encode_body(&self, message: &Message) -> Result<Vec<u8>> {
        let header = &message.header;
        let raw = match &message.payload {
            Payload::Ping | Payload::Pong => return Ok(Vec::new()),
            Payload::Request(request) => self
                .registry
                .serializer(header.serialize_type)?
                .serialize_request(request)?,
            Payload::Response(response) => self
                .registry
                .serializer(header.serialize_type)?
                .serialize_response(response)?,
        };
        self.registry.compressor(header.compress_type)?.compress(&raw)
    }

    /// Rebuilds a typed message from a parsed header and its body bytes.
    pub fn decode_body(&self, header: Header, body: &[u8]) -> Result<Message> {
        let payload = match header.message_type {
            MessageType::Ping => Payload::Ping,
            MessageType::Pong => Payload::Pong,
            MessageType::Request => {
                let serializer = self.registry.serializer(header.serialize_type)?;
                let raw = self.registry.compressor(header.compress_type)?.decompress(body)?;
                Payload::Request(serializer.deserialize_request(&raw)?)
            }
            MessageType::Response => {
                let serializer = self.registry.serializer(header.serialize_type)?;
                let raw = self.registry.compressor(header.compress_type)?.decompress(body)?;
                Payload::Response(serializer.deserialize_response(&raw)?)
            }
        };
        Ok(Message { header, payload })
    }

    /// Reads one frame from a blocking reader.
    pub fn decode_blocking<R: Read>(&self, reader: &mut R) -> Result<Message> {
        let mut header_buf = [0u8; HEADER_LEN];
        reader
            .read_exact(&mut header_buf)
            .map_err(|e| map_io_error(e, "reading frame header"))?;
        let header = Header::parse(&header_buf)?;

        let mut body = Vec::new();
        reader
            .by_ref()
            .take(header.body_len() as u64)
            .read_to_end(&mut body)
            .map_err(|e| map_io_error(e, "reading frame body"))?;
        check_body_len(&header, &body)?;

        self.decode_body(header, &body)
    }

    /// Decodes a frame held entirely in memory.
    pub fn decode_frame(&self, mut bytes: &[u8]) -> Result<Message> {
        self.decode_blocking(&mut bytes)
    }

    /// Reads one frame without interpreting its body.
    ///
    /// Only the header is validated. Used where the frame must be drained
    /// from the socket even though it will not be dispatched.
    pub async fn read_raw<R>(&self, reader: &mut R) -> Result<(Header, Vec<u8>)>
    where
        R: AsyncRead + Unpin,
    {
        let mut header_buf = [0u8; HEADER_LEN];
        reader
            .read_exact(&mut header_buf)
            .await
            .map_err(|e| map_io_error(e, "reading frame header"))?;
        let header = Header::parse(&header_buf)?;

        let mut body = Vec::new();
        (&mut *reader)
            .take(header.body_len() as u64)
            .read_to_end(&mut body)
            .await
            .map_err(|e| map_io_error(e, "reading frame body"))?;
        check_body_len(&header, &body)?;

        Ok((header, body))
    }

    /// Reads and decodes one frame from an async reader.
    pub async fn read_frame<R>(&self, reader: &mut R) -> Result<Message>
    where
        R: AsyncRead + Unpin,
    {
        let (header, body) = self.read_raw(reader).await?;
        self.decode_body(header, &body)
    }

    /// Encodes `message` and writes the whole frame, then flushes.
    pub async fn write_frame<W>(&self, writer: &mut W, message: &Message) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = self.encode(message)?;
        writer
            .write_all(&frame)
            .await
            .map_err(|e| map_io_error(e, "writing frame"))?;
        writer
            .flush()
            .await
            .map_err(|e| map_io_error(e, "flushing stream"))?;
        Ok(())
    }
}

/// A body that ends before the announced length means the peer went away.
fn check_body_len(header: &Header, body: &[u8]) -> Result<()> {
    if body.len() == header.body_len() {
        Ok(())
    } else {
        Err(MsrpcError::Connection(format!(
            "reading frame body: got {} of {} bytes",
            body.len(),
            header.body_len()
        )))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}
