use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::error::{MsrpcError, Result};
use crate::protocol::requests::RequestId;

/// First byte of every frame.
pub const MAGIC_NUMBER: u8 = 0x1d;

/// Protocol version carried in the second header byte.
pub const VERSION: u8 = 0x01;

/// Fixed header size in bytes.
pub const HEADER_LEN: usize = 17;

/// Maximum frame size (100 MB), header included.
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Kind of payload a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Request = 0,
    Response = 1,
    Ping = 2,
    Pong = 3,
}

impl TryFrom<u8> for MessageType {
    type Error = MsrpcError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageType::Request),
            1 => Ok(MessageType::Response),
            2 => Ok(MessageType::Ping),
            3 => Ok(MessageType::Pong),
            other => Err(MsrpcError::Protocol(format!("unknown message type {}", other))),
        }
    }
}

/// Serialization tag carried in the header.
///
/// The set is open: any byte can be bound to a serializer in a
/// [`CodecRegistry`](crate::transport::CodecRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerializerType(pub u8);

impl SerializerType {
    /// MessagePack via `rmp-serde`.
    pub const MSGPACK: SerializerType = SerializerType(0);
    /// Protocol Buffers via `prost`.
    pub const PROTOBUF: SerializerType = SerializerType(1);
    /// JSON via `serde_json`.
    pub const JSON: SerializerType = SerializerType(2);

    /// Looks up a built-in serializer tag by its config name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "msgpack" | "messagepack" => Some(Self::MSGPACK),
            "protobuf" | "proto" => Some(Self::PROTOBUF),
            "json" => Some(Self::JSON),
            _ => None,
        }
    }
}

impl Default for SerializerType {
    fn default() -> Self {
        Self::MSGPACK
    }
}

impl fmt::Display for SerializerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::MSGPACK => write!(f, "msgpack"),
            Self::PROTOBUF => write!(f, "protobuf"),
            Self::JSON => write!(f, "json"),
            SerializerType(tag) => write!(f, "serializer#{}", tag),
        }
    }
}

/// Compression tag carried in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompressType(pub u8);

impl CompressType {
    /// Gzip via `flate2`.
    pub const GZIP: CompressType = CompressType(0);
    /// Body passes through untouched.
    pub const NONE: CompressType = CompressType(1);

    /// Looks up a built-in compressor tag by its config name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "gzip" => Some(Self::GZIP),
            "none" | "identity" => Some(Self::NONE),
            _ => None,
        }
    }
}

impl Default for CompressType {
    fn default() -> Self {
        Self::GZIP
    }
}

impl fmt::Display for CompressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::GZIP => write!(f, "gzip"),
            Self::NONE => write!(f, "none"),
            CompressType(tag) => write!(f, "compressor#{}", tag),
        }
    }
}

/// The fixed 17-byte frame header.
///
/// ```text
/// offset 0     magic
/// offset 1     version
/// offset 2-5   full length (u32, big-endian) = 17 + body length
/// offset 6     message type
/// offset 7     compression type
/// offset 8     serialization type
/// offset 9-16  request id (u64, big-endian)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u8,
    pub version: u8,
    pub full_length: u32,
    pub message_type: MessageType,
    pub compress_type: CompressType,
    pub serialize_type: SerializerType,
    pub request_id: RequestId,
}

impl Header {
    /// Creates a header for an empty body. The frame codec fills in
    /// `full_length` when the body is known.
    pub fn new(
        message_type: MessageType,
        serialize_type: SerializerType,
        compress_type: CompressType,
        request_id: RequestId,
    ) -> Self {
        Self {
            magic: MAGIC_NUMBER,
            version: VERSION,
            full_length: HEADER_LEN as u32,
            message_type,
            compress_type,
            serialize_type,
            request_id,
        }
    }

    /// Number of body bytes that follow the header.
    pub fn body_len(&self) -> usize {
        (self.full_length as usize).saturating_sub(HEADER_LEN)
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.magic;
        buf[1] = self.version;
        buf[2..6].copy_from_slice(&self.full_length.to_be_bytes());
        buf[6] = self.message_type as u8;
        buf[7] = self.compress_type.0;
        buf[8] = self.serialize_type.0;
        buf[9..17].copy_from_slice(&self.request_id.to_be_bytes());
        buf
    }

    /// Parses and validates a raw header.
    ///
    /// # Errors
    ///
    /// Returns `MsrpcError::Protocol` if:
    /// - The magic byte is wrong ("magic number error")
    /// - The version is not supported
    /// - The message type is unknown
    /// - The announced length is shorter than a header or above `MAX_FRAME_SIZE`
    pub fn parse(buf: &[u8; HEADER_LEN]) -> Result<Self> {
        if buf[0] != MAGIC_NUMBER {
            return Err(MsrpcError::Protocol("magic number error".to_string()));
        }
        if buf[1] != VERSION {
            return Err(MsrpcError::Protocol(format!(
                "unsupported protocol version {}",
                buf[1]
            )));
        }

        let full_length = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
        if (full_length as usize) < HEADER_LEN {
            return Err(MsrpcError::Protocol(format!(
                "frame length {} is shorter than the header",
                full_length
            )));
        }
        if full_length as usize > MAX_FRAME_SIZE {
            return Err(MsrpcError::Protocol(format!(
                "frame too large: {} bytes (max {} bytes)",
                full_length, MAX_FRAME_SIZE
            )));
        }

        let message_type = MessageType::try_from(buf[6])?;

        let mut id = [0u8; 8];
        id.copy_from_slice(&buf[9..17]);

        Ok(Self {
            magic: buf[0],
            version: buf[1],
            full_length,
            message_type,
            compress_type: CompressType(buf[7]),
            serialize_type: SerializerType(buf[8]),
            request_id: RequestId::from_be_bytes(id),
        })
    }
}
