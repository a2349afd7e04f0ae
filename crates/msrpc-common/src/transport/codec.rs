//! Serializer and compressor plugins.
//!
//! Strategies are looked up by the tag bytes in the frame header, so adding a
//! format means registering another implementation, never touching framing.

use std::collections::HashMap;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::protocol::error::{MsrpcError, Result};
use crate::protocol::header::{CompressType, SerializerType, MAX_FRAME_SIZE};
use crate::protocol::{Request, Response};
use crate::transport::protobuf::ProtobufSerializer;

/// Turns request and response payloads into bytes and back.
pub trait Serializer: Send + Sync {
    fn serialize_request(&self, request: &Request) -> Result<Vec<u8>>;
    fn deserialize_request(&self, data: &[u8]) -> Result<Request>;
    fn serialize_response(&self, response: &Response) -> Result<Vec<u8>>;
    fn deserialize_response(&self, data: &[u8]) -> Result<Response>;
}

/// Transforms serialized bodies on their way to and from the wire.
pub trait Compressor: Send + Sync {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// MessagePack serializer.
///
/// Uses `rmp_serde::to_vec_named` so structs travel as maps and stay
/// readable by peers that do not share field order.
pub struct MsgPackSerializer;

impl Serializer for MsgPackSerializer {
    fn serialize_request(&self, request: &Request) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(request)?)
    }

    fn deserialize_request(&self, data: &[u8]) -> Result<Request> {
        Ok(rmp_serde::from_slice(data)?)
    }

    fn serialize_response(&self, response: &Response) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(response)?)
    }

    fn deserialize_response(&self, data: &[u8]) -> Result<Response> {
        Ok(rmp_serde::from_slice(data)?)
    }
}

/// JSON serializer.
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize_request(&self, request: &Request) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    fn deserialize_request(&self, data: &[u8]) -> Result<Request> {
        Ok(serde_json::from_slice(data)?)
    }

    fn serialize_response(&self, response: &Response) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    fn deserialize_response(&self, data: &[u8]) -> Result<Response> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Gzip compressor.
///
/// Decompression stops at `MAX_FRAME_SIZE` bytes of output so a small
/// hostile body cannot inflate without bound.
pub struct GzipCompressor {
    level: Compression,
}

impl GzipCompressor {
    pub fn new(level: Compression) -> Self {
        Self { level }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new(Compression::default())
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), self.level);
        encoder
            .write_all(data)
            .map_err(|e| MsrpcError::Codec(format!("gzip compress: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| MsrpcError::Codec(format!("gzip compress: {}", e)))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        GzDecoder::new(data)
            .take(MAX_FRAME_SIZE as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| MsrpcError::Codec(format!("gzip decompress: {}", e)))?;

        if out.len() > MAX_FRAME_SIZE {
            return Err(MsrpcError::Codec(format!(
                "decompressed body exceeds {} bytes",
                MAX_FRAME_SIZE
            )));
        }
        Ok(out)
    }
}

/// Pass-through compressor.
pub struct IdentityCompressor;

impl Compressor for IdentityCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Lookup tables from header tags to strategies.
///
/// `CodecRegistry::new()` comes with MessagePack, Protocol Buffers, JSON,
/// gzip and identity registered under their standard tags.
///
/// # Example
///
/// ```
/// use msrpc_common::transport::{CodecRegistry, IdentityCompressor};
/// use msrpc_common::CompressType;
///
/// let mut registry = CodecRegistry::new();
/// registry.register_compressor(CompressType(7), IdentityCompressor);
/// assert!(registry.compressor(CompressType(7)).is_ok());
/// assert!(registry.compressor(CompressType(8)).is_err());
/// ```
pub struct CodecRegistry {
    serializers: HashMap<SerializerType, Box<dyn Serializer>>,
    compressors: HashMap<CompressType, Box<dyn Compressor>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry
            .register_serializer(SerializerType::MSGPACK, MsgPackSerializer)
            .register_serializer(SerializerType::PROTOBUF, ProtobufSerializer)
            .register_serializer(SerializerType::JSON, JsonSerializer)
            .register_compressor(CompressType::GZIP, GzipCompressor::default())
            .register_compressor(CompressType::NONE, IdentityCompressor);
        registry
    }

    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            serializers: HashMap::new(),
            compressors: HashMap::new(),
        }
    }

    /// Binds `tag` to `serializer`, replacing any previous binding.
    pub fn register_serializer<S>(&mut self, tag: SerializerType, serializer: S) -> &mut Self
    where
        S: Serializer + 'static,
    {
        self.serializers.insert(tag, Box::new(serializer));
        self
    }

    /// Binds `tag` to `compressor`, replacing any previous binding.
    pub fn register_compressor<C>(&mut self, tag: CompressType, compressor: C) -> &mut Self
    where
        C: Compressor + 'static,
    {
        self.compressors.insert(tag, Box::new(compressor));
        self
    }

    pub fn serializer(&self, tag: SerializerType) -> Result<&dyn Serializer> {
        self.serializers
            .get(&tag)
            .map(|s| s.as_ref())
            .ok_or(MsrpcError::UnsupportedCodec {
                kind: "serializer",
                tag: tag.0,
            })
    }

    pub fn compressor(&self, tag: CompressType) -> Result<&dyn Compressor> {
        self.compressors
            .get(&tag)
            .map(|c| c.as_ref())
            .ok_or(MsrpcError::UnsupportedCodec {
                kind: "compressor",
                tag: tag.0,
            })
    }

    pub fn supports(&self, serialize_type: SerializerType, compress_type: CompressType) -> bool {
        self.serializers.contains_key(&serialize_type) && self.compressors.contains_key(&compress_type)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}
