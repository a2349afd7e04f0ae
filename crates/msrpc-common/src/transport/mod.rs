//! msrpc Transport Layer
//!
//! Framing, codec plugins and TCP dialing.
//!
//! # Wire Format
//!
//! ```text
//! [17-byte header] [body = compress(serialize(payload))]
//! ```
//!
//! See [`Header`](crate::protocol::Header) for the header layout.
//!
//! # Components
//!
//! - **[`Serializer`]** / **[`Compressor`]**: pluggable body strategies
//! - **[`CodecRegistry`]**: tag to strategy lookup tables
//! - **[`FrameCodec`]**: encode/decode whole frames, blocking or async
//! - **[`TcpTransport`]**: dial with a connect timeout

pub mod codec;
pub mod frame;
pub mod protobuf;
pub mod tcp;

pub use codec::{
    CodecRegistry, Compressor, GzipCompressor, IdentityCompressor, JsonSerializer,
    MsgPackSerializer, Serializer,
};
pub use frame::FrameCodec;
pub use protobuf::ProtobufSerializer;
pub use tcp::{TcpTransport, DEFAULT_CONNECT_TIMEOUT};

use crate::protocol::error::MsrpcError;

/// Maps IO errors to msrpc errors.
///
/// - Peer went away -> `Connection`
/// - Anything else -> `Io`
pub(crate) fn map_io_error(err: std::io::Error, context: &str) -> MsrpcError {
    match err.kind() {
        std::io::ErrorKind::UnexpectedEof
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected => {
            MsrpcError::Connection(format!("{}: connection lost", context))
        }
        _ => MsrpcError::Io(err),
    }
}

#[cfg(test)]
mod tests;
