//! msrpc Common Types and Transport
//!
//! Core protocol definitions, framing and shared infrastructure for the
//! msrpc binary RPC system.
//!
//! # Overview
//!
//! - **Protocol Layer**: header, request/response, status codes, errors
//! - **Transport Layer**: frame codec, serializer/compressor plugins, TCP dialing
//! - **Rate Limiting**: token bucket with bounded waits
//! - **Registry**: service discovery interface and a static implementation
//! - **Config**: TOML configuration with defaults
//!
//! # Architecture
//!
//! - **Transport**: TCP, one request per connection
//! - **Message Format**: `[17-byte header] + [compress(serialize(payload))]`
//! - **Max Frame Size**: 100 MB
//!
//! # Example
//!
//! ```
//! use msrpc_common::{CompressType, Message, Request, Response, SerializerType};
//! use msrpc_common::transport::FrameCodec;
//! use serde_json::json;
//!
//! let codec = FrameCodec::new();
//! let request = Request::new(1, "Echo", "Say", vec![json!("hi")]);
//! let frame = codec
//!     .encode(&Message::request(request, SerializerType::MSGPACK, CompressType::GZIP))
//!     .unwrap();
//!
//! let response = Response::success(1, json!("hi"));
//! assert!(response.is_success());
//! # let _ = frame;
//! ```

pub mod config;
pub mod protocol;
pub mod rate_limit;
pub mod registry;
pub mod transport;

pub use protocol::*;
