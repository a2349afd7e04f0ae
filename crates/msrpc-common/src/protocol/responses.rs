use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::error::{MsrpcError, Result};
use crate::protocol::header::{CompressType, SerializerType};
use crate::protocol::requests::RequestId;

/// The call succeeded.
pub const CODE_SUCCESS: u16 = 200;
/// Dispatch failed or the handler returned an error.
pub const CODE_ERROR: u16 = 500;
/// The server's rate limiter rejected the connection.
pub const CODE_RATE_LIMITED: u16 = 700;

/// Result of a call.
///
/// `compress_type` and `serialize_type` echo the tags the request arrived
/// with, so a caller can tell how its arguments were understood.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub request_id: RequestId,
    pub code: u16,
    pub msg: String,
    pub compress_type: CompressType,
    pub serialize_type: SerializerType,
    pub data: Value,
}

impl Response {
    pub fn success(request_id: RequestId, data: Value) -> Self {
        Response {
            request_id,
            code: CODE_SUCCESS,
            msg: String::new(),
            compress_type: CompressType::default(),
            serialize_type: SerializerType::default(),
            data,
        }
    }

    pub fn error(request_id: RequestId, msg: impl Into<String>) -> Self {
        Response {
            request_id,
            code: CODE_ERROR,
            msg: msg.into(),
            compress_type: CompressType::default(),
            serialize_type: SerializerType::default(),
            data: Value::Null,
        }
    }

    pub fn rate_limited(request_id: RequestId) -> Self {
        Response {
            code: CODE_RATE_LIMITED,
            msg: "rate limited".to_string(),
            ..Response::error(request_id, "")
        }
    }

    /// Sets the echoed codec tags.
    pub fn with_codec(mut self, serialize_type: SerializerType, compress_type: CompressType) -> Self {
        self.serialize_type = serialize_type;
        self.compress_type = compress_type;
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }

    /// Converts the response into the call's outcome.
    ///
    /// Code 700 maps to `RateLimited` (retryable); any other non-200 code
    /// maps to `Application`.
    pub fn into_result(self) -> Result<Value> {
        match self.code {
            CODE_SUCCESS => Ok(self.data),
            CODE_RATE_LIMITED => Err(MsrpcError::RateLimited(self.msg)),
            code => Err(MsrpcError::Application {
                code,
                message: self.msg,
            }),
        }
    }
}
