//! Protocol Buffers serializer.
//!
//! Requests and responses travel as fixed messages. Arguments and result
//! data are dynamic, so each one is carried as a `google.protobuf.Value`,
//! the well-known type behind `structpb`.
//!
//! ```text
//! message Request {
//!   uint64 request_id = 1;
//!   string service_name = 2;
//!   string method_name = 3;
//!   repeated google.protobuf.Value args = 4;
//! }
//!
//! message Response {
//!   uint64 request_id = 1;
//!   uint32 code = 2;
//!   string msg = 3;
//!   uint32 compress_type = 4;
//!   uint32 serialize_type = 5;
//!   google.protobuf.Value data = 6;
//! }
//! ```
//!
//! `google.protobuf.Value` numbers are doubles. Integral values within
//! +/-2^53 decode back to JSON integers so typed handlers can take `i64`.

use prost::Message;
use prost_types::value::Kind;
use prost_types::{ListValue, NullValue, Struct};
use serde_json::{Map, Number, Value};

use crate::protocol::error::{MsrpcError, Result};
use crate::protocol::header::{CompressType, SerializerType};
use crate::protocol::{Request, Response};
use crate::transport::codec::Serializer;

/// Largest integer an `f64` represents exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

#[derive(Clone, PartialEq, Message)]
struct RequestMessage {
    #[prost(uint64, tag = "1")]
    request_id: u64,
    #[prost(string, tag = "2")]
    service_name: String,
    #[prost(string, tag = "3")]
    method_name: String,
    #[prost(message, repeated, tag = "4")]
    args: Vec<prost_types::Value>,
}

#[derive(Clone, PartialEq, Message)]
struct ResponseMessage {
    #[prost(uint64, tag = "1")]
    request_id: u64,
    #[prost(uint32, tag = "2")]
    code: u32,
    #[prost(string, tag = "3")]
    msg: String,
    #[prost(uint32, tag = "4")]
    compress_type: u32,
    #[prost(uint32, tag = "5")]
    serialize_type: u32,
    #[prost(message, optional, tag = "6")]
    data: Option<prost_types::Value>,
}

/// Protocol Buffers serializer via `prost`.
pub struct ProtobufSerializer;

impl Serializer for ProtobufSerializer {
    fn serialize_request(&self, request: &Request) -> Result<Vec<u8>> {
        let message = RequestMessage {
            request_id: request.request_id,
            service_name: request.service_name.clone(),
            method_name: request.method_name.clone(),
            args: request.args.iter().map(to_proto).collect(),
        };
        Ok(message.encode_to_vec())
    }

    fn deserialize_request(&self, data: &[u8]) -> Result<Request> {
        let message = RequestMessage::decode(data)?;
        Ok(Request {
            request_id: message.request_id,
            service_name: message.service_name,
            method_name: message.method_name,
            args: message
                .args
                .into_iter()
                .map(from_proto)
                .collect::<Result<_>>()?,
        })
    }

    fn serialize_response(&self, response: &Response) -> Result<Vec<u8>> {
        let message = ResponseMessage {
            request_id: response.request_id,
            code: u32::from(response.code),
            msg: response.msg.clone(),
            compress_type: u32::from(response.compress_type.0),
            serialize_type: u32::from(response.serialize_type.0),
            data: Some(to_proto(&response.data)),
        };
        Ok(message.encode_to_vec())
    }

    fn deserialize_response(&self, data: &[u8]) -> Result<Response> {
        let message = ResponseMessage::decode(data)?;
        Ok(Response {
            request_id: message.request_id,
            code: narrow(message.code, "code")?,
            msg: message.msg,
            compress_type: CompressType(narrow(message.compress_type, "compress_type")?),
            serialize_type: SerializerType(narrow(message.serialize_type, "serialize_type")?),
            data: match message.data {
                Some(value) => from_proto(value)?,
                None => Value::Null,
            },
        })
    }
}

fn narrow<T: TryFrom<u32>>(value: u32, field: &str) -> Result<T> {
    T::try_from(value)
        .map_err(|_| MsrpcError::Codec(format!("protobuf: {} {} out of range", field, value)))
}

fn to_proto(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => Kind::NullValue(NullValue::NullValue as i32),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(to_proto).collect(),
        }),
        Value::Object(map) => Kind::StructValue(Struct {
            fields: map.iter().map(|(k, v)| (k.clone(), to_proto(v))).collect(),
        }),
    };
    prost_types::Value { kind: Some(kind) }
}

fn from_proto(value: prost_types::Value) -> Result<Value> {
    Ok(match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::NumberValue(n)) => from_double(n)?,
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(from_proto)
                .collect::<Result<_>>()?,
        ),
        Some(Kind::StructValue(object)) => Value::Object(
            object
                .fields
                .into_iter()
                .map(|(k, v)| Ok((k, from_proto(v)?)))
                .collect::<Result<Map<_, _>>>()?,
        ),
    })
}

fn from_double(n: f64) -> Result<Value> {
    if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER {
        return Ok(Value::Number(Number::from(n as i64)));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| MsrpcError::Codec(format!("protobuf: {} is not a JSON number", n)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_args_keep_their_shape() {
        let request = Request::new(
            7,
            "Math",
            "Add",
            vec![json!(1), json!(-2.5), json!("x"), json!([true, null]), json!({"k": {"n": 3}})],
        );
        let bytes = ProtobufSerializer.serialize_request(&request).unwrap();
        assert_eq!(ProtobufSerializer.deserialize_request(&bytes).unwrap(), request);
    }

    #[test]
    fn test_response_carries_codec_tags() {
        let response = Response::error(9, "boom").with_codec(SerializerType::PROTOBUF, CompressType::NONE);
        let bytes = ProtobufSerializer.serialize_response(&response).unwrap();
        let decoded = ProtobufSerializer.deserialize_response(&bytes).unwrap();
        assert_eq!(decoded, response);
        assert_eq!(decoded.data, Value::Null);
    }

    #[test]
    fn test_integral_doubles_become_integers() {
        assert_eq!(from_double(4.0).unwrap(), json!(4));
        assert_eq!(from_double(0.5).unwrap(), json!(0.5));
        assert!(from_double(f64::NAN).is_err());
    }

    #[test]
    fn test_wire_matches_protobuf_field_numbers() {
        let request = Request::new(1, "A", "B", vec![]);
        let bytes = ProtobufSerializer.serialize_request(&request).unwrap();
        // field 1 varint, field 2 length-delimited, field 3 length-delimited
        assert_eq!(bytes, vec![0x08, 0x01, 0x12, 0x01, b'A', 0x1a, 0x01, b'B']);
    }

    #[test]
    fn test_out_of_range_code_is_rejected() {
        let message = ResponseMessage {
            request_id: 1,
            code: 70_000,
            ..ResponseMessage::default()
        };
        let err = ProtobufSerializer
            .deserialize_response(&message.encode_to_vec())
            .unwrap_err();
        assert!(matches!(err, MsrpcError::Codec(_)));
    }

    #[test]
    fn test_truncated_message_is_a_codec_error() {
        let request = Request::new(1, "Echo", "Say", vec![json!("hi")]);
        let bytes = ProtobufSerializer.serialize_request(&request).unwrap();
        let err = ProtobufSerializer
            .deserialize_request(&bytes[..bytes.len() - 1])
            .unwrap_err();
        assert!(matches!(err, MsrpcError::Codec(_)));
    }
}
