use crate::protocol::header::{CompressType, Header, MessageType, SerializerType};
use crate::protocol::requests::{Request, RequestId};
use crate::protocol::responses::Response;

/// Typed body of a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Request(Request),
    Response(Response),
    Ping,
    Pong,
}

impl Payload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::Request(_) => MessageType::Request,
            Payload::Response(_) => MessageType::Response,
            Payload::Ping => MessageType::Ping,
            Payload::Pong => MessageType::Pong,
        }
    }
}

/// A header plus its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: Header,
    pub payload: Payload,
}

impl Message {
    pub fn request(request: Request, serialize_type: SerializerType, compress_type: CompressType) -> Self {
        let header = Header::new(
            MessageType::Request,
            serialize_type,
            compress_type,
            request.request_id,
        );
        Message {
            header,
            payload: Payload::Request(request),
        }
    }

    pub fn response(response: Response, serialize_type: SerializerType, compress_type: CompressType) -> Self {
        let header = Header::new(
            MessageType::Response,
            serialize_type,
            compress_type,
            response.request_id,
        );
        Message {
            header,
            payload: Payload::Response(response),
        }
    }

    pub fn ping(request_id: RequestId, serialize_type: SerializerType, compress_type: CompressType) -> Self {
        Message {
            header: Header::new(MessageType::Ping, serialize_type, compress_type, request_id),
            payload: Payload::Ping,
        }
    }

    pub fn pong(request_id: RequestId, serialize_type: SerializerType, compress_type: CompressType) -> Self {
        Message {
            header: Header::new(MessageType::Pong, serialize_type, compress_type, request_id),
            payload: Payload::Pong,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.header.request_id
    }
}
