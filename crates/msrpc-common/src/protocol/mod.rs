pub mod error;
pub mod header;
pub mod message;
pub mod requests;
pub mod responses;


pub use error::{MsrpcError, Result};
pub use header::{
    CompressType, Header, MessageType, SerializerType, HEADER_LEN, MAGIC_NUMBER, MAX_FRAME_SIZE,
    VERSION,
};
pub use message::{Message, Payload};
pub use requests::{Request, RequestId, RequestIdSequence};
pub use responses::{Response, CODE_ERROR, CODE_RATE_LIMITED, CODE_SUCCESS};
