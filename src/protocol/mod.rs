// src/protocol/mod.rs
mod endpoint;
mod request;
mod response;

pub use endpoint::{Endpoint, EndpointParseError};
pub use request::{
    find_head_end, parse_head, read_request, FramingError, RawRequest, RequestHead, MAX_HEAD_BYTES,
    READ_CHUNK,
};
pub use response::{simple_response, status_code, write_response};
