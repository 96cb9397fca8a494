//! # gwire-protocol
//!
//! Wire protocol for graph-traversal servers speaking the Gremlin v4 message
//! formats.
//!
//! This crate provides:
//! - Typed, possibly-named traversal values (`TypedValue`) over a closed set of
//!   core types plus registrable custom types
//! - Request/Response envelope types and the client-facing error taxonomy
//! - The length-prefixed content-type header used for codec negotiation
//! - A version-keyed serializer registry with GraphSON (text) and
//!   GraphBinary (binary) codecs

pub mod codec;
pub mod error;
pub mod header;
pub mod message;
pub mod registry;
pub mod status;
pub mod tokens;
pub mod value;

pub use codec::graphbinary::{BinaryFamily, BinaryTypeId, GraphBinarySerializer};
pub use codec::graphson::{GraphSonSerializer, TextFamily};
pub use codec::{negotiate_header, Codecs, MessageSerializer};
pub use error::{ProtocolError, SerializationError, ValueError};
pub use header::{Header, MIME_GRAPHBINARY_V4, MIME_GRAPHSON_V4};
pub use message::{
    GremlinType, Operation, RequestMessage, ResponseMessage, ResponseStatus, SuccessCode,
};
pub use registry::{Rule, SerializerRegistry, WireFamily};
pub use status::{ErrorKind, ErrorRecord, StatusCode};
pub use value::{
    classify, BigDecimal, Bytecode, CustomTypes, CustomValue, Edge, Instruction, Lambda, Path,
    Property, TypeTag, TypedValue, Value, Vertex,
};

/// Version byte leading every GraphBinary message payload.
pub const GRAPHBINARY_VERSION: u8 = 0x84;

/// Maximum number of characters of a request rendered into a "long request" error.
pub const MAX_REQUEST_SNIPPET: usize = 1021;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::value::{CustomTypes, CustomValue, Value};

    /// Custom type installed for every test in this crate.
    pub const POINT_TYPE: &str = "tinker:Point";

    /// Installs the crate-wide test custom type table. Safe to call repeatedly.
    pub fn install_custom_types() {
        let _ = CustomTypes::new().with_type(POINT_TYPE).install();
    }

    pub fn point(x: i32, y: i32) -> Value {
        Value::Custom(CustomValue::new(
            POINT_TYPE,
            Value::List(vec![Value::Integer(x), Value::Integer(y)]),
        ))
    }
}
