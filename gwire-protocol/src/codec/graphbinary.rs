//! GraphBinary v4 codec.
//!
//! Every value is written fully qualified:
//!
//! ```text
//! +-----------+------------+-----------------+
//! | type:u8   | flag:u8    | value (by type) |
//! +-----------+------------+-----------------+
//! ```
//!
//! A flag of `0x01` marks a null and carries no value bytes. Nulls are
//! untyped in [`Value`], so a typed null such as `01 01` reads as
//! [`Value::Null`] and is written back as the unspecified null `fe 01`.
//! Extension types use type code `0x00` followed by their name. All
//! fixed-width numbers are big-endian and all lengths and counts are `i32`.
//! Containers nest at most 128 deep on read.
//!
//! Request layout:
//!
//! ```text
//! {version:0x84}{request_id}{op}{gremlin_type}{arg_count:i32}({key}{fq value})*
//! ```
//!
//! Response layout:
//!
//! ```text
//! {version:0x84}{nullable request_id}{code:i32}{nullable message}{nullable exception}
//! {meta_count:i32}({key}{fq value})*{result_flag:u8}[{count:i32}{fq value}*]
//! ```

use super::MessageSerializer;
use crate::error::{SerializationError, ValueError};
use crate::header::{self, MIME_GRAPHBINARY_V4, MIME_GRAPHBINARY_V4_FULL};
use crate::message::{RequestMessage, ResponseMessage, ResponseStatus, SuccessCode};
use crate::registry::{SerializerRegistry, WireFamily};
use crate::status::{ErrorKind, ErrorRecord, StatusCode};
use crate::value::{
    BigDecimal, Bytecode, CustomTypes, CustomValue, Edge, Instruction, Lambda, Path, Property,
    TypeTag, TypedValue, Value, Vertex,
};
use crate::GRAPHBINARY_VERSION;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_bigint::BigInt;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Type codes.
pub mod code {
    pub const CUSTOM: u8 = 0x00;
    pub const INTEGER: u8 = 0x01;
    pub const LONG: u8 = 0x02;
    pub const STRING: u8 = 0x03;
    pub const DOUBLE: u8 = 0x07;
    pub const LIST: u8 = 0x09;
    pub const MAP: u8 = 0x0A;
    pub const SET: u8 = 0x0B;
    pub const EDGE: u8 = 0x0D;
    pub const PATH: u8 = 0x0E;
    pub const PROPERTY: u8 = 0x0F;
    pub const VERTEX: u8 = 0x11;
    pub const BYTECODE: u8 = 0x15;
    pub const LAMBDA: u8 = 0x1D;
    pub const BIG_DECIMAL: u8 = 0x22;
    pub const BIG_INTEGER: u8 = 0x23;
    pub const BOOLEAN: u8 = 0x27;
    pub const UNSPECIFIED_NULL: u8 = 0xFE;
}

const FLAG_PRESENT: u8 = 0x00;
const FLAG_NULL: u8 = 0x01;

/// Deepest container nesting accepted on read.
const MAX_DEPTH: usize = 128;

/// GraphBinary type identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BinaryTypeId {
    Core(u8),
    /// Extension type, written as code `0x00` followed by its name.
    Custom(String),
}

impl fmt::Display for BinaryTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryTypeId::Core(code) => write!(f, "{code:#04x}"),
            BinaryTypeId::Custom(name) => f.write_str(name),
        }
    }
}

/// Writes one value body (without type code and flag).
pub type BinaryEncoder =
    fn(&Value, &mut BytesMut, &GraphBinarySerializer) -> Result<(), SerializationError>;
/// Reads one value body of the given type at the given nesting depth.
pub type BinaryDecoder =
    fn(&TypeTag, &mut Bytes, &GraphBinarySerializer, usize) -> Result<Value, SerializationError>;

/// GraphBinary wire family: type codes and byte buffers.
#[derive(Debug)]
pub struct BinaryFamily;

impl WireFamily for BinaryFamily {
    type Id = BinaryTypeId;
    type Encoder = BinaryEncoder;
    type Decoder = BinaryDecoder;
    const NAME: &'static str = "graphbinary";
}

static DEFAULT_REGISTRY: OnceLock<Arc<SerializerRegistry<BinaryFamily>>> = OnceLock::new();
static HEADER: OnceLock<Bytes> = OnceLock::new();

const SUPPORTED_MIME_TYPES: &[&str] = &[MIME_GRAPHBINARY_V4, MIME_GRAPHBINARY_V4_FULL];

/// Shared process-wide registry, built on first use.
pub fn default_registry() -> Arc<SerializerRegistry<BinaryFamily>> {
    DEFAULT_REGISTRY.get_or_init(|| Arc::new(base_registry())).clone()
}

/// A fresh registry with every core type plus the installed custom types.
pub fn base_registry() -> SerializerRegistry<BinaryFamily> {
    let mut registry = SerializerRegistry::new();
    let core: [(TypeTag, u8, BinaryEncoder, BinaryDecoder); 16] = [
        (TypeTag::Integer, code::INTEGER, write_int, read_int),
        (TypeTag::Long, code::LONG, write_long, read_long),
        (TypeTag::String, code::STRING, write_str, read_str),
        (TypeTag::Double, code::DOUBLE, write_double, read_double),
        (TypeTag::Boolean, code::BOOLEAN, write_bool, read_bool),
        (TypeTag::BigInteger, code::BIG_INTEGER, write_big_integer, read_big_integer),
        (TypeTag::BigDecimal, code::BIG_DECIMAL, write_big_decimal, read_big_decimal),
        (TypeTag::List, code::LIST, write_list, read_list),
        (TypeTag::Set, code::SET, write_list, read_list),
        (TypeTag::Map, code::MAP, write_map, read_map),
        (TypeTag::Vertex, code::VERTEX, write_vertex, read_vertex),
        (TypeTag::Edge, code::EDGE, write_edge, read_edge),
        (TypeTag::Path, code::PATH, write_path, read_path),
        (TypeTag::Property, code::PROPERTY, write_property, read_property),
        (TypeTag::Bytecode, code::BYTECODE, write_bytecode, read_bytecode),
        (TypeTag::Lambda, code::LAMBDA, write_lambda, read_lambda),
    ];
    for (tag, code, encode, decode) in core {
        registry.register(tag, BinaryTypeId::Core(code), encode, decode);
    }
    if let Some(custom) = CustomTypes::installed() {
        for name in custom.names() {
            register_custom_type(&mut registry, name);
        }
    }
    registry
}

/// Registers an extension type whose body is its fully-qualified payload.
pub fn register_custom_type(registry: &mut SerializerRegistry<BinaryFamily>, name: &str) {
    registry.register(
        TypeTag::Custom(name.to_string()),
        BinaryTypeId::Custom(name.to_string()),
        write_custom,
        read_custom,
    );
}

/// GraphBinary v4 message serializer.
#[derive(Debug, Clone)]
pub struct GraphBinarySerializer {
    registry: Arc<SerializerRegistry<BinaryFamily>>,
}

impl GraphBinarySerializer {
    pub fn new() -> Self {
        Self::with_registry(default_registry())
    }

    pub fn with_registry(registry: Arc<SerializerRegistry<BinaryFamily>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SerializerRegistry<BinaryFamily> {
        &self.registry
    }

    /// Writes one fully-qualified value.
    pub fn write_value(&self, value: &Value, buf: &mut BytesMut) -> Result<(), SerializationError> {
        if value.is_null() {
            buf.put_u8(code::UNSPECIFIED_NULL);
            buf.put_u8(FLAG_NULL);
            return Ok(());
        }

        let tag = value.tag();
        let rule = self.registry.rule(&tag)?;
        match &rule.id {
            BinaryTypeId::Core(code) => buf.put_u8(*code),
            BinaryTypeId::Custom(name) => {
                buf.put_u8(code::CUSTOM);
                put_string(buf, name)?;
            }
        }
        buf.put_u8(FLAG_PRESENT);

        let mark = buf.len();
        let first = match (rule.encode)(value, buf, self) {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        tracing::debug!("[graphbinary] Primary encoder for {} failed: {}", tag, first);
        for encode in &rule.fallbacks {
            buf.truncate(mark);
            if encode(value, buf, self).is_ok() {
                return Ok(());
            }
        }
        buf.truncate(mark);
        Err(first)
    }

    /// Reads one fully-qualified value.
    pub fn read_value(&self, buf: &mut Bytes) -> Result<Value, SerializationError> {
        self.read_nested(buf, 0)
    }

    /// Reads a value nested `depth` containers deep.
    fn read_nested(&self, buf: &mut Bytes, depth: usize) -> Result<Value, SerializationError> {
        if depth > MAX_DEPTH {
            return Err(SerializationError::malformed(
                "value",
                format!("nesting exceeds {MAX_DEPTH}"),
            ));
        }
        let type_code = get_u8(buf)?;
        let id = if type_code == code::CUSTOM {
            BinaryTypeId::Custom(get_string(buf)?)
        } else {
            BinaryTypeId::Core(type_code)
        };
        match get_u8(buf)? {
            FLAG_NULL => return Ok(Value::Null),
            FLAG_PRESENT if type_code == code::UNSPECIFIED_NULL => {
                return Err(SerializationError::malformed(
                    "value",
                    "unspecified null must carry the null flag",
                ))
            }
            FLAG_PRESENT => {}
            flag => {
                return Err(SerializationError::malformed(
                    "value",
                    format!("invalid value flag {flag:#04x}"),
                ))
            }
        }
        let tag = self
            .registry
            .tag_for(&id)
            .ok_or_else(|| SerializationError::UnknownTypeId(id.to_string()))?;
        let rule = self.registry.rule(tag)?;
        (rule.decode)(tag, buf, self, depth + 1)
    }

    fn write_attributes(
        &self,
        attributes: &BTreeMap<String, TypedValue>,
        buf: &mut BytesMut,
    ) -> Result<(), SerializationError> {
        put_len(buf, attributes.len())?;
        for (key, value) in attributes {
            put_string(buf, key)?;
            self.write_value(value.get(), buf)?;
        }
        Ok(())
    }

    fn read_attributes(
        &self,
        buf: &mut Bytes,
    ) -> Result<BTreeMap<String, TypedValue>, SerializationError> {
        let count = get_len(buf)?;
        let mut attributes = BTreeMap::new();
        for _ in 0..count {
            let key = get_string(buf)?;
            let value = TypedValue::literal(self.read_value(buf)?)?;
            attributes.insert(key, value);
        }
        Ok(attributes)
    }
}

impl Default for GraphBinarySerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageSerializer for GraphBinarySerializer {
    fn mime_type(&self) -> &'static str {
        MIME_GRAPHBINARY_V4
    }

    fn mime_types_supported(&self) -> &'static [&'static str] {
        SUPPORTED_MIME_TYPES
    }

    fn header(&self) -> &'static [u8] {
        header::cached(&HEADER, MIME_GRAPHBINARY_V4)
    }

    fn write_request(
        &self,
        request: &RequestMessage,
        buf: &mut BytesMut,
    ) -> Result<(), SerializationError> {
        buf.put_u8(GRAPHBINARY_VERSION);
        put_string(buf, &request.request_id)?;
        put_string(buf, &request.op)?;
        put_string(buf, &request.gremlin_type)?;
        self.write_attributes(&request.args, buf)
    }

    fn read_request(&self, payload: &[u8]) -> Result<RequestMessage, SerializationError> {
        let mut buf = Bytes::copy_from_slice(payload);
        check_version(&mut buf)?;
        let request = RequestMessage {
            request_id: get_string(&mut buf)?,
            op: get_string(&mut buf)?,
            gremlin_type: get_string(&mut buf)?,
            args: self.read_attributes(&mut buf)?,
        };
        check_consumed(&buf)?;
        Ok(request)
    }

    fn write_response(
        &self,
        response: &ResponseMessage,
        buf: &mut BytesMut,
    ) -> Result<(), SerializationError> {
        buf.put_u8(GRAPHBINARY_VERSION);
        put_nullable_string(buf, response.request_id())?;
        buf.put_i32(i32::from(response.code().as_u16()));
        match response.status() {
            ResponseStatus::Success(_) => {
                put_nullable_string(buf, None)?;
                put_nullable_string(buf, None)?;
            }
            ResponseStatus::Error(record) => {
                put_nullable_string(buf, Some(record.message()))?;
                put_nullable_string(buf, Some(record.kind().as_str()))?;
            }
        }
        self.write_attributes(response.meta(), buf)?;
        match response.result() {
            Some(items) => {
                buf.put_u8(FLAG_PRESENT);
                put_len(buf, items.len())?;
                for item in items {
                    self.write_value(item.get(), buf)?;
                }
            }
            None => buf.put_u8(FLAG_NULL),
        }
        Ok(())
    }

    fn read_response(&self, payload: &[u8]) -> Result<ResponseMessage, SerializationError> {
        let mut buf = Bytes::copy_from_slice(payload);
        check_version(&mut buf)?;
        let request_id = get_nullable_string(&mut buf)?;
        let raw_code = get_i32(&mut buf)?;
        let code = u16::try_from(raw_code)
            .ok()
            .and_then(StatusCode::from_u16)
            .ok_or_else(|| {
                SerializationError::malformed("status", format!("unknown code {raw_code}"))
            })?;
        let message = get_nullable_string(&mut buf)?;
        let exception = get_nullable_string(&mut buf)?;
        let status = if let Some(code) = SuccessCode::new(code) {
            ResponseStatus::Success(code)
        } else {
            let kind = exception.ok_or(SerializationError::MissingField("exception"))?;
            ResponseStatus::Error(ErrorRecord::new(
                code,
                message.unwrap_or_default(),
                ErrorKind::from(kind.as_str()),
            ))
        };
        let meta = self.read_attributes(&mut buf)?;
        let result = match get_u8(&mut buf)? {
            FLAG_NULL => None,
            FLAG_PRESENT => {
                let count = get_len(&mut buf)?;
                let mut items = Vec::with_capacity(count.min(buf.remaining()));
                for _ in 0..count {
                    items.push(TypedValue::literal(self.read_value(&mut buf)?)?);
                }
                Some(items)
            }
            flag => {
                return Err(SerializationError::malformed(
                    "result",
                    format!("invalid result flag {flag:#04x}"),
                ))
            }
        };
        check_consumed(&buf)?;
        Ok(ResponseMessage::from_parts(request_id, status, meta, result))
    }
}

// ============================================================================
// Primitive helpers
// ============================================================================

fn need(buf: &Bytes, n: usize) -> Result<(), SerializationError> {
    if buf.remaining() < n {
        return Err(SerializationError::UnexpectedEof {
            needed: n - buf.remaining(),
        });
    }
    Ok(())
}

fn get_u8(buf: &mut Bytes) -> Result<u8, SerializationError> {
    need(buf, 1)?;
    Ok(buf.get_u8())
}

fn get_i32(buf: &mut Bytes) -> Result<i32, SerializationError> {
    need(buf, 4)?;
    Ok(buf.get_i32())
}

fn get_i64(buf: &mut Bytes) -> Result<i64, SerializationError> {
    need(buf, 8)?;
    Ok(buf.get_i64())
}

/// Reads a non-negative `i32` length or count.
fn get_len(buf: &mut Bytes) -> Result<usize, SerializationError> {
    let len = get_i32(buf)?;
    usize::try_from(len)
        .map_err(|_| SerializationError::malformed("length", format!("negative length {len}")))
}

fn put_len(buf: &mut BytesMut, len: usize) -> Result<(), SerializationError> {
    let len = i32::try_from(len)
        .map_err(|_| SerializationError::malformed("length", format!("{len} exceeds i32")))?;
    buf.put_i32(len);
    Ok(())
}

fn get_bytes(buf: &mut Bytes) -> Result<Bytes, SerializationError> {
    let len = get_len(buf)?;
    need(buf, len)?;
    Ok(buf.split_to(len))
}

fn get_string(buf: &mut Bytes) -> Result<String, SerializationError> {
    let bytes = get_bytes(buf)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| SerializationError::InvalidUtf8)
}

fn put_string(buf: &mut BytesMut, s: &str) -> Result<(), SerializationError> {
    put_len(buf, s.len())?;
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn get_nullable_string(buf: &mut Bytes) -> Result<Option<String>, SerializationError> {
    match get_u8(buf)? {
        FLAG_NULL => Ok(None),
        FLAG_PRESENT => get_string(buf).map(Some),
        flag => Err(SerializationError::malformed(
            "string",
            format!("invalid value flag {flag:#04x}"),
        )),
    }
}

fn put_nullable_string(buf: &mut BytesMut, s: Option<&str>) -> Result<(), SerializationError> {
    match s {
        Some(s) => {
            buf.put_u8(FLAG_PRESENT);
            put_string(buf, s)
        }
        None => {
            buf.put_u8(FLAG_NULL);
            Ok(())
        }
    }
}

fn check_version(buf: &mut Bytes) -> Result<(), SerializationError> {
    match get_u8(buf)? {
        GRAPHBINARY_VERSION => Ok(()),
        other => Err(SerializationError::UnsupportedVersion(other)),
    }
}

fn check_consumed(buf: &Bytes) -> Result<(), SerializationError> {
    if buf.has_remaining() {
        return Err(SerializationError::malformed(
            "message",
            format!("{} trailing bytes", buf.remaining()),
        ));
    }
    Ok(())
}

fn mismatch(expected: TypeTag, value: &Value) -> SerializationError {
    ValueError::TypeMismatch {
        expected,
        actual: value.tag(),
    }
    .into()
}

// ============================================================================
// Core type rules
// ============================================================================

fn write_int(value: &Value, buf: &mut BytesMut, _: &GraphBinarySerializer) -> Result<(), SerializationError> {
    let Value::Integer(i) = value else {
        return Err(mismatch(TypeTag::Integer, value));
    };
    buf.put_i32(*i);
    Ok(())
}

fn read_int(_: &TypeTag, buf: &mut Bytes, _: &GraphBinarySerializer, _: usize) -> Result<Value, SerializationError> {
    get_i32(buf).map(Value::Integer)
}

fn write_long(value: &Value, buf: &mut BytesMut, _: &GraphBinarySerializer) -> Result<(), SerializationError> {
    let Value::Long(l) = value else {
        return Err(mismatch(TypeTag::Long, value));
    };
    buf.put_i64(*l);
    Ok(())
}

fn read_long(_: &TypeTag, buf: &mut Bytes, _: &GraphBinarySerializer, _: usize) -> Result<Value, SerializationError> {
    get_i64(buf).map(Value::Long)
}

fn write_str(value: &Value, buf: &mut BytesMut, _: &GraphBinarySerializer) -> Result<(), SerializationError> {
    let Value::String(s) = value else {
        return Err(mismatch(TypeTag::String, value));
    };
    put_string(buf, s)
}

fn read_str(_: &TypeTag, buf: &mut Bytes, _: &GraphBinarySerializer, _: usize) -> Result<Value, SerializationError> {
    get_string(buf).map(Value::String)
}

fn write_double(value: &Value, buf: &mut BytesMut, _: &GraphBinarySerializer) -> Result<(), SerializationError> {
    let Value::Double(d) = value else {
        return Err(mismatch(TypeTag::Double, value));
    };
    buf.put_f64(*d);
    Ok(())
}

fn read_double(_: &TypeTag, buf: &mut Bytes, _: &GraphBinarySerializer, _: usize) -> Result<Value, SerializationError> {
    need(buf, 8)?;
    Ok(Value::Double(buf.get_f64()))
}

fn write_bool(value: &Value, buf: &mut BytesMut, _: &GraphBinarySerializer) -> Result<(), SerializationError> {
    let Value::Boolean(b) = value else {
        return Err(mismatch(TypeTag::Boolean, value));
    };
    buf.put_u8(u8::from(*b));
    Ok(())
}

fn read_bool(_: &TypeTag, buf: &mut Bytes, _: &GraphBinarySerializer, _: usize) -> Result<Value, SerializationError> {
    match get_u8(buf)? {
        0x00 => Ok(Value::Boolean(false)),
        0x01 => Ok(Value::Boolean(true)),
        other => Err(SerializationError::malformed(
            "boolean",
            format!("invalid byte {other:#04x}"),
        )),
    }
}

/// Two's-complement big-endian bytes with an `i32` length prefix.
fn put_big_int(buf: &mut BytesMut, b: &BigInt) -> Result<(), SerializationError> {
    let bytes = b.to_signed_bytes_be();
    put_len(buf, bytes.len())?;
    buf.put_slice(&bytes);
    Ok(())
}

fn get_big_int(buf: &mut Bytes) -> Result<BigInt, SerializationError> {
    let bytes = get_bytes(buf)?;
    Ok(BigInt::from_signed_bytes_be(&bytes))
}

fn write_big_integer(value: &Value, buf: &mut BytesMut, _: &GraphBinarySerializer) -> Result<(), SerializationError> {
    let Value::BigInteger(b) = value else {
        return Err(mismatch(TypeTag::BigInteger, value));
    };
    put_big_int(buf, b)
}

fn read_big_integer(_: &TypeTag, buf: &mut Bytes, _: &GraphBinarySerializer, _: usize) -> Result<Value, SerializationError> {
    get_big_int(buf).map(Value::BigInteger)
}

fn write_big_decimal(value: &Value, buf: &mut BytesMut, _: &GraphBinarySerializer) -> Result<(), SerializationError> {
    let Value::BigDecimal(d) = value else {
        return Err(mismatch(TypeTag::BigDecimal, value));
    };
    buf.put_i32(d.scale());
    put_big_int(buf, d.unscaled())
}

fn read_big_decimal(_: &TypeTag, buf: &mut Bytes, _: &GraphBinarySerializer, _: usize) -> Result<Value, SerializationError> {
    let scale = get_i32(buf)?;
    let unscaled = get_big_int(buf)?;
    Ok(Value::BigDecimal(BigDecimal::new(unscaled, scale)))
}

fn write_values(
    items: &[Value],
    buf: &mut BytesMut,
    s: &GraphBinarySerializer,
) -> Result<(), SerializationError> {
    put_len(buf, items.len())?;
    for item in items {
        s.write_value(item, buf)?;
    }
    Ok(())
}

fn read_values(
    buf: &mut Bytes,
    s: &GraphBinarySerializer,
    depth: usize,
) -> Result<Vec<Value>, SerializationError> {
    let count = get_len(buf)?;
    // Every value takes at least two bytes; cap the up-front allocation.
    let mut items = Vec::with_capacity(count.min(buf.remaining() / 2));
    for _ in 0..count {
        items.push(s.read_nested(buf, depth)?);
    }
    Ok(items)
}

fn write_list(value: &Value, buf: &mut BytesMut, s: &GraphBinarySerializer) -> Result<(), SerializationError> {
    match value {
        Value::List(items) | Value::Set(items) => write_values(items, buf, s),
        _ => Err(mismatch(TypeTag::List, value)),
    }
}

fn read_list(tag: &TypeTag, buf: &mut Bytes, s: &GraphBinarySerializer, depth: usize) -> Result<Value, SerializationError> {
    let items = read_values(buf, s, depth)?;
    Ok(match tag {
        TypeTag::Set => Value::Set(items),
        _ => Value::List(items),
    })
}

fn write_map(value: &Value, buf: &mut BytesMut, s: &GraphBinarySerializer) -> Result<(), SerializationError> {
    let Value::Map(entries) = value else {
        return Err(mismatch(TypeTag::Map, value));
    };
    put_len(buf, entries.len())?;
    for (k, v) in entries {
        s.write_value(k, buf)?;
        s.write_value(v, buf)?;
    }
    Ok(())
}

fn read_map(_: &TypeTag, buf: &mut Bytes, s: &GraphBinarySerializer, depth: usize) -> Result<Value, SerializationError> {
    let count = get_len(buf)?;
    let mut entries = Vec::with_capacity(count.min(buf.remaining() / 4));
    for _ in 0..count {
        let k = s.read_nested(buf, depth)?;
        let v = s.read_nested(buf, depth)?;
        entries.push((k, v));
    }
    Ok(Value::Map(entries))
}

fn write_vertex(value: &Value, buf: &mut BytesMut, s: &GraphBinarySerializer) -> Result<(), SerializationError> {
    let Value::Vertex(v) = value else {
        return Err(mismatch(TypeTag::Vertex, value));
    };
    s.write_value(&v.id, buf)?;
    put_string(buf, &v.label)
}

fn read_vertex(_: &TypeTag, buf: &mut Bytes, s: &GraphBinarySerializer, depth: usize) -> Result<Value, SerializationError> {
    let id = s.read_nested(buf, depth)?;
    let label = get_string(buf)?;
    Ok(Value::Vertex(Vertex::new(id, label)))
}

fn write_edge(value: &Value, buf: &mut BytesMut, s: &GraphBinarySerializer) -> Result<(), SerializationError> {
    let Value::Edge(e) = value else {
        return Err(mismatch(TypeTag::Edge, value));
    };
    s.write_value(&e.id, buf)?;
    put_string(buf, &e.label)?;
    s.write_value(&e.in_v.id, buf)?;
    put_string(buf, &e.in_v.label)?;
    s.write_value(&e.out_v.id, buf)?;
    put_string(buf, &e.out_v.label)
}

fn read_edge(_: &TypeTag, buf: &mut Bytes, s: &GraphBinarySerializer, depth: usize) -> Result<Value, SerializationError> {
    let id = s.read_nested(buf, depth)?;
    let label = get_string(buf)?;
    let in_v = Vertex::new(s.read_nested(buf, depth)?, get_string(buf)?);
    let out_v = Vertex::new(s.read_nested(buf, depth)?, get_string(buf)?);
    Ok(Value::Edge(Edge::new(id, label, out_v, in_v)))
}

fn write_path(value: &Value, buf: &mut BytesMut, s: &GraphBinarySerializer) -> Result<(), SerializationError> {
    let Value::Path(p) = value else {
        return Err(mismatch(TypeTag::Path, value));
    };
    let labels = Value::List(
        p.labels
            .iter()
            .map(|set| Value::Set(set.iter().map(|l| Value::from(l.as_str())).collect()))
            .collect(),
    );
    s.write_value(&labels, buf)?;
    s.write_value(&Value::List(p.objects.clone()), buf)
}

fn read_path(_: &TypeTag, buf: &mut Bytes, s: &GraphBinarySerializer, depth: usize) -> Result<Value, SerializationError> {
    let Value::List(sets) = s.read_nested(buf, depth)? else {
        return Err(SerializationError::malformed("path", "labels must be a list"));
    };
    let labels = sets
        .into_iter()
        .map(|set| match set {
            Value::Set(items) | Value::List(items) => items
                .into_iter()
                .map(|l| match l {
                    Value::String(l) => Ok(l),
                    other => Err(mismatch(TypeTag::String, &other)),
                })
                .collect::<Result<Vec<_>, _>>(),
            other => Err(mismatch(TypeTag::Set, &other)),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let Value::List(objects) = s.read_nested(buf, depth)? else {
        return Err(SerializationError::malformed("path", "objects must be a list"));
    };
    if labels.len() != objects.len() {
        return Err(SerializationError::malformed(
            "path",
            "labels and objects differ in length",
        ));
    }
    Ok(Value::Path(Path { labels, objects }))
}

fn write_property(value: &Value, buf: &mut BytesMut, s: &GraphBinarySerializer) -> Result<(), SerializationError> {
    let Value::Property(p) = value else {
        return Err(mismatch(TypeTag::Property, value));
    };
    put_string(buf, &p.key)?;
    s.write_value(&p.value, buf)
}

fn read_property(_: &TypeTag, buf: &mut Bytes, s: &GraphBinarySerializer, depth: usize) -> Result<Value, SerializationError> {
    let key = get_string(buf)?;
    let value = s.read_nested(buf, depth)?;
    Ok(Value::Property(Property::new(key, value)))
}

fn write_instructions(
    instructions: &[Instruction],
    buf: &mut BytesMut,
    s: &GraphBinarySerializer,
) -> Result<(), SerializationError> {
    put_len(buf, instructions.len())?;
    for instruction in instructions {
        put_string(buf, &instruction.operator)?;
        write_values(&instruction.arguments, buf, s)?;
    }
    Ok(())
}

fn read_instructions(
    buf: &mut Bytes,
    s: &GraphBinarySerializer,
    depth: usize,
) -> Result<Vec<Instruction>, SerializationError> {
    let count = get_len(buf)?;
    let mut instructions = Vec::with_capacity(count.min(buf.remaining() / 8));
    for _ in 0..count {
        let operator = get_string(buf)?;
        let arguments = read_values(buf, s, depth)?;
        instructions.push(Instruction::new(operator, arguments));
    }
    Ok(instructions)
}

fn write_bytecode(value: &Value, buf: &mut BytesMut, s: &GraphBinarySerializer) -> Result<(), SerializationError> {
    let Value::Bytecode(b) = value else {
        return Err(mismatch(TypeTag::Bytecode, value));
    };
    write_instructions(&b.steps, buf, s)?;
    write_instructions(&b.sources, buf, s)
}

fn read_bytecode(_: &TypeTag, buf: &mut Bytes, s: &GraphBinarySerializer, depth: usize) -> Result<Value, SerializationError> {
    let steps = read_instructions(buf, s, depth)?;
    let sources = read_instructions(buf, s, depth)?;
    Ok(Value::Bytecode(Bytecode { sources, steps }))
}

fn write_lambda(value: &Value, buf: &mut BytesMut, _: &GraphBinarySerializer) -> Result<(), SerializationError> {
    let Value::Lambda(l) = value else {
        return Err(mismatch(TypeTag::Lambda, value));
    };
    put_string(buf, &l.language)?;
    put_string(buf, &l.script)?;
    buf.put_i32(l.arguments);
    Ok(())
}

fn read_lambda(_: &TypeTag, buf: &mut Bytes, _: &GraphBinarySerializer, _: usize) -> Result<Value, SerializationError> {
    let language = get_string(buf)?;
    let script = get_string(buf)?;
    let arguments = get_i32(buf)?;
    Ok(Value::Lambda(Lambda {
        script,
        language,
        arguments,
    }))
}

fn write_custom(value: &Value, buf: &mut BytesMut, s: &GraphBinarySerializer) -> Result<(), SerializationError> {
    match value {
        Value::Custom(c) => s.write_value(&c.payload, buf),
        _ => Err(SerializationError::malformed(
            "custom",
            format!("{} is not an extension value", value.tag()),
        )),
    }
}

fn read_custom(tag: &TypeTag, buf: &mut Bytes, s: &GraphBinarySerializer, depth: usize) -> Result<Value, SerializationError> {
    match tag {
        TypeTag::Custom(name) => Ok(Value::Custom(CustomValue::new(
            name.as_str(),
            s.read_nested(buf, depth)?,
        ))),
        other => Err(SerializationError::malformed(
            "custom",
            format!("{other} is not an extension type"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{install_custom_types, point, POINT_TYPE};
    use proptest::prelude::*;

    fn serializer() -> GraphBinarySerializer {
        GraphBinarySerializer::with_registry(Arc::new(base_registry()))
    }

    fn encode(s: &GraphBinarySerializer, value: &Value) -> Vec<u8> {
        let mut buf = BytesMut::new();
        s.write_value(value, &mut buf).unwrap();
        buf.to_vec()
    }

    fn decode(s: &GraphBinarySerializer, data: &[u8]) -> Result<Value, SerializationError> {
        let mut buf = Bytes::copy_from_slice(data);
        let value = s.read_value(&mut buf)?;
        assert!(buf.is_empty(), "{} bytes left over", buf.len());
        Ok(value)
    }

    #[test]
    fn test_fully_qualified_layout() {
        let s = serializer();
        assert_eq!(encode(&s, &Value::Integer(1)), [0x01, 0x00, 0, 0, 0, 1]);
        assert_eq!(
            encode(&s, &Value::Long(-1)),
            [0x02, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
        assert_eq!(encode(&s, &Value::from("ab")), [0x03, 0x00, 0, 0, 0, 2, b'a', b'b']);
        assert_eq!(encode(&s, &Value::Boolean(true)), [0x27, 0x00, 0x01]);
        assert_eq!(encode(&s, &Value::Null), [0xfe, 0x01]);
        assert_eq!(
            encode(&s, &Value::List(vec![Value::Integer(7)])),
            [0x09, 0x00, 0, 0, 0, 1, 0x01, 0x00, 0, 0, 0, 7]
        );
    }

    #[test]
    fn test_typed_null_reads_as_null() {
        let s = serializer();
        assert_eq!(decode(&s, &[0x01, 0x01]).unwrap(), Value::Null);
        assert_eq!(decode(&s, &[0x03, 0x01]).unwrap(), Value::Null);
        let typed_null = decode(&s, &[0x01, 0x01]).unwrap();
        assert_eq!(encode(&s, &typed_null), [0xfe, 0x01]);
        assert!(decode(&s, &[0xfe, 0x00]).is_err());
        assert!(decode(&s, &[0x01, 0x02, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn test_integer_boundaries() {
        let s = serializer();
        for v in [i32::MIN, -1, 0, i32::MAX] {
            assert_eq!(decode(&s, &encode(&s, &Value::Integer(v))).unwrap(), Value::Integer(v));
        }
        for v in [i64::MIN, i64::MAX] {
            assert_eq!(decode(&s, &encode(&s, &Value::Long(v))).unwrap(), Value::Long(v));
        }
    }

    #[test]
    fn test_big_numbers() {
        let s = serializer();
        for text in ["0", "-1", "127", "128", "-129", "340282366920938463463374607431768211456"] {
            let value = Value::BigInteger(text.parse().unwrap());
            assert_eq!(decode(&s, &encode(&s, &value)).unwrap(), value, "{text}");
        }
        assert_eq!(
            encode(&s, &Value::BigInteger(BigInt::from(128))),
            [0x23, 0x00, 0, 0, 0, 2, 0x00, 0x80]
        );

        let d: BigDecimal = "-3.14159".parse().unwrap();
        let value = Value::BigDecimal(d);
        assert_eq!(decode(&s, &encode(&s, &value)).unwrap(), value);
    }

    #[test]
    fn test_big_decimal_extreme_scale() {
        let s = serializer();
        for scale in [i32::MIN, -100_000_000, 0, 100_000_000, i32::MAX] {
            let value = Value::BigDecimal(BigDecimal::new(BigInt::from(1), scale));
            let bytes = encode(&s, &value);
            assert_eq!(bytes.len(), 11);
            let decoded = decode(&s, &bytes).unwrap();
            assert!(decoded.to_string().len() < 16, "scale {scale}");
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn test_long_string() {
        let s = serializer();
        let value = Value::String("x".repeat(1 << 20));
        assert_eq!(decode(&s, &encode(&s, &value)).unwrap(), value);

        // A maximal declared length with no body fails without allocating it.
        assert!(matches!(
            decode(&s, &[0x03, 0x00, 0x7f, 0xff, 0xff, 0xff, b'a']),
            Err(SerializationError::UnexpectedEof { .. })
        ));
    }

    fn nested(levels: usize) -> Value {
        (0..levels).fold(Value::Integer(1), |inner, _| Value::List(vec![inner]))
    }

    #[test]
    fn test_nesting_limit() {
        let s = serializer();
        let deepest = nested(MAX_DEPTH);
        assert_eq!(decode(&s, &encode(&s, &deepest)).unwrap(), deepest);

        assert!(matches!(
            decode(&s, &encode(&s, &nested(MAX_DEPTH + 1))),
            Err(SerializationError::Malformed { .. })
        ));
    }

    #[test]
    fn test_deeply_nested_headers_rejected() {
        let s = serializer();
        let mut data = Vec::new();
        for _ in 0..200_000 {
            data.extend_from_slice(&[code::LIST, FLAG_PRESENT, 0, 0, 0, 1]);
        }
        data.extend_from_slice(&[code::INTEGER, FLAG_PRESENT, 0, 0, 0, 1]);
        let mut buf = Bytes::from(data);
        assert!(matches!(
            s.read_value(&mut buf),
            Err(SerializationError::Malformed { .. })
        ));
    }

    #[test]
    fn test_truncated_input() {
        let s = serializer();
        let full = encode(&s, &Value::from("hello"));
        for len in 0..full.len() {
            assert!(matches!(
                decode(&s, &full[..len]),
                Err(SerializationError::UnexpectedEof { .. })
            ));
        }
    }

    #[test]
    fn test_negative_length_rejected() {
        let s = serializer();
        assert!(matches!(
            decode(&s, &[0x03, 0x00, 0xff, 0xff, 0xff, 0xff]),
            Err(SerializationError::Malformed { .. })
        ));
    }

    #[test]
    fn test_unknown_type_code() {
        let s = serializer();
        assert!(matches!(
            decode(&s, &[0x42, 0x00]),
            Err(SerializationError::UnknownTypeId(ref id)) if id == "0x42"
        ));
    }

    #[test]
    fn test_unregistered_tag_fails() {
        let s = GraphBinarySerializer::with_registry(Arc::new(SerializerRegistry::new()));
        let mut buf = BytesMut::new();
        assert!(matches!(
            s.write_value(&Value::Integer(1), &mut buf),
            Err(SerializationError::UnregisteredType(TypeTag::Integer))
        ));
    }

    #[test]
    fn test_graph_elements() {
        let s = serializer();
        let v = Value::from(Vertex::new(1i64, "person"));
        let e = Value::from(Edge::new(
            9,
            "created",
            Vertex::new(1i64, "person"),
            Vertex::new(3i64, "software"),
        ));
        let p = Value::from(Path {
            labels: vec![vec!["a".into(), "b".into()], vec![]],
            objects: vec![v.clone(), Value::from("lop")],
        });
        let prop = Value::from(Property::new("weight", 0.4));
        for value in [v, e, p, prop] {
            assert_eq!(decode(&s, &encode(&s, &value)).unwrap(), value);
        }
    }

    #[test]
    fn test_bytecode_and_lambda() {
        let s = serializer();
        let lambda = Lambda {
            script: "x -> x.get()".into(),
            language: "gremlin-lang".into(),
            arguments: 1,
        };
        let bytecode = Bytecode::new()
            .with_source("withSack", vec![Value::Integer(1)])
            .with_step("V", vec![])
            .with_step("map", vec![lambda.into()]);
        let value = Value::from(bytecode);
        assert_eq!(decode(&s, &encode(&s, &value)).unwrap(), value);
    }

    #[test]
    fn test_custom_type() {
        install_custom_types();
        let mut registry = base_registry();
        register_custom_type(&mut registry, POINT_TYPE);
        let s = GraphBinarySerializer::with_registry(Arc::new(registry));

        let value = point(3, 4);
        let bytes = encode(&s, &value);
        assert_eq!(bytes[0], code::CUSTOM);
        assert_eq!(&bytes[1..5], &[0, 0, 0, POINT_TYPE.len() as u8]);
        assert_eq!(decode(&s, &bytes).unwrap(), value);

        // Unknown to a registry without the extension.
        assert!(matches!(
            decode(&serializer_without_custom(), &bytes),
            Err(SerializationError::UnknownTypeId(ref id)) if id == POINT_TYPE
        ));
    }

    fn serializer_without_custom() -> GraphBinarySerializer {
        let mut registry = SerializerRegistry::new();
        registry.register(TypeTag::List, BinaryTypeId::Core(code::LIST), write_list as BinaryEncoder, read_list as BinaryDecoder);
        GraphBinarySerializer::with_registry(Arc::new(registry))
    }

    fn failing(_: &Value, buf: &mut BytesMut, _: &GraphBinarySerializer) -> Result<(), SerializationError> {
        buf.put_slice(b"garbage");
        Err(SerializationError::malformed("integer", "primary disabled"))
    }

    #[test]
    fn test_fallback_discards_partial_output() {
        let mut registry = base_registry();
        registry.register(TypeTag::Integer, BinaryTypeId::Core(code::INTEGER), failing as BinaryEncoder, read_int as BinaryDecoder);
        registry.register_fallback(&TypeTag::Integer, write_int).unwrap();
        let s = GraphBinarySerializer::with_registry(Arc::new(registry));

        assert_eq!(encode(&s, &Value::Integer(5)), [0x01, 0x00, 0, 0, 0, 5]);
    }

    #[test]
    fn test_eval_request_roundtrip() {
        let s = serializer();
        let request = RequestMessage::eval("g.V(x).out()")
            .with_id("r1")
            .with_binding("x", 1)
            .unwrap();
        let bytes = s.serialize_request(&request).unwrap();
        assert_eq!(bytes[0], 14);
        assert_eq!(&bytes[1..15], b"graphbinary-v4");
        assert_eq!(bytes[15], GRAPHBINARY_VERSION);
        assert_eq!(s.deserialize_request(&bytes).unwrap(), request);
    }

    #[test]
    fn test_request_version_checked() {
        let s = serializer();
        let mut buf = BytesMut::new();
        s.write_request(&RequestMessage::eval("1").with_id("r1"), &mut buf)
            .unwrap();
        buf[0] = 0x81;
        assert!(matches!(
            s.read_request(&buf),
            Err(SerializationError::UnsupportedVersion(0x81))
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let s = serializer();
        let mut buf = BytesMut::new();
        s.write_request(&RequestMessage::eval("1").with_id("r1"), &mut buf)
            .unwrap();
        buf.put_u8(0);
        assert!(s.read_request(&buf).is_err());
    }

    #[test]
    fn test_response_roundtrip() {
        let s = serializer();
        let success = ResponseMessage::build_response("r1", vec![TypedValue::integer(1)])
            .with_meta("bulked", TypedValue::boolean(false));
        let partial = ResponseMessage::partial_response("r1", vec![TypedValue::string("a")]);
        let error = ResponseMessage::build_error_response(
            Some("r1".into()),
            ErrorRecord::too_many_bindings(20, 16),
        );
        let anonymous = ResponseMessage::build_error_response(None, ErrorRecord::binding());
        for response in [success, partial, error, anonymous] {
            let mut buf = BytesMut::new();
            s.write_response(&response, &mut buf).unwrap();
            assert_eq!(s.read_response(&buf).unwrap(), response);
        }
    }

    fn binary_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            any::<i32>().prop_map(Value::Integer),
            any::<i64>().prop_map(Value::Long),
            any::<bool>().prop_map(Value::Boolean),
            any::<f64>()
                .prop_filter("NaN never compares equal", |d| !d.is_nan())
                .prop_map(Value::Double),
            ".{0,16}".prop_map(Value::String),
            any::<i128>().prop_map(|i| Value::BigInteger(BigInt::from(i))),
            Just(Value::Null),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Set),
                prop::collection::vec((inner.clone(), inner), 0..3).prop_map(Value::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_value_roundtrip(value in binary_value()) {
            let s = serializer();
            let bytes = encode(&s, &value);
            prop_assert_eq!(decode(&s, &bytes).unwrap(), value);
        }

        #[test]
        fn prop_garbage_never_panics(data in prop::collection::vec(any::<u8>(), 0..1024)) {
            let s = serializer();
            let mut buf = Bytes::from(data);
            let _ = s.read_value(&mut buf);
        }

        #[test]
        fn prop_garbage_after_nested_headers_never_panics(
            levels in 0usize..1000,
            tail in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let s = serializer();
            let mut data = Vec::new();
            for _ in 0..levels {
                data.extend_from_slice(&[code::MAP, FLAG_PRESENT, 0, 0, 0, 1]);
            }
            data.extend_from_slice(&tail);
            let mut buf = Bytes::from(data);
            let _ = s.read_value(&mut buf);
        }
    }
}
