//! GraphSON v4 text codec.
//!
//! Values are written as JSON. Strings, booleans and null are native JSON;
//! every other type is wrapped as `{"@type": "<id>", "@value": <payload>}`.
//! Numbers that do not fit a JSON double (big integers and decimals) travel
//! as decimal strings, and non-finite doubles as `"NaN"`, `"Infinity"` and
//! `"-Infinity"`.

use super::MessageSerializer;
use crate::error::{SerializationError, ValueError};
use crate::header::{self, MIME_GRAPHSON_V4, MIME_GRAPHSON_V4_FULL, MIME_JSON};
use crate::message::{RequestMessage, ResponseMessage, ResponseStatus, SuccessCode};
use crate::registry::{SerializerRegistry, WireFamily};
use crate::status::{ErrorKind, ErrorRecord, StatusCode};
use crate::value::{
    BigDecimal, Bytecode, CustomTypes, CustomValue, Edge, Instruction, Lambda, Path, Property,
    TypeTag, TypedValue, Value, Vertex,
};
use bytes::{Bytes, BytesMut};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// Encodes one value into its `@value` payload.
pub type TextEncoder = fn(&Value, &GraphSonSerializer) -> Result<Json, SerializationError>;
/// Decodes an `@value` payload into a value of the given type.
pub type TextDecoder = fn(&TypeTag, &Json, &GraphSonSerializer) -> Result<Value, SerializationError>;

/// GraphSON wire family: `@type` strings and JSON payloads.
#[derive(Debug)]
pub struct TextFamily;

impl WireFamily for TextFamily {
    type Id = String;
    type Encoder = TextEncoder;
    type Decoder = TextDecoder;
    const NAME: &'static str = "graphson";
}

static DEFAULT_REGISTRY: OnceLock<Arc<SerializerRegistry<TextFamily>>> = OnceLock::new();
static HEADER: OnceLock<Bytes> = OnceLock::new();

const SUPPORTED_MIME_TYPES: &[&str] = &[MIME_GRAPHSON_V4, MIME_GRAPHSON_V4_FULL, MIME_JSON];

/// Shared process-wide registry, built on first use.
pub fn default_registry() -> Arc<SerializerRegistry<TextFamily>> {
    DEFAULT_REGISTRY.get_or_init(|| Arc::new(base_registry())).clone()
}

/// A fresh registry with every core type plus the installed custom types.
pub fn base_registry() -> SerializerRegistry<TextFamily> {
    let mut registry = SerializerRegistry::new();
    let core: [(TypeTag, &str, TextEncoder, TextDecoder); 14] = [
        (TypeTag::Integer, "g:Int32", write_int, read_int),
        (TypeTag::Long, "g:Int64", write_long, read_long),
        (TypeTag::Double, "g:Double", write_double, read_double),
        (TypeTag::BigInteger, "g:BigInteger", write_big_integer, read_big_integer),
        (TypeTag::BigDecimal, "g:BigDecimal", write_big_decimal, read_big_decimal),
        (TypeTag::List, "g:List", write_list, read_list),
        (TypeTag::Set, "g:Set", write_list, read_list),
        (TypeTag::Map, "g:Map", write_map, read_map),
        (TypeTag::Vertex, "g:Vertex", write_vertex, read_vertex),
        (TypeTag::Edge, "g:Edge", write_edge, read_edge),
        (TypeTag::Path, "g:Path", write_path, read_path),
        (TypeTag::Property, "g:Property", write_property, read_property),
        (TypeTag::Bytecode, "g:Bytecode", write_bytecode, read_bytecode),
        (TypeTag::Lambda, "g:Lambda", write_lambda, read_lambda),
    ];
    for (tag, id, encode, decode) in core {
        registry.register(tag, id.to_string(), encode, decode);
    }
    if let Some(custom) = CustomTypes::installed() {
        for name in custom.names() {
            register_custom_type(&mut registry, name);
        }
    }
    registry
}

/// Registers an extension type whose `@type` is its name and whose
/// `@value` is its payload.
pub fn register_custom_type(registry: &mut SerializerRegistry<TextFamily>, name: &str) {
    registry.register(
        TypeTag::Custom(name.to_string()),
        name.to_string(),
        write_custom,
        read_custom,
    );
}

/// GraphSON v4 message serializer.
#[derive(Debug, Clone)]
pub struct GraphSonSerializer {
    registry: Arc<SerializerRegistry<TextFamily>>,
}

impl GraphSonSerializer {
    pub fn new() -> Self {
        Self::with_registry(default_registry())
    }

    pub fn with_registry(registry: Arc<SerializerRegistry<TextFamily>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SerializerRegistry<TextFamily> {
        &self.registry
    }

    /// Writes one value in its typed JSON form.
    pub fn write_value(&self, value: &Value) -> Result<Json, SerializationError> {
        match value {
            Value::Null => return Ok(Json::Null),
            Value::String(s) => return Ok(Json::String(s.clone())),
            Value::Boolean(b) => return Ok(Json::Bool(*b)),
            _ => {}
        }

        let tag = value.tag();
        let rule = self.registry.rule(&tag)?;
        let payload = match (rule.encode)(value, self) {
            Ok(payload) => payload,
            Err(first) => {
                tracing::debug!("[graphson] Primary encoder for {} failed: {}", tag, first);
                rule.fallbacks
                    .iter()
                    .find_map(|encode| encode(value, self).ok())
                    .ok_or(first)?
            }
        };
        Ok(json!({ "@type": rule.id, "@value": payload }))
    }

    /// Reads one value from its typed JSON form.
    pub fn read_value(&self, json: &Json) -> Result<Value, SerializationError> {
        match json {
            Json::Null => Ok(Value::Null),
            Json::Bool(b) => Ok(Value::Boolean(*b)),
            Json::String(s) => Ok(Value::String(s.clone())),
            Json::Number(n) => Err(SerializationError::malformed(
                "value",
                format!("untyped number {n}"),
            )),
            Json::Array(_) => Err(SerializationError::malformed("value", "untyped array")),
            Json::Object(obj) => {
                let id = obj
                    .get("@type")
                    .and_then(Json::as_str)
                    .ok_or(SerializationError::MissingField("@type"))?;
                let payload = obj
                    .get("@value")
                    .ok_or(SerializationError::MissingField("@value"))?;
                let tag = self
                    .registry
                    .tag_for(&id.to_string())
                    .ok_or_else(|| SerializationError::UnknownTypeId(id.to_string()))?;
                let rule = self.registry.rule(tag)?;
                (rule.decode)(tag, payload, self)
            }
        }
    }

    fn write_typed(&self, value: &TypedValue) -> Result<Json, SerializationError> {
        self.write_value(value.get())
    }

    fn read_typed(&self, json: &Json) -> Result<TypedValue, SerializationError> {
        Ok(TypedValue::literal(self.read_value(json)?)?)
    }

    fn write_attributes(
        &self,
        attributes: &BTreeMap<String, TypedValue>,
    ) -> Result<Map<String, Json>, SerializationError> {
        attributes
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.write_typed(v)?)))
            .collect()
    }

    fn read_attributes(
        &self,
        attributes: &Map<String, Json>,
    ) -> Result<BTreeMap<String, TypedValue>, SerializationError> {
        attributes
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.read_typed(v)?)))
            .collect()
    }

    pub fn request_to_json(&self, request: &RequestMessage) -> Result<Json, SerializationError> {
        let envelope = RequestEnvelope {
            request_id: request.request_id.clone(),
            op: request.op.clone(),
            gremlin_type: request.gremlin_type.clone(),
            args: self.write_attributes(&request.args)?,
        };
        Ok(serde_json::to_value(envelope)?)
    }

    pub fn request_from_json(&self, json: Json) -> Result<RequestMessage, SerializationError> {
        let envelope: RequestEnvelope = serde_json::from_value(json)?;
        Ok(RequestMessage {
            request_id: envelope.request_id,
            op: envelope.op,
            gremlin_type: envelope.gremlin_type,
            args: self.read_attributes(&envelope.args)?,
        })
    }

    pub fn response_to_json(&self, response: &ResponseMessage) -> Result<Json, SerializationError> {
        let status = match response.status() {
            ResponseStatus::Success(code) => StatusEnvelope {
                code: code.get().as_u16(),
                message: None,
                exception: None,
            },
            ResponseStatus::Error(record) => StatusEnvelope {
                code: record.code().as_u16(),
                message: Some(record.message().to_string()),
                exception: Some(record.kind().as_str().to_string()),
            },
        };
        let data = match response.result() {
            Some(items) => {
                let items = items.iter().map(TypedValue::get).cloned().collect();
                self.write_value(&Value::List(items))?
            }
            None => Json::Null,
        };
        let envelope = ResponseEnvelope {
            request_id: response.request_id().map(str::to_string),
            status,
            result: ResultEnvelope {
                meta: self.write_attributes(response.meta())?,
                data,
            },
        };
        Ok(serde_json::to_value(envelope)?)
    }

    pub fn response_from_json(&self, json: Json) -> Result<ResponseMessage, SerializationError> {
        let envelope: ResponseEnvelope = serde_json::from_value(json)?;
        let code = StatusCode::from_u16(envelope.status.code).ok_or_else(|| {
            SerializationError::malformed("status", format!("unknown code {}", envelope.status.code))
        })?;
        let status = if let Some(code) = SuccessCode::new(code) {
            ResponseStatus::Success(code)
        } else {
            let kind = envelope
                .status
                .exception
                .ok_or(SerializationError::MissingField("exception"))?;
            ResponseStatus::Error(ErrorRecord::new(
                code,
                envelope.status.message.unwrap_or_default(),
                ErrorKind::from(kind.as_str()),
            ))
        };
        let result = match &envelope.result.data {
            Json::Null => None,
            data => match self.read_value(data)? {
                Value::List(items) => Some(
                    items
                        .into_iter()
                        .map(TypedValue::literal)
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                other => {
                    return Err(SerializationError::malformed(
                        "result",
                        format!("expected list, got {}", other.tag()),
                    ))
                }
            },
        };
        Ok(ResponseMessage::from_parts(
            envelope.request_id,
            status,
            self.read_attributes(&envelope.result.meta)?,
            result,
        ))
    }
}

impl Default for GraphSonSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageSerializer for GraphSonSerializer {
    fn mime_type(&self) -> &'static str {
        MIME_GRAPHSON_V4
    }

    fn mime_types_supported(&self) -> &'static [&'static str] {
        SUPPORTED_MIME_TYPES
    }

    fn header(&self) -> &'static [u8] {
        header::cached(&HEADER, MIME_GRAPHSON_V4)
    }

    fn write_request(
        &self,
        request: &RequestMessage,
        buf: &mut BytesMut,
    ) -> Result<(), SerializationError> {
        let json = self.request_to_json(request)?;
        buf.extend_from_slice(&serde_json::to_vec(&json)?);
        Ok(())
    }

    fn read_request(&self, payload: &[u8]) -> Result<RequestMessage, SerializationError> {
        let json = parse_payload(payload)?;
        self.request_from_json(json)
    }

    fn write_response(
        &self,
        response: &ResponseMessage,
        buf: &mut BytesMut,
    ) -> Result<(), SerializationError> {
        let json = self.response_to_json(response)?;
        buf.extend_from_slice(&serde_json::to_vec(&json)?);
        Ok(())
    }

    fn read_response(&self, payload: &[u8]) -> Result<ResponseMessage, SerializationError> {
        let json = parse_payload(payload)?;
        self.response_from_json(json)
    }
}

fn parse_payload(payload: &[u8]) -> Result<Json, SerializationError> {
    let text = std::str::from_utf8(payload).map_err(|_| SerializationError::InvalidUtf8)?;
    Ok(serde_json::from_str(text)?)
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestEnvelope {
    request_id: String,
    op: String,
    gremlin_type: String,
    #[serde(default)]
    args: Map<String, Json>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseEnvelope {
    request_id: Option<String>,
    status: StatusEnvelope,
    #[serde(default)]
    result: ResultEnvelope,
}

#[derive(Serialize, Deserialize)]
struct StatusEnvelope {
    code: u16,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    exception: Option<String>,
}

#[derive(Default, Serialize, Deserialize)]
struct ResultEnvelope {
    #[serde(default)]
    meta: Map<String, Json>,
    #[serde(default)]
    data: Json,
}

// ============================================================================
// Core type rules
// ============================================================================

fn mismatch(expected: TypeTag, value: &Value) -> SerializationError {
    ValueError::TypeMismatch {
        expected,
        actual: value.tag(),
    }
    .into()
}

fn as_array<'a>(what: &'static str, json: &'a Json) -> Result<&'a Vec<Json>, SerializationError> {
    json.as_array()
        .ok_or_else(|| SerializationError::malformed(what, "expected array"))
}

fn as_object<'a>(
    what: &'static str,
    json: &'a Json,
) -> Result<&'a Map<String, Json>, SerializationError> {
    json.as_object()
        .ok_or_else(|| SerializationError::malformed(what, "expected object"))
}

fn field<'a>(obj: &'a Map<String, Json>, name: &'static str) -> Result<&'a Json, SerializationError> {
    obj.get(name).ok_or(SerializationError::MissingField(name))
}

fn str_field<'a>(
    what: &'static str,
    obj: &'a Map<String, Json>,
    name: &'static str,
) -> Result<&'a str, SerializationError> {
    field(obj, name)?
        .as_str()
        .ok_or_else(|| SerializationError::malformed(what, format!("{name} must be a string")))
}

fn write_int(value: &Value, _: &GraphSonSerializer) -> Result<Json, SerializationError> {
    match value {
        Value::Integer(i) => Ok(json!(i)),
        _ => Err(mismatch(TypeTag::Integer, value)),
    }
}

fn read_int(_: &TypeTag, json: &Json, _: &GraphSonSerializer) -> Result<Value, SerializationError> {
    json.as_i64()
        .and_then(|i| i32::try_from(i).ok())
        .map(Value::Integer)
        .ok_or_else(|| SerializationError::malformed("g:Int32", format!("{json} is not a 32-bit integer")))
}

fn write_long(value: &Value, _: &GraphSonSerializer) -> Result<Json, SerializationError> {
    match value {
        Value::Long(l) => Ok(json!(l)),
        _ => Err(mismatch(TypeTag::Long, value)),
    }
}

fn read_long(_: &TypeTag, json: &Json, _: &GraphSonSerializer) -> Result<Value, SerializationError> {
    json.as_i64()
        .map(Value::Long)
        .ok_or_else(|| SerializationError::malformed("g:Int64", format!("{json} is not a 64-bit integer")))
}

fn write_double(value: &Value, _: &GraphSonSerializer) -> Result<Json, SerializationError> {
    let Value::Double(d) = value else {
        return Err(mismatch(TypeTag::Double, value));
    };
    Ok(match serde_json::Number::from_f64(*d) {
        Some(n) => Json::Number(n),
        None if d.is_nan() => json!("NaN"),
        None if *d > 0.0 => json!("Infinity"),
        None => json!("-Infinity"),
    })
}

fn read_double(_: &TypeTag, json: &Json, _: &GraphSonSerializer) -> Result<Value, SerializationError> {
    let d = match json {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    };
    d.map(Value::Double)
        .ok_or_else(|| SerializationError::malformed("g:Double", format!("{json} is not a double")))
}

fn write_big_integer(value: &Value, _: &GraphSonSerializer) -> Result<Json, SerializationError> {
    match value {
        Value::BigInteger(b) => Ok(Json::String(b.to_string())),
        _ => Err(mismatch(TypeTag::BigInteger, value)),
    }
}

fn read_big_integer(
    _: &TypeTag,
    json: &Json,
    _: &GraphSonSerializer,
) -> Result<Value, SerializationError> {
    let digits = match json {
        Json::String(s) => s.clone(),
        Json::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
        _ => return Err(SerializationError::malformed("g:BigInteger", "expected decimal string")),
    };
    digits
        .parse::<BigInt>()
        .map(Value::BigInteger)
        .map_err(|_| ValueError::InvalidNumber(digits).into())
}

fn write_big_decimal(value: &Value, _: &GraphSonSerializer) -> Result<Json, SerializationError> {
    match value {
        Value::BigDecimal(d) => Ok(Json::String(d.to_string())),
        _ => Err(mismatch(TypeTag::BigDecimal, value)),
    }
}

fn read_big_decimal(
    _: &TypeTag,
    json: &Json,
    _: &GraphSonSerializer,
) -> Result<Value, SerializationError> {
    let text = match json {
        Json::String(s) => s.clone(),
        Json::Number(n) => n.to_string(),
        _ => return Err(SerializationError::malformed("g:BigDecimal", "expected decimal string")),
    };
    Ok(Value::BigDecimal(text.parse::<BigDecimal>()?))
}

fn write_list(value: &Value, s: &GraphSonSerializer) -> Result<Json, SerializationError> {
    match value {
        Value::List(items) | Value::Set(items) => items
            .iter()
            .map(|item| s.write_value(item))
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array),
        _ => Err(mismatch(TypeTag::List, value)),
    }
}

fn read_list(tag: &TypeTag, json: &Json, s: &GraphSonSerializer) -> Result<Value, SerializationError> {
    let items = as_array("g:List", json)?
        .iter()
        .map(|item| s.read_value(item))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(match tag {
        TypeTag::Set => Value::Set(items),
        _ => Value::List(items),
    })
}

/// Maps are flat `[k1, v1, k2, v2, ...]` arrays so keys may be of any type.
fn write_map(value: &Value, s: &GraphSonSerializer) -> Result<Json, SerializationError> {
    let Value::Map(entries) = value else {
        return Err(mismatch(TypeTag::Map, value));
    };
    let mut flat = Vec::with_capacity(entries.len() * 2);
    for (k, v) in entries {
        flat.push(s.write_value(k)?);
        flat.push(s.write_value(v)?);
    }
    Ok(Json::Array(flat))
}

fn read_map(_: &TypeTag, json: &Json, s: &GraphSonSerializer) -> Result<Value, SerializationError> {
    let flat = as_array("g:Map", json)?;
    if flat.len() % 2 != 0 {
        return Err(SerializationError::malformed("g:Map", "odd number of entries"));
    }
    flat.chunks(2)
        .map(|pair| Ok((s.read_value(&pair[0])?, s.read_value(&pair[1])?)))
        .collect::<Result<Vec<_>, SerializationError>>()
        .map(Value::Map)
}

fn vertex_json(vertex: &Vertex, s: &GraphSonSerializer) -> Result<Json, SerializationError> {
    Ok(json!({ "id": s.write_value(&vertex.id)?, "label": vertex.label }))
}

fn write_vertex(value: &Value, s: &GraphSonSerializer) -> Result<Json, SerializationError> {
    match value {
        Value::Vertex(v) => vertex_json(v, s),
        _ => Err(mismatch(TypeTag::Vertex, value)),
    }
}

fn read_vertex(_: &TypeTag, json: &Json, s: &GraphSonSerializer) -> Result<Value, SerializationError> {
    let obj = as_object("g:Vertex", json)?;
    Ok(Value::Vertex(Vertex::new(
        s.read_value(field(obj, "id")?)?,
        str_field("g:Vertex", obj, "label")?,
    )))
}

fn write_edge(value: &Value, s: &GraphSonSerializer) -> Result<Json, SerializationError> {
    let Value::Edge(e) = value else {
        return Err(mismatch(TypeTag::Edge, value));
    };
    Ok(json!({
        "id": s.write_value(&e.id)?,
        "label": e.label,
        "outV": s.write_value(&e.out_v.id)?,
        "outVLabel": e.out_v.label,
        "inV": s.write_value(&e.in_v.id)?,
        "inVLabel": e.in_v.label,
    }))
}

fn read_edge(_: &TypeTag, json: &Json, s: &GraphSonSerializer) -> Result<Value, SerializationError> {
    let obj = as_object("g:Edge", json)?;
    let out_v = Vertex::new(
        s.read_value(field(obj, "outV")?)?,
        str_field("g:Edge", obj, "outVLabel")?,
    );
    let in_v = Vertex::new(
        s.read_value(field(obj, "inV")?)?,
        str_field("g:Edge", obj, "inVLabel")?,
    );
    Ok(Value::Edge(Edge::new(
        s.read_value(field(obj, "id")?)?,
        str_field("g:Edge", obj, "label")?,
        out_v,
        in_v,
    )))
}

/// Path labels are a list of sets of strings, one set per object.
fn write_path(value: &Value, s: &GraphSonSerializer) -> Result<Json, SerializationError> {
    let Value::Path(p) = value else {
        return Err(mismatch(TypeTag::Path, value));
    };
    let labels = Value::List(
        p.labels
            .iter()
            .map(|set| Value::Set(set.iter().map(|l| Value::from(l.as_str())).collect()))
            .collect(),
    );
    Ok(json!({
        "labels": s.write_value(&labels)?,
        "objects": s.write_value(&Value::List(p.objects.clone()))?,
    }))
}

fn read_path(_: &TypeTag, json: &Json, s: &GraphSonSerializer) -> Result<Value, SerializationError> {
    let obj = as_object("g:Path", json)?;
    let labels = match s.read_value(field(obj, "labels")?)? {
        Value::List(sets) => sets
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
            .collect::<Result<Vec<_>, _>>()?,
        other => return Err(mismatch(TypeTag::List, &other)),
    };
    let objects = match s.read_value(field(obj, "objects")?)? {
        Value::List(objects) => objects,
        other => return Err(mismatch(TypeTag::List, &other)),
    };
    if labels.len() != objects.len() {
        return Err(SerializationError::malformed(
            "g:Path",
            "labels and objects differ in length",
        ));
    }
    Ok(Value::Path(Path { labels, objects }))
}

fn write_property(value: &Value, s: &GraphSonSerializer) -> Result<Json, SerializationError> {
    match value {
        Value::Property(p) => Ok(json!({ "key": p.key, "value": s.write_value(&p.value)? })),
        _ => Err(mismatch(TypeTag::Property, value)),
    }
}

fn read_property(
    _: &TypeTag,
    json: &Json,
    s: &GraphSonSerializer,
) -> Result<Value, SerializationError> {
    let obj = as_object("g:Property", json)?;
    Ok(Value::Property(Property::new(
        str_field("g:Property", obj, "key")?,
        s.read_value(field(obj, "value")?)?,
    )))
}

fn instructions_json(
    instructions: &[Instruction],
    s: &GraphSonSerializer,
) -> Result<Json, SerializationError> {
    instructions
        .iter()
        .map(|i| {
            let mut step = vec![Json::String(i.operator.clone())];
            for arg in &i.arguments {
                step.push(s.write_value(arg)?);
            }
            Ok(Json::Array(step))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Json::Array)
}

fn read_instructions(
    json: Option<&Json>,
    s: &GraphSonSerializer,
) -> Result<Vec<Instruction>, SerializationError> {
    let Some(json) = json else {
        return Ok(Vec::new());
    };
    as_array("g:Bytecode", json)?
        .iter()
        .map(|step| {
            let parts = as_array("g:Bytecode", step)?;
            let (operator, args) = parts
                .split_first()
                .ok_or_else(|| SerializationError::malformed("g:Bytecode", "empty instruction"))?;
            let operator = operator.as_str().ok_or_else(|| {
                SerializationError::malformed("g:Bytecode", "operator must be a string")
            })?;
            let arguments = args
                .iter()
                .map(|a| s.read_value(a))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Instruction::new(operator, arguments))
        })
        .collect()
}

fn write_bytecode(value: &Value, s: &GraphSonSerializer) -> Result<Json, SerializationError> {
    let Value::Bytecode(b) = value else {
        return Err(mismatch(TypeTag::Bytecode, value));
    };
    let mut obj = Map::new();
    if !b.sources.is_empty() {
        obj.insert("source".to_string(), instructions_json(&b.sources, s)?);
    }
    if !b.steps.is_empty() {
        obj.insert("step".to_string(), instructions_json(&b.steps, s)?);
    }
    Ok(Json::Object(obj))
}

fn read_bytecode(
    _: &TypeTag,
    json: &Json,
    s: &GraphSonSerializer,
) -> Result<Value, SerializationError> {
    let obj = as_object("g:Bytecode", json)?;
    Ok(Value::Bytecode(Bytecode {
        sources: read_instructions(obj.get("source"), s)?,
        steps: read_instructions(obj.get("step"), s)?,
    }))
}

fn write_lambda(value: &Value, _: &GraphSonSerializer) -> Result<Json, SerializationError> {
    match value {
        Value::Lambda(l) => Ok(json!({
            "script": l.script,
            "language": l.language,
            "arguments": l.arguments,
        })),
        _ => Err(mismatch(TypeTag::Lambda, value)),
    }
}

fn read_lambda(_: &TypeTag, json: &Json, _: &GraphSonSerializer) -> Result<Value, SerializationError> {
    let obj = as_object("g:Lambda", json)?;
    let arguments = field(obj, "arguments")?
        .as_i64()
        .and_then(|a| i32::try_from(a).ok())
        .ok_or_else(|| SerializationError::malformed("g:Lambda", "arguments must be an integer"))?;
    Ok(Value::Lambda(Lambda {
        script: str_field("g:Lambda", obj, "script")?.to_string(),
        language: str_field("g:Lambda", obj, "language")?.to_string(),
        arguments,
    }))
}

fn write_custom(value: &Value, s: &GraphSonSerializer) -> Result<Json, SerializationError> {
    match value {
        Value::Custom(c) => s.write_value(&c.payload),
        _ => Err(SerializationError::malformed("custom", format!("{} is not an extension value", value.tag()))),
    }
}

fn read_custom(tag: &TypeTag, json: &Json, s: &GraphSonSerializer) -> Result<Value, SerializationError> {
    match tag {
        TypeTag::Custom(name) => Ok(Value::Custom(CustomValue::new(name.as_str(), s.read_value(json)?))),
        other => Err(SerializationError::malformed("custom", format!("{other} is not an extension type"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{install_custom_types, point, POINT_TYPE};
    use proptest::prelude::*;

    fn serializer() -> GraphSonSerializer {
        GraphSonSerializer::with_registry(Arc::new(base_registry()))
    }

    fn with_point() -> GraphSonSerializer {
        install_custom_types();
        let mut registry = base_registry();
        register_custom_type(&mut registry, POINT_TYPE);
        GraphSonSerializer::with_registry(Arc::new(registry))
    }

    fn roundtrip(s: &GraphSonSerializer, value: Value) -> Value {
        let json = s.write_value(&value).unwrap();
        s.read_value(&json).unwrap()
    }

    #[test]
    fn test_native_json_types() {
        let s = serializer();
        assert_eq!(s.write_value(&Value::from("marko")).unwrap(), json!("marko"));
        assert_eq!(s.write_value(&Value::from(true)).unwrap(), json!(true));
        assert_eq!(s.write_value(&Value::Null).unwrap(), Json::Null);
    }

    #[test]
    fn test_numbers_are_typed() {
        let s = serializer();
        assert_eq!(
            s.write_value(&Value::Integer(1)).unwrap(),
            json!({"@type": "g:Int32", "@value": 1})
        );
        assert_eq!(
            s.write_value(&Value::Long(1)).unwrap(),
            json!({"@type": "g:Int64", "@value": 1})
        );
        assert_eq!(
            s.write_value(&Value::Double(1.5)).unwrap(),
            json!({"@type": "g:Double", "@value": 1.5})
        );
        assert_eq!(
            s.write_value(&Value::BigInteger(BigInt::from(u64::MAX) * 4)).unwrap(),
            json!({"@type": "g:BigInteger", "@value": "73786976294838206460"})
        );
    }

    #[test]
    fn test_integer_boundaries() {
        let s = serializer();
        for v in [i32::MIN, -1, 0, i32::MAX] {
            assert_eq!(roundtrip(&s, Value::Integer(v)), Value::Integer(v));
        }
        for v in [i64::MIN, i64::MAX] {
            assert_eq!(roundtrip(&s, Value::Long(v)), Value::Long(v));
        }

        let too_big = json!({"@type": "g:Int32", "@value": 2_147_483_648i64});
        assert!(matches!(
            s.read_value(&too_big),
            Err(SerializationError::Malformed { .. })
        ));
    }

    #[test]
    fn test_non_finite_doubles() {
        let s = serializer();
        assert_eq!(
            s.write_value(&Value::Double(f64::NAN)).unwrap(),
            json!({"@type": "g:Double", "@value": "NaN"})
        );
        assert_eq!(
            s.write_value(&Value::Double(f64::NEG_INFINITY)).unwrap(),
            json!({"@type": "g:Double", "@value": "-Infinity"})
        );
        match roundtrip(&s, Value::Double(f64::NAN)) {
            Value::Double(d) => assert!(d.is_nan()),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            roundtrip(&s, Value::Double(f64::INFINITY)),
            Value::Double(f64::INFINITY)
        );
    }

    #[test]
    fn test_map_with_non_string_keys() {
        let s = serializer();
        let map = Value::Map(vec![
            (Value::Integer(1), Value::from("one")),
            (Value::List(vec![Value::Integer(2)]), Value::Null),
        ]);
        let json = s.write_value(&map).unwrap();
        assert_eq!(json["@type"], "g:Map");
        assert_eq!(json["@value"].as_array().unwrap().len(), 4);
        assert_eq!(s.read_value(&json).unwrap(), map);

        let odd = json!({"@type": "g:Map", "@value": ["a"]});
        assert!(s.read_value(&odd).is_err());
    }

    #[test]
    fn test_set_and_list_stay_distinct() {
        let s = serializer();
        let set = Value::Set(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(s.write_value(&set).unwrap()["@type"], "g:Set");
        assert_eq!(roundtrip(&s, set.clone()), set);
    }

    #[test]
    fn test_graph_elements() {
        let s = serializer();
        let v = Value::from(Vertex::new(1, "person"));
        assert_eq!(
            s.write_value(&v).unwrap(),
            json!({"@type": "g:Vertex", "@value": {"id": {"@type": "g:Int32", "@value": 1}, "label": "person"}})
        );
        assert_eq!(roundtrip(&s, v.clone()), v);

        let e = Value::from(Edge::new(
            7i64,
            "knows",
            Vertex::new(1, "person"),
            Vertex::new(2, "software"),
        ));
        assert_eq!(roundtrip(&s, e.clone()), e);

        let p = Value::from(Path {
            labels: vec![vec!["a".into()], vec![]],
            objects: vec![v.clone(), Value::from("marko")],
        });
        assert_eq!(roundtrip(&s, p.clone()), p);

        let prop = Value::from(Property::new("age", 29));
        assert_eq!(roundtrip(&s, prop.clone()), prop);
    }

    #[test]
    fn test_bytecode_and_lambda() {
        let s = serializer();
        let lambda = Lambda {
            script: "x -> x + 1".into(),
            language: "gremlin-lang".into(),
            arguments: 1,
        };
        let bytecode = Bytecode::new()
            .with_source("withStrategies", vec![])
            .with_step("V", vec![])
            .with_step("has", vec!["name".into(), "marko".into()])
            .with_step("map", vec![lambda.into()]);
        let json = s.write_value(&Value::from(bytecode.clone())).unwrap();
        assert_eq!(json["@value"]["step"][1][0], "has");
        assert_eq!(json["@value"]["source"][0][0], "withStrategies");
        assert_eq!(
            s.read_value(&json).unwrap(),
            Value::Bytecode(bytecode)
        );
    }

    #[test]
    fn test_big_decimal() {
        let s = serializer();
        let d: BigDecimal = "-123.4500".parse().unwrap();
        let json = s.write_value(&Value::from(d.clone())).unwrap();
        assert_eq!(json, json!({"@type": "g:BigDecimal", "@value": "-123.4500"}));
        assert_eq!(s.read_value(&json).unwrap(), Value::BigDecimal(d));
    }

    #[test]
    fn test_big_decimal_extreme_scale() {
        let s = serializer();
        let json = json!({"@type": "g:BigDecimal", "@value": "1e-2000000000"});
        let value = s.read_value(&json).unwrap();
        assert_eq!(
            value,
            Value::BigDecimal(BigDecimal::new(BigInt::from(1), 2_000_000_000))
        );
        assert_eq!(
            s.write_value(&value).unwrap(),
            json!({"@type": "g:BigDecimal", "@value": "1E-2000000000"})
        );

        for scale in [i32::MIN, i32::MAX] {
            let value = Value::BigDecimal(BigDecimal::new(BigInt::from(-7), scale));
            assert_eq!(roundtrip(&s, value.clone()), value, "scale {scale}");
        }
    }

    #[test]
    fn test_long_string() {
        let s = serializer();
        let value = Value::String("x".repeat(1 << 20));
        assert_eq!(roundtrip(&s, value.clone()), value);
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let s = serializer();
        let mut payload = String::from(r#"{"requestId":"r1","op":"eval","gremlinType":"script","args":{"x":"#);
        payload.push_str(&"[".repeat(100_000));
        payload.push_str(&"]".repeat(100_000));
        payload.push_str("}}");
        assert!(s.read_request(payload.as_bytes()).is_err());

        let nested = (0..32).fold(Value::Integer(1), |inner, _| Value::List(vec![inner]));
        assert_eq!(roundtrip(&s, nested.clone()), nested);
    }

    #[test]
    fn test_untyped_input_is_rejected() {
        let s = serializer();
        assert!(matches!(
            s.read_value(&json!(1)),
            Err(SerializationError::Malformed { .. })
        ));
        assert!(matches!(
            s.read_value(&json!([1, 2])),
            Err(SerializationError::Malformed { .. })
        ));
        assert!(matches!(
            s.read_value(&json!({"@value": 1})),
            Err(SerializationError::MissingField("@type"))
        ));
        assert!(matches!(
            s.read_value(&json!({"@type": "acme:Widget", "@value": 1})),
            Err(SerializationError::UnknownTypeId(ref id)) if id == "acme:Widget"
        ));
    }

    #[test]
    fn test_unregistered_tag_fails() {
        let s = GraphSonSerializer::with_registry(Arc::new(SerializerRegistry::new()));
        assert!(matches!(
            s.write_value(&Value::Integer(1)),
            Err(SerializationError::UnregisteredType(TypeTag::Integer))
        ));
        assert!(matches!(
            s.write_value(&Value::List(vec![Value::from("a")])),
            Err(SerializationError::UnregisteredType(TypeTag::List))
        ));
    }

    #[test]
    fn test_custom_type() {
        let s = with_point();
        let value = point(1, 2);
        let json = s.write_value(&value).unwrap();
        assert_eq!(json["@type"], POINT_TYPE);
        assert_eq!(s.read_value(&json).unwrap(), value);

        // Not registered with the plain core registry.
        let core = GraphSonSerializer::with_registry(Arc::new(SerializerRegistry::new()));
        assert!(core.write_value(&value).is_err());
    }

    fn failing(_: &Value, _: &GraphSonSerializer) -> Result<Json, SerializationError> {
        Err(SerializationError::malformed("g:Int32", "primary disabled"))
    }

    #[test]
    fn test_fallback_encoder() {
        let mut registry = base_registry();
        registry.register(TypeTag::Integer, "g:Int32".into(), failing, read_int);
        let s = GraphSonSerializer::with_registry(Arc::new(registry.clone()));
        assert!(s.write_value(&Value::Integer(3)).is_err());

        registry.register_fallback(&TypeTag::Integer, write_int).unwrap();
        let s = GraphSonSerializer::with_registry(Arc::new(registry));
        assert_eq!(
            s.write_value(&Value::Integer(3)).unwrap(),
            json!({"@type": "g:Int32", "@value": 3})
        );
    }

    #[test]
    fn test_eval_request_roundtrip() {
        let s = serializer();
        let request = RequestMessage::eval("g.V(x).out()")
            .with_id("r1")
            .with_binding("x", 1)
            .unwrap();
        let json = s.request_to_json(&request).unwrap();
        assert_eq!(json["requestId"], "r1");
        assert_eq!(json["op"], "eval");
        assert_eq!(json["gremlinType"], "script");
        assert_eq!(json["args"]["gremlin"], "g.V(x).out()");

        let decoded = s.request_from_json(json).unwrap();
        assert_eq!(decoded, request);
        assert_eq!(decoded.binding("x").unwrap().get(), &Value::Integer(1));
    }

    #[test]
    fn test_request_requires_envelope_fields() {
        let s = serializer();
        let json = json!({"op": "eval", "gremlinType": "script"});
        assert!(matches!(
            s.request_from_json(json),
            Err(SerializationError::Json(_))
        ));
    }

    #[test]
    fn test_response_roundtrip() {
        let s = serializer();
        let response = ResponseMessage::build_response(
            "r1",
            vec![TypedValue::integer(1), TypedValue::string("marko")],
        )
        .with_meta("host", TypedValue::string("localhost"));
        let json = s.response_to_json(&response).unwrap();
        assert_eq!(json["status"]["code"], 200);
        assert_eq!(json["result"]["data"]["@type"], "g:List");
        assert_eq!(s.response_from_json(json).unwrap(), response);
    }

    #[test]
    fn test_error_response_roundtrip() {
        let s = serializer();
        let response = ResponseMessage::build_error_response(None, ErrorRecord::binding());
        let json = s.response_to_json(&response).unwrap();
        assert_eq!(json["requestId"], Json::Null);
        assert_eq!(json["status"]["code"], 400);
        assert_eq!(json["status"]["exception"], "InvalidRequestException");
        assert_eq!(json["result"]["data"], Json::Null);
        assert_eq!(s.response_from_json(json).unwrap(), response);
    }

    #[test]
    fn test_serialize_prepends_header() {
        let s = serializer();
        let request = RequestMessage::eval("g.V()").with_id("r1");
        let bytes = s.serialize_request(&request).unwrap();
        assert_eq!(bytes[0], 11);
        assert_eq!(&bytes[1..12], b"graphson-v4");
        assert_eq!(bytes[12], b'{');
        assert_eq!(s.deserialize_request(&bytes).unwrap(), request);
    }

    fn json_safe() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            any::<i32>().prop_map(Value::Integer),
            any::<i64>().prop_map(Value::Long),
            any::<bool>().prop_map(Value::Boolean),
            (-1_000_000i32..1_000_000).prop_map(|i| Value::Double(f64::from(i) / 4.0)),
            "[a-z]{0,8}".prop_map(Value::String),
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
        fn prop_value_roundtrip(value in json_safe()) {
            let s = serializer();
            let json = s.write_value(&value).unwrap();
            prop_assert_eq!(s.read_value(&json).unwrap(), value);
        }
    }
}
