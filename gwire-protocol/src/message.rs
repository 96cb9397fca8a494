//! Request and response envelopes.

use crate::error::ValueError;
use crate::status::{ErrorRecord, StatusCode};
use crate::tokens::{
    ARGS_BATCH_SIZE, ARGS_BINDINGS, ARGS_EVAL_TIMEOUT, ARGS_G, ARGS_GREMLIN,
    GREMLIN_TYPE_BYTECODE, GREMLIN_TYPE_SCRIPT, OPS_BYTECODE, OPS_EVAL,
};
use crate::value::{Bytecode, TypedValue, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Request operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Eval,
    Bytecode,
}

impl Operation {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            OPS_EVAL => Some(Operation::Eval),
            OPS_BYTECODE => Some(Operation::Bytecode),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Eval => OPS_EVAL,
            Operation::Bytecode => OPS_BYTECODE,
        }
    }
}

/// Shape of the `gremlin` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GremlinType {
    Script,
    Bytecode,
}

impl GremlinType {
    pub fn parse(gremlin_type: &str) -> Option<Self> {
        match gremlin_type {
            GREMLIN_TYPE_SCRIPT => Some(GremlinType::Script),
            GREMLIN_TYPE_BYTECODE => Some(GremlinType::Bytecode),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GremlinType::Script => GREMLIN_TYPE_SCRIPT,
            GremlinType::Bytecode => GREMLIN_TYPE_BYTECODE,
        }
    }
}

/// Request message envelope.
///
/// `op` and `gremlin_type` are kept as received so an unrecognized
/// discriminator can be reported back to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMessage {
    /// Unique request ID for correlation.
    pub request_id: String,

    pub op: String,

    pub gremlin_type: String,

    /// Operation arguments keyed by argument name.
    pub args: BTreeMap<String, TypedValue>,
}

impl RequestMessage {
    pub fn new(op: impl Into<String>, gremlin_type: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            op: op.into(),
            gremlin_type: gremlin_type.into(),
            args: BTreeMap::new(),
        }
    }

    /// Script evaluation request.
    pub fn eval(script: impl Into<String>) -> Self {
        Self::new(OPS_EVAL, GREMLIN_TYPE_SCRIPT).with_arg(ARGS_GREMLIN, TypedValue::string(script))
    }

    /// Bytecode traversal request against the source bound to `alias`.
    pub fn bytecode(bytecode: Bytecode, alias: impl Into<String>) -> Result<Self, ValueError> {
        Ok(Self::new(OPS_BYTECODE, GREMLIN_TYPE_BYTECODE)
            .with_arg(ARGS_GREMLIN, TypedValue::literal(bytecode)?)
            .with_arg(ARGS_G, TypedValue::string(alias)))
    }

    pub fn with_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: TypedValue) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    /// Adds one binding, keeping any already present.
    pub fn with_binding(
        self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Self, ValueError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValueError::InvalidBindingName);
        }
        let mut entries = self.bindings().to_vec();
        let key = Value::String(name);
        let value = value.into();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
        self.with_bindings(entries)
    }

    /// Replaces the bindings map with raw entries. Keys are not checked
    /// here; the server rejects non-string keys during validation.
    pub fn with_bindings(self, entries: Vec<(Value, Value)>) -> Result<Self, ValueError> {
        let bindings = TypedValue::literal(Value::Map(entries))?;
        Ok(self.with_arg(ARGS_BINDINGS, bindings))
    }

    pub fn operation(&self) -> Option<Operation> {
        Operation::parse(&self.op)
    }

    pub fn gremlin_kind(&self) -> Option<GremlinType> {
        GremlinType::parse(&self.gremlin_type)
    }

    pub fn arg(&self, key: &str) -> Option<&TypedValue> {
        self.args.get(key)
    }

    pub fn gremlin(&self) -> Option<&TypedValue> {
        self.arg(ARGS_GREMLIN)
    }

    /// The script, when `gremlin` is a string.
    pub fn script(&self) -> Option<&str> {
        self.gremlin().and_then(|g| g.get().as_str())
    }

    /// The traversal, when `gremlin` is bytecode.
    pub fn bytecode_payload(&self) -> Option<&Bytecode> {
        self.gremlin().and_then(|g| g.get().as_bytecode())
    }

    /// Traversal source alias, when present and a string.
    pub fn alias(&self) -> Option<&str> {
        self.arg(ARGS_G).and_then(|g| g.get().as_str())
    }

    /// Raw binding entries; empty when the request carries none.
    pub fn bindings(&self) -> &[(Value, Value)] {
        self.arg(ARGS_BINDINGS)
            .and_then(|b| b.get().as_map())
            .unwrap_or(&[])
    }

    /// Binding `name` as a named variable.
    pub fn binding(&self, name: &str) -> Option<TypedValue> {
        self.bindings()
            .iter()
            .find(|(k, _)| k.as_str() == Some(name))
            .and_then(|(_, v)| TypedValue::named(name, v.clone()).ok())
    }

    /// Per-request evaluation timeout in milliseconds.
    pub fn evaluation_timeout(&self) -> Option<u64> {
        self.arg(ARGS_EVAL_TIMEOUT)
            .and_then(|t| t.get().as_i64())
            .and_then(|t| u64::try_from(t).ok())
    }

    /// Per-request result batch size.
    pub fn batch_size(&self) -> Option<usize> {
        self.arg(ARGS_BATCH_SIZE)
            .and_then(|b| b.get().as_i64())
            .and_then(|b| usize::try_from(b).ok())
            .filter(|b| *b > 0)
    }

    /// Display form cut to `max` characters, with `...` appended when cut.
    pub fn trim_message(&self, max: usize) -> String {
        let full = self.to_string();
        match full.char_indices().nth(max) {
            Some((end, _)) => format!("{}...", &full[..end]),
            None => full,
        }
    }
}

impl fmt::Display for RequestMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RequestMessage{{requestId={}, op='{}', gremlinType='{}', args={{",
            self.request_id, self.op, self.gremlin_type
        )?;
        for (i, (key, value)) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("}}")
    }
}

/// A status code in the success range. Only [`SuccessCode::new`] builds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessCode(StatusCode);

impl SuccessCode {
    pub const OK: SuccessCode = SuccessCode(StatusCode::Success);
    pub const NO_CONTENT: SuccessCode = SuccessCode(StatusCode::NoContent);
    pub const PARTIAL_CONTENT: SuccessCode = SuccessCode(StatusCode::PartialContent);

    /// Returns `None` for codes outside the success range.
    pub fn new(code: StatusCode) -> Option<Self> {
        code.is_success().then_some(Self(code))
    }

    pub fn get(self) -> StatusCode {
        self.0
    }
}

impl fmt::Display for SuccessCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome carried by a response: a success code or an error record.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseStatus {
    Success(SuccessCode),
    Error(ErrorRecord),
}

impl ResponseStatus {
    pub fn code(&self) -> StatusCode {
        match self {
            ResponseStatus::Success(code) => code.get(),
            ResponseStatus::Error(record) => record.code(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResponseStatus::Error(_))
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        match self {
            ResponseStatus::Error(record) => Some(record),
            ResponseStatus::Success(_) => None,
        }
    }
}

/// Response message envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
    /// Request ID this response correlates to. Absent when the request
    /// could not be parsed.
    request_id: Option<String>,

    status: ResponseStatus,

    /// Header and footer attributes.
    meta: BTreeMap<String, TypedValue>,

    /// Result items; absent on error responses.
    result: Option<Vec<TypedValue>>,
}

impl ResponseMessage {
    /// Final success response. An empty result yields `NoContent`.
    pub fn build_response(request_id: impl Into<String>, results: Vec<TypedValue>) -> Self {
        let code = if results.is_empty() {
            SuccessCode::NO_CONTENT
        } else {
            SuccessCode::OK
        };
        Self::success(request_id.into(), code, results)
    }

    pub fn no_content(request_id: impl Into<String>) -> Self {
        Self::success(request_id.into(), SuccessCode::NO_CONTENT, Vec::new())
    }

    /// Non-final response carrying one batch of a streamed result.
    pub fn partial_response(request_id: impl Into<String>, results: Vec<TypedValue>) -> Self {
        Self::success(request_id.into(), SuccessCode::PARTIAL_CONTENT, results)
    }

    pub fn build_error_response(request_id: Option<String>, record: ErrorRecord) -> Self {
        Self {
            request_id,
            status: ResponseStatus::Error(record),
            meta: BTreeMap::new(),
            result: None,
        }
    }

    /// Reassembles a response from its decoded parts.
    pub fn from_parts(
        request_id: Option<String>,
        status: ResponseStatus,
        meta: BTreeMap<String, TypedValue>,
        result: Option<Vec<TypedValue>>,
    ) -> Self {
        Self {
            request_id,
            status,
            meta,
            result,
        }
    }

    fn success(request_id: String, code: SuccessCode, results: Vec<TypedValue>) -> Self {
        Self {
            request_id: Some(request_id),
            status: ResponseStatus::Success(code),
            meta: BTreeMap::new(),
            result: Some(results),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: TypedValue) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn status(&self) -> &ResponseStatus {
        &self.status
    }

    pub fn code(&self) -> StatusCode {
        self.status.code()
    }

    pub fn meta(&self) -> &BTreeMap<String, TypedValue> {
        &self.meta
    }

    pub fn result(&self) -> Option<&[TypedValue]> {
        self.result.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.status.is_error()
    }

    /// Returns whether this response ends its request's response sequence.
    pub fn is_final(&self) -> bool {
        self.code().is_final()
    }
}
