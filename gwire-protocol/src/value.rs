//! Typed values carried as traversal arguments and results.
//!
//! A [`Value`] is the tagged union of every shape the protocol can carry. A
//! [`TypedValue`] pairs a value with its [`TypeTag`] and an optional binding
//! name: named values are variables supplied by the client, unnamed values
//! are literals.

use crate::error::ValueError;
use num_bigint::{BigInt, Sign};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Discriminator identifying the runtime shape of a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeTag {
    Null,
    String,
    Integer,
    Long,
    Boolean,
    Double,
    BigInteger,
    BigDecimal,
    Map,
    List,
    Set,
    Vertex,
    Edge,
    Path,
    Property,
    Bytecode,
    Lambda,
    /// Extension type, identified by its registered name.
    Custom(String),
}

impl TypeTag {
    /// Every core (non-extension) tag.
    pub const CORE: &'static [TypeTag] = &[
        TypeTag::Null,
        TypeTag::String,
        TypeTag::Integer,
        TypeTag::Long,
        TypeTag::Boolean,
        TypeTag::Double,
        TypeTag::BigInteger,
        TypeTag::BigDecimal,
        TypeTag::Map,
        TypeTag::List,
        TypeTag::Set,
        TypeTag::Vertex,
        TypeTag::Edge,
        TypeTag::Path,
        TypeTag::Property,
        TypeTag::Bytecode,
        TypeTag::Lambda,
    ];

    pub fn is_custom(&self) -> bool {
        matches!(self, TypeTag::Custom(_))
    }

    pub fn name(&self) -> &str {
        match self {
            TypeTag::Null => "NULL",
            TypeTag::String => "STRING",
            TypeTag::Integer => "INTEGER",
            TypeTag::Long => "LONG",
            TypeTag::Boolean => "BOOLEAN",
            TypeTag::Double => "DOUBLE",
            TypeTag::BigInteger => "BIG_INTEGER",
            TypeTag::BigDecimal => "BIG_DECIMAL",
            TypeTag::Map => "MAP",
            TypeTag::List => "LIST",
            TypeTag::Set => "SET",
            TypeTag::Vertex => "VERTEX",
            TypeTag::Edge => "EDGE",
            TypeTag::Path => "PATH",
            TypeTag::Property => "PROPERTY",
            TypeTag::Bytecode => "BYTECODE",
            TypeTag::Lambda => "LAMBDA",
            TypeTag::Custom(name) => name,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arbitrary-precision decimal: `unscaled * 10^-scale`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigDecimal {
    unscaled: BigInt,
    scale: i32,
}

impl BigDecimal {
    pub fn new(unscaled: BigInt, scale: i32) -> Self {
        Self { unscaled, scale }
    }

    pub fn unscaled(&self) -> &BigInt {
        &self.unscaled
    }

    pub fn scale(&self) -> i32 {
        self.scale
    }
}

impl FromStr for BigDecimal {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValueError::InvalidNumber(s.to_string());

        let (mantissa, exponent) = match s.find(|c: char| c == 'e' || c == 'E') {
            Some(pos) => (
                &s[..pos],
                s[pos + 1..].parse::<i64>().map_err(|_| invalid())?,
            ),
            None => (s, 0),
        };
        let (int_part, frac_part) = match mantissa.find('.') {
            Some(pos) => (&mantissa[..pos], &mantissa[pos + 1..]),
            None => (mantissa, ""),
        };
        if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let digits = format!("{int_part}{frac_part}");
        let unscaled = BigInt::from_str(&digits).map_err(|_| invalid())?;
        let scale = i64::try_from(frac_part.len())
            .ok()
            .and_then(|len| len.checked_sub(exponent))
            .and_then(|scale| i32::try_from(scale).ok())
            .ok_or_else(invalid)?;
        Ok(Self { unscaled, scale })
    }
}

/// Renders like Java's `BigDecimal.toString`: plain notation when the scale
/// is non-negative and the adjusted exponent is at least -6, scientific
/// notation otherwise. Output length is bounded by the digit count.
impl fmt::Display for BigDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.unscaled.sign() == Sign::Minus {
            "-"
        } else {
            ""
        };
        let digits = self.unscaled.magnitude().to_string();
        let adjusted = digits.len() as i64 - 1 - i64::from(self.scale);

        if self.scale == 0 {
            return write!(f, "{sign}{digits}");
        }

        if self.scale > 0 && adjusted >= -6 {
            let scale = self.scale as usize;
            return if digits.len() > scale {
                let (int_part, frac_part) = digits.split_at(digits.len() - scale);
                write!(f, "{sign}{int_part}.{frac_part}")
            } else {
                // adjusted >= -6 keeps this at six zeros or fewer
                let zeros = "0".repeat(scale - digits.len());
                write!(f, "{sign}0.{zeros}{digits}")
            };
        }

        let (lead, rest) = digits.split_at(1);
        f.write_str(sign)?;
        f.write_str(lead)?;
        if !rest.is_empty() {
            write!(f, ".{rest}")?;
        }
        write!(f, "E{adjusted:+}")
    }
}

/// Graph vertex reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub id: Box<Value>,
    pub label: String,
}

impl Vertex {
    pub fn new(id: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            id: Box::new(id.into()),
            label: label.into(),
        }
    }
}

/// Graph edge reference with its incident vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: Box<Value>,
    pub label: String,
    pub out_v: Vertex,
    pub in_v: Vertex,
}

impl Edge {
    pub fn new(id: impl Into<Value>, label: impl Into<String>, out_v: Vertex, in_v: Vertex) -> Self {
        Self {
            id: Box::new(id.into()),
            label: label.into(),
            out_v,
            in_v,
        }
    }
}

/// Traversal path: the objects visited, each with the step labels applied to it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    pub labels: Vec<Vec<String>>,
    pub objects: Vec<Value>,
}

/// Key/value property detached from its element.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: String,
    pub value: Box<Value>,
}

impl Property {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: Box::new(value.into()),
        }
    }
}

/// Single bytecode instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub operator: String,
    pub arguments: Vec<Value>,
}

impl Instruction {
    pub fn new(operator: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            operator: operator.into(),
            arguments,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.operator)?;
        write_joined(f, &self.arguments)?;
        f.write_str(")")
    }
}

/// Compiled traversal: source instructions followed by step instructions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bytecode {
    pub sources: Vec<Instruction>,
    pub steps: Vec<Instruction>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, operator: impl Into<String>, arguments: Vec<Value>) -> Self {
        self.sources.push(Instruction::new(operator, arguments));
        self
    }

    pub fn with_step(mut self, operator: impl Into<String>, arguments: Vec<Value>) -> Self {
        self.steps.push(Instruction::new(operator, arguments));
        self
    }

    /// Returns whether any instruction argument, at any depth, is a lambda.
    pub fn contains_lambda(&self) -> bool {
        self.sources
            .iter()
            .chain(self.steps.iter())
            .flat_map(|i| i.arguments.iter())
            .any(Value::contains_lambda)
    }
}

/// Script-language function passed as a traversal argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub script: String,
    pub language: String,
    pub arguments: i32,
}

/// Value of a registered extension type.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomValue {
    pub type_name: String,
    pub payload: Box<Value>,
}

impl CustomValue {
    pub fn new(type_name: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            type_name: type_name.into(),
            payload: Box::new(payload.into()),
        }
    }
}

/// Every value shape the protocol can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Integer(i32),
    Long(i64),
    Boolean(bool),
    Double(f64),
    BigInteger(BigInt),
    BigDecimal(BigDecimal),
    /// Entries in insertion order; keys may be of any type.
    Map(Vec<(Value, Value)>),
    List(Vec<Value>),
    Set(Vec<Value>),
    Vertex(Vertex),
    Edge(Edge),
    Path(Path),
    Property(Property),
    Bytecode(Bytecode),
    Lambda(Lambda),
    Custom(CustomValue),
}

impl Value {
    /// Shallow tag of this value. Does not consult the custom type table.
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::String(_) => TypeTag::String,
            Value::Integer(_) => TypeTag::Integer,
            Value::Long(_) => TypeTag::Long,
            Value::Boolean(_) => TypeTag::Boolean,
            Value::Double(_) => TypeTag::Double,
            Value::BigInteger(_) => TypeTag::BigInteger,
            Value::BigDecimal(_) => TypeTag::BigDecimal,
            Value::Map(_) => TypeTag::Map,
            Value::List(_) => TypeTag::List,
            Value::Set(_) => TypeTag::Set,
            Value::Vertex(_) => TypeTag::Vertex,
            Value::Edge(_) => TypeTag::Edge,
            Value::Path(_) => TypeTag::Path,
            Value::Property(_) => TypeTag::Property,
            Value::Bytecode(_) => TypeTag::Bytecode,
            Value::Lambda(_) => TypeTag::Lambda,
            Value::Custom(c) => TypeTag::Custom(c.type_name.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns integral values widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(i64::from(*i)),
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_bytecode(&self) -> Option<&Bytecode> {
        match self {
            Value::Bytecode(b) => Some(b),
            _ => None,
        }
    }

    /// Builds a map from string keys.
    pub fn map_of<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Value::String(k.into()), v.into()))
                .collect(),
        )
    }

    /// Whether a lambda appears anywhere in this value.
    pub fn contains_lambda(&self) -> bool {
        match self {
            Value::Lambda(_) => true,
            Value::List(items) | Value::Set(items) => items.iter().any(Value::contains_lambda),
            Value::Map(entries) => entries
                .iter()
                .any(|(k, v)| k.contains_lambda() || v.contains_lambda()),
            Value::Bytecode(b) => b.contains_lambda(),
            _ => false,
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{value}")?;
    }
    Ok(())
}

fn write_double(f: &mut fmt::Formatter<'_>, d: f64) -> fmt::Result {
    if d.is_nan() {
        f.write_str("NaN")
    } else if d.is_infinite() {
        f.write_str(if d > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        // Debug keeps the fraction on integral doubles ("5.0").
        write!(f, "{d:?}")
    }
}

/// Canonical string form.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::String(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Long(l) => write!(f, "{l}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Double(d) => write_double(f, *d),
            Value::BigInteger(b) => write!(f, "{b}"),
            Value::BigDecimal(d) => write!(f, "{d}"),
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("}")
            }
            Value::List(items) | Value::Set(items) => {
                f.write_str("[")?;
                write_joined(f, items)?;
                f.write_str("]")
            }
            Value::Vertex(v) => write!(f, "v[{}]", v.id),
            Value::Edge(e) => write!(f, "e[{}][{}-{}->{}]", e.id, e.out_v.id, e.label, e.in_v.id),
            Value::Path(p) => {
                f.write_str("path[")?;
                write_joined(f, &p.objects)?;
                f.write_str("]")
            }
            Value::Property(p) => write!(f, "p[{}->{}]", p.key, p.value),
            Value::Bytecode(b) => {
                let render = |is: &[Instruction]| {
                    is.iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                write!(f, "[[{}], [{}]]", render(&b.sources), render(&b.steps))
            }
            Value::Lambda(l) => f.write_str(&l.script),
            Value::Custom(c) => write!(f, "{}[{}]", c.type_name, c.payload),
        }
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<BigInt> for Value {
    fn from(b: BigInt) -> Self {
        Value::BigInteger(b)
    }
}

impl From<BigDecimal> for Value {
    fn from(d: BigDecimal) -> Self {
        Value::BigDecimal(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Vertex> for Value {
    fn from(v: Vertex) -> Self {
        Value::Vertex(v)
    }
}

impl From<Edge> for Value {
    fn from(e: Edge) -> Self {
        Value::Edge(e)
    }
}

impl From<Path> for Value {
    fn from(p: Path) -> Self {
        Value::Path(p)
    }
}

impl From<Property> for Value {
    fn from(p: Property) -> Self {
        Value::Property(p)
    }
}

impl From<Bytecode> for Value {
    fn from(b: Bytecode) -> Self {
        Value::Bytecode(b)
    }
}

impl From<Lambda> for Value {
    fn from(l: Lambda) -> Self {
        Value::Lambda(l)
    }
}

impl From<CustomValue> for Value {
    fn from(c: CustomValue) -> Self {
        Value::Custom(c)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Plain JSON maps onto the narrowest core type that holds each node.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(l) = n.as_i64() {
                    i32::try_from(l).map_or(Value::Long(l), Value::Integer)
                } else if let Some(u) = n.as_u64() {
                    Value::BigInteger(BigInt::from(u))
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (Value::String(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

static CUSTOM_TYPES: OnceLock<CustomTypes> = OnceLock::new();

/// Table of extension type names accepted by [`classify`].
///
/// Installed at most once per process, before the first value of an
/// extension type is constructed. Until then no extension type classifies.
#[derive(Debug, Clone, Default)]
pub struct CustomTypes {
    names: BTreeSet<String>,
}

impl CustomTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, name: impl Into<String>) -> Self {
        self.names.insert(name.into());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Installs this table process-wide.
    ///
    /// Installing the same set of names again is a no-op; installing a
    /// different table after the first one fails.
    pub fn install(self) -> Result<&'static CustomTypes, ValueError> {
        let installed = CUSTOM_TYPES.get_or_init(|| self.clone());
        if installed.names == self.names {
            tracing::debug!("Custom type table installed ({} types)", installed.names.len());
            Ok(installed)
        } else {
            Err(ValueError::CustomTypesInstalled)
        }
    }

    /// Returns the installed table, if any.
    pub fn installed() -> Option<&'static CustomTypes> {
        CUSTOM_TYPES.get()
    }
}

/// Classifies a value, checking nested values and extension types.
///
/// Total over [`Value`]: every core shape maps to exactly one tag. Extension
/// values whose type name is not installed fail with
/// [`ValueError::UnsupportedType`], as does any such value nested inside.
pub fn classify(value: &Value) -> Result<TypeTag, ValueError> {
    check_nested(value)?;
    Ok(value.tag())
}

fn check_nested(value: &Value) -> Result<(), ValueError> {
    match value {
        Value::Map(entries) => entries.iter().try_for_each(|(k, v)| {
            check_nested(k)?;
            check_nested(v)
        }),
        Value::List(items) | Value::Set(items) => items.iter().try_for_each(check_nested),
        Value::Vertex(v) => check_nested(&v.id),
        Value::Edge(e) => {
            check_nested(&e.id)?;
            check_nested(&e.out_v.id)?;
            check_nested(&e.in_v.id)
        }
        Value::Path(p) => p.objects.iter().try_for_each(check_nested),
        Value::Property(p) => check_nested(&p.value),
        Value::Bytecode(b) => b
            .sources
            .iter()
            .chain(b.steps.iter())
            .flat_map(|i| i.arguments.iter())
            .try_for_each(check_nested),
        Value::Custom(c) => {
            let known = CustomTypes::installed().is_some_and(|t| t.contains(&c.type_name));
            if !known {
                return Err(ValueError::UnsupportedType(c.type_name.clone()));
            }
            check_nested(&c.payload)
        }
        _ => Ok(()),
    }
}

/// Explicit, lossless conversion of `value` into the shape of `tag`.
fn widen(tag: &TypeTag, value: Value) -> Result<Value, Value> {
    const MAX_EXACT_DOUBLE: u64 = 1 << 53;

    match (tag, value) {
        (TypeTag::Long, Value::Integer(i)) => Ok(Value::Long(i64::from(i))),
        (TypeTag::Double, Value::Integer(i)) => Ok(Value::Double(f64::from(i))),
        (TypeTag::Double, Value::Long(l)) if l.unsigned_abs() <= MAX_EXACT_DOUBLE => {
            Ok(Value::Double(l as f64))
        }
        (TypeTag::Integer, Value::Double(d))
            if d.fract() == 0.0 && d >= f64::from(i32::MIN) && d <= f64::from(i32::MAX) =>
        {
            Ok(Value::Integer(d as i32))
        }
        (TypeTag::Long, Value::Double(d))
            if d.fract() == 0.0 && d.abs() <= MAX_EXACT_DOUBLE as f64 =>
        {
            Ok(Value::Long(d as i64))
        }
        (TypeTag::BigInteger, Value::Integer(i)) => Ok(Value::BigInteger(BigInt::from(i))),
        (TypeTag::BigInteger, Value::Long(l)) => Ok(Value::BigInteger(BigInt::from(l))),
        (TypeTag::BigDecimal, Value::Integer(i)) => {
            Ok(Value::BigDecimal(BigDecimal::new(BigInt::from(i), 0)))
        }
        (TypeTag::BigDecimal, Value::Long(l)) => {
            Ok(Value::BigDecimal(BigDecimal::new(BigInt::from(l), 0)))
        }
        (TypeTag::BigDecimal, Value::BigInteger(b)) => {
            Ok(Value::BigDecimal(BigDecimal::new(b, 0)))
        }
        (_, value) => Err(value),
    }
}

/// A traversal argument or result: a value, its type, and an optional
/// binding name.
///
/// Equality compares `(tag, value)`; the name only affects display and
/// binding resolution.
#[derive(Debug, Clone)]
pub struct TypedValue {
    name: Option<String>,
    tag: TypeTag,
    value: Value,
}

impl TypedValue {
    /// Literal value, tag inferred by [`classify`].
    pub fn literal(value: impl Into<Value>) -> Result<Self, ValueError> {
        let value = value.into();
        let tag = classify(&value)?;
        Ok(Self {
            name: None,
            tag,
            value,
        })
    }

    /// Named variable resolved to `value`, tag inferred by [`classify`].
    pub fn named(name: impl Into<String>, value: impl Into<Value>) -> Result<Self, ValueError> {
        let name = valid_name(name.into())?;
        let mut typed = Self::literal(value)?;
        typed.name = Some(name);
        Ok(typed)
    }

    /// Literal with a caller-supplied tag.
    ///
    /// The value must already have the tag's shape or convert to it
    /// losslessly (e.g. an integral double requested as `Long`).
    pub fn typed(tag: TypeTag, value: impl Into<Value>) -> Result<Self, ValueError> {
        let value = value.into();
        let actual = classify(&value)?;
        if actual == tag {
            return Ok(Self {
                name: None,
                tag,
                value,
            });
        }
        match widen(&tag, value) {
            Ok(value) => Ok(Self {
                name: None,
                tag,
                value,
            }),
            Err(_) => Err(ValueError::TypeMismatch {
                expected: tag,
                actual,
            }),
        }
    }

    /// Named variable with a caller-supplied tag. See [`TypedValue::typed`].
    pub fn named_typed(
        name: impl Into<String>,
        tag: TypeTag,
        value: impl Into<Value>,
    ) -> Result<Self, ValueError> {
        let name = valid_name(name.into())?;
        let mut typed = Self::typed(tag, value)?;
        typed.name = Some(name);
        Ok(typed)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::core(TypeTag::String, Value::String(value.into()))
    }

    pub fn integer(value: i32) -> Self {
        Self::core(TypeTag::Integer, Value::Integer(value))
    }

    pub fn long(value: i64) -> Self {
        Self::core(TypeTag::Long, Value::Long(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::core(TypeTag::Boolean, Value::Boolean(value))
    }

    pub fn double(value: f64) -> Self {
        Self::core(TypeTag::Double, Value::Double(value))
    }

    fn core(tag: TypeTag, value: Value) -> Self {
        Self {
            name: None,
            tag,
            value,
        }
    }

    pub fn is_variable(&self) -> bool {
        self.name.is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn tag(&self) -> &TypeTag {
        &self.tag
    }

    pub fn get(&self) -> &Value {
        &self.value
    }

    pub fn into_inner(self) -> Value {
        self.value
    }

    /// Returns a copy bound to `name`.
    pub fn with_name(&self, name: impl Into<String>) -> Result<Self, ValueError> {
        Ok(Self {
            name: Some(valid_name(name.into())?),
            tag: self.tag.clone(),
            value: self.value.clone(),
        })
    }

    /// Returns a copy without a binding name.
    pub fn to_literal(&self) -> Self {
        Self {
            name: None,
            tag: self.tag.clone(),
            value: self.value.clone(),
        }
    }
}

fn valid_name(name: String) -> Result<String, ValueError> {
    if name.is_empty() {
        Err(ValueError::InvalidBindingName)
    } else {
        Ok(name)
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.value == other.value
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}&{}", name, self.value),
            None => write!(f, "{}", self.value),
        }
    }
}
