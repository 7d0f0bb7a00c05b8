// ABOUTME: The value domain carried across the wire by the romp codec
// ABOUTME: Nil, booleans, integers, strings, byte strings, arrays, maps, object references, and exceptions

use bytes::Bytes;

use crate::registry::ObjectId;

/// A value that can cross the wire: a call's arguments, a method's return
/// value, a thrown exception, or a yielded block argument are all `Value`s.
///
/// `ObjectRef` is the distinguished "remote-object reference" value: when a
/// server hands back a registered object, the dispatch layer wraps it in
/// `Value::ObjectRef(id)` (via [`crate::registry::Registry::create_reference`])
/// so the client receives a proxy rather than a by-value copy.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Bytes),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    ObjectRef(ObjectId),
    Exception(ExceptionValue),
}

impl Value {
    /// Walks the value tree and returns every `ObjectRef` id found, in
    /// depth-first order. Used by the client's payload post-processing to
    /// rewrite references into proxies, including ones nested inside
    /// arrays or maps.
    pub fn object_refs(&self) -> Vec<ObjectId> {
        let mut out = Vec::new();
        self.collect_object_refs(&mut out);
        out
    }

    fn collect_object_refs(&self, out: &mut Vec<ObjectId>) {
        match self {
            Value::ObjectRef(id) => out.push(*id),
            Value::Array(items) => items.iter().for_each(|v| v.collect_object_refs(out)),
            Value::Map(pairs) => pairs.iter().for_each(|(k, v)| {
                k.collect_object_refs(out);
                v.collect_object_refs(out);
            }),
            _ => {}
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Raised by a `TryFrom<Value>` impl when a call's return value isn't the
/// shape the caller asked for. Backs [`crate::client::Proxy::call_as`], the
/// typed convenience layered over the single untyped `call`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected a {expected} value, got {got:?}")]
pub struct ValueTypeError {
    pub expected: &'static str,
    pub got: Value,
}

impl TryFrom<Value> for i64 {
    type Error = ValueTypeError;
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int(n) => Ok(n),
            other => Err(ValueTypeError { expected: "Int", got: other }),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = ValueTypeError;
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(ValueTypeError { expected: "Str", got: other }),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = ValueTypeError;
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(ValueTypeError { expected: "Bool", got: other }),
        }
    }
}

/// An application-defined exception value: a class name, a human-readable
/// message, and a backtrace. The server trims dispatch-frame suffixes
/// before sending; the client appends the caller's own frame on receipt so
/// the combined backtrace reads as if the call had been local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionValue {
    pub class_name: String,
    pub message: String,
    pub backtrace: Vec<String>,
}

impl ExceptionValue {
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        ExceptionValue {
            class_name: class_name.into(),
            message: message.into(),
            backtrace: Vec::new(),
        }
    }

    pub fn with_backtrace(mut self, backtrace: Vec<String>) -> Self {
        self.backtrace = backtrace;
        self
    }

    /// Appends a single frame, typically the caller's own call site, so
    /// the backtrace reads server-frames-then-caller-frame.
    pub fn push_frame(mut self, frame: String) -> Self {
        self.backtrace.push(frame);
        self
    }
}

impl std::fmt::Display for ExceptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.class_name, self.message)
    }
}

impl std::error::Error for ExceptionValue {}
