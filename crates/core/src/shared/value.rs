use std::collections::BTreeMap;
use std::fmt;

/// Identifies a live engine object in the worker's handle table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u32);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Dynamically typed value exchanged with the engine: method arguments,
/// function return values and recognizer results/settings.
///
/// `Buffer` payloads are moved across the worker boundary, never copied.
/// `Remote` marks an argument that refers to another engine object; the
/// worker resolves it against its own handle table before dispatch.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Buffer(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Remote(ObjectHandle),
}

impl Value {
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&[u8]> {
        match self {
            Value::Buffer(b) => Some(b),
            _ => None,
        }
    }

    /// Total size of all buffers reachable from this value.
    pub fn transferable_bytes(&self) -> usize {
        match self {
            Value::Buffer(b) => b.len(),
            Value::List(items) => items.iter().map(Value::transferable_bytes).sum(),
            Value::Map(entries) => entries.values().map(Value::transferable_bytes).sum(),
            _ => 0,
        }
    }

    /// Number of buffers reachable from this value.
    pub fn transferable_count(&self) -> usize {
        match self {
            Value::Buffer(_) => 1,
            Value::List(items) => items.iter().map(Value::transferable_count).sum(),
            Value::Map(entries) => entries.values().map(Value::transferable_count).sum(),
            _ => 0,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Buffer(v)
    }
}
