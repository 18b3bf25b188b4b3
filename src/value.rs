//! Dynamic property values.
//!
//! Templates, property assignments, bound setters and signal arguments all carry [`Value`]s.
//! Numbers, booleans and strings are *literals*: the compiler emits them inline. Lists and maps
//! are *dynamic*: the compiler captures them in the template store and assigns them by index.

use indexmap::IndexMap;
use std::fmt;

/// An ordered string-keyed map of values.
pub type ValueMap = IndexMap<String, Value>;

/// A dynamically typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The absent value. Assigning it through an `alter` setter deletes an entry.
    Undefined,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<Value>),
    Map(ValueMap),
}

impl Default for Value {
    fn default() -> Value {
        Value::Undefined
    }
}

impl Value {
    /// Creates a map value from key-value pairs, keeping their order.
    pub fn map<K, I>(entries: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_undefined(&self) -> bool {
        match self {
            Value::Undefined => true,
            _ => false,
        }
    }

    /// Numbers, booleans and strings.
    pub fn is_literal(&self) -> bool {
        match self {
            Value::Bool(_) | Value::Number(_) | Value::Str(_) => true,
            _ => false,
        }
    }

    /// Lists and maps.
    pub fn is_dynamic(&self) -> bool {
        match self {
            Value::List(_) | Value::Map(_) => true,
            _ => false,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0. && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a key if this is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Value {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(list: Vec<Value>) -> Value {
        Value::List(list)
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Value {
        Value::Map(map)
    }
}

/// Formats values the way they appear in a builder listing: strings quoted, maps and lists
/// abbreviated.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(list) => write!(f, "[..{}]", list.len()),
            Value::Map(map) => write!(f, "{{..{}}}", map.len()),
        }
    }
}
