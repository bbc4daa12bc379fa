use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::content::{Content, WordMl};

/// A mapping from context keys to values.
pub type Map = BTreeMap<String, RuntimeValue>;

/// Key prefix marking a string as raw WordprocessingML markup.
pub const WORD_ML_PREFIX: &str = "word_ml:";

/// A caller-defined value with its own members and, optionally, its own
/// enumeration. Anything that can produce an ordered list of items can be
/// looped over, whether or not it is a list itself.
pub trait Object: fmt::Debug {
    fn type_name(&self) -> &str;

    /// Zero-argument member access. `None` means the member does not exist.
    fn member(&self, name: &str) -> Option<RuntimeValue>;

    /// The items to iterate over, if the object supports enumeration.
    fn enumerate(&self) -> Option<Vec<RuntimeValue>> {
        None
    }

    /// Zero-argument boolean predicate, e.g. `empty?`.
    fn predicate(&self, _name: &str) -> Option<bool> {
        None
    }

    fn to_text(&self) -> String {
        String::new()
    }
}

/// A value taken from the merge context.
#[derive(Debug, Clone)]
pub enum RuntimeValue {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<RuntimeValue>),
    Map(Map),
    /// Something that knows how to splice itself into the document.
    Content(Rc<dyn Content>),
    Object(Rc<dyn Object>),
}

impl RuntimeValue {
    /// Build a map value from key/value pairs.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, RuntimeValue)>) -> Self {
        RuntimeValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn content(content: impl Content + 'static) -> Self {
        RuntimeValue::Content(Rc::new(content))
    }

    pub fn object(object: impl Object + 'static) -> Self {
        RuntimeValue::Object(Rc::new(object))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, RuntimeValue::Nil)
    }

    /// `nil` and `false` are falsy, collections are truthy when non-empty,
    /// everything else (the empty string included) is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            RuntimeValue::Nil | RuntimeValue::Boolean(false) => false,
            RuntimeValue::List(items) => !items.is_empty(),
            RuntimeValue::Map(entries) => !entries.is_empty(),
            RuntimeValue::Object(object) => match object.enumerate() {
                Some(items) => !items.is_empty(),
                None => true,
            },
            _ => true,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            RuntimeValue::Nil => "nil",
            RuntimeValue::Boolean(_) => "Boolean",
            RuntimeValue::Integer(_) => "Integer",
            RuntimeValue::Float(_) => "Float",
            RuntimeValue::String(_) => "String",
            RuntimeValue::List(_) => "List",
            RuntimeValue::Map(_) => "Map",
            RuntimeValue::Content(content) => content.kind(),
            RuntimeValue::Object(object) => object.type_name(),
        }
    }

    /// The enumeration contract: lists enumerate their items, maps their
    /// entries as `{key, value}` pairs, objects whatever they choose to.
    pub fn enumerate(&self) -> Option<Vec<RuntimeValue>> {
        match self {
            RuntimeValue::List(items) => Some(items.clone()),
            RuntimeValue::Map(entries) => Some(
                entries
                    .iter()
                    .map(|(k, v)| {
                        RuntimeValue::map([
                            ("key", RuntimeValue::String(k.clone())),
                            ("value", v.clone()),
                        ])
                    })
                    .collect(),
            ),
            RuntimeValue::Object(object) => object.enumerate(),
            _ => None,
        }
    }

    /// Zero-argument member access. Maps look the member up as a key (absent
    /// keys are nil); other values expose a small fixed set of members.
    /// Returns `None` for members that do not exist.
    pub fn member(&self, name: &str) -> Option<RuntimeValue> {
        match self {
            RuntimeValue::Nil => Some(RuntimeValue::Nil),
            RuntimeValue::Map(entries) => match entries.get(name) {
                Some(value) => Some(value.clone()),
                None => collection_member(self, name).or(Some(RuntimeValue::Nil)),
            },
            RuntimeValue::Object(object) => object.member(name),
            RuntimeValue::String(s) => match name {
                "upcase" => Some(RuntimeValue::String(s.to_uppercase())),
                "downcase" => Some(RuntimeValue::String(s.to_lowercase())),
                "strip" => Some(RuntimeValue::String(s.trim().to_string())),
                "size" | "length" => Some(RuntimeValue::Integer(s.chars().count() as i64)),
                "to_s" => Some(self.clone()),
                _ => None,
            },
            RuntimeValue::List(_) => collection_member(self, name),
            _ => match name {
                "to_s" => Some(RuntimeValue::String(self.to_string())),
                _ => None,
            },
        }
    }

    /// Zero-argument predicate used by `NAME:if(PRED)`. `None` for unknown predicates.
    pub fn predicate(&self, name: &str) -> Option<bool> {
        if let RuntimeValue::Object(object) = self {
            if let Some(answer) = object.predicate(name) {
                return Some(answer);
            }
        }

        match name {
            "nil?" => Some(self.is_nil()),
            "present?" => Some(!self.is_blank()),
            "blank?" => Some(self.is_blank()),
            "true?" => Some(matches!(self, RuntimeValue::Boolean(true))),
            "false?" => Some(matches!(self, RuntimeValue::Boolean(false))),
            "empty?" => self.length().map(|n| n == 0),
            "any?" => self.length().map(|n| n > 0),
            "zero?" => self.as_number().map(|n| n == 0.0),
            "positive?" => self.as_number().map(|n| n > 0.0),
            "negative?" => self.as_number().map(|n| n < 0.0),
            "even?" => match self {
                RuntimeValue::Integer(n) => Some(n % 2 == 0),
                _ => None,
            },
            "odd?" => match self {
                RuntimeValue::Integer(n) => Some(n % 2 != 0),
                _ => None,
            },
            _ => None,
        }
    }

    fn length(&self) -> Option<usize> {
        match self {
            RuntimeValue::String(s) => Some(s.chars().count()),
            RuntimeValue::List(items) => Some(items.len()),
            RuntimeValue::Map(entries) => Some(entries.len()),
            RuntimeValue::Object(object) => object.enumerate().map(|items| items.len()),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            RuntimeValue::Integer(n) => Some(*n as f64),
            RuntimeValue::Float(n) => Some(*n),
            _ => None,
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            RuntimeValue::Nil | RuntimeValue::Boolean(false) => true,
            RuntimeValue::String(s) => s.trim().is_empty(),
            other => other.length() == Some(0),
        }
    }

    /// Rewrite `word_ml:`-prefixed keys, recursively, into raw markup content
    /// stored under the unprefixed key.
    pub fn transform_markup_keys(self) -> RuntimeValue {
        match self {
            RuntimeValue::Map(entries) => RuntimeValue::Map(transform_map(entries)),
            RuntimeValue::List(items) => RuntimeValue::List(
                items
                    .into_iter()
                    .map(RuntimeValue::transform_markup_keys)
                    .collect(),
            ),
            other => other,
        }
    }
}

pub(crate) fn transform_map(entries: Map) -> Map {
    entries
        .into_iter()
        .map(|(key, value)| match key.strip_prefix(WORD_ML_PREFIX) {
            Some(name) => {
                let value = match value {
                    RuntimeValue::String(xml) => RuntimeValue::content(WordMl::new(xml)),
                    other => other.transform_markup_keys(),
                };
                (name.to_string(), value)
            }
            None => (key, value.transform_markup_keys()),
        })
        .collect()
}

fn collection_member(value: &RuntimeValue, name: &str) -> Option<RuntimeValue> {
    let items = match value {
        RuntimeValue::List(items) => items.clone(),
        RuntimeValue::Map(entries) => {
            return match name {
                "size" | "length" | "count" => Some(RuntimeValue::Integer(entries.len() as i64)),
                "keys" => Some(RuntimeValue::List(
                    entries.keys().cloned().map(RuntimeValue::String).collect(),
                )),
                "values" => Some(RuntimeValue::List(entries.values().cloned().collect())),
                _ => None,
            };
        }
        _ => return None,
    };

    match name {
        "size" | "length" | "count" => Some(RuntimeValue::Integer(items.len() as i64)),
        "first" => Some(items.first().cloned().unwrap_or(RuntimeValue::Nil)),
        "last" => Some(items.last().cloned().unwrap_or(RuntimeValue::Nil)),
        _ => None,
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::Nil => Ok(()),
            RuntimeValue::Boolean(b) => write!(f, "{}", b),
            RuntimeValue::Integer(n) => write!(f, "{}", n),
            RuntimeValue::Float(n) => {
                if n.is_finite() && *n == n.floor() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            RuntimeValue::String(s) => write!(f, "{}", s),
            RuntimeValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            RuntimeValue::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            RuntimeValue::Content(content) => write!(f, "<{}>", content.kind()),
            RuntimeValue::Object(object) => write!(f, "{}", object.to_text()),
        }
    }
}

impl PartialEq for RuntimeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RuntimeValue::Nil, RuntimeValue::Nil) => true,
            (RuntimeValue::Boolean(a), RuntimeValue::Boolean(b)) => a == b,
            (RuntimeValue::Integer(a), RuntimeValue::Integer(b)) => a == b,
            (RuntimeValue::Float(a), RuntimeValue::Float(b)) => a == b,
            (RuntimeValue::String(a), RuntimeValue::String(b)) => a == b,
            (RuntimeValue::List(a), RuntimeValue::List(b)) => a == b,
            (RuntimeValue::Map(a), RuntimeValue::Map(b)) => a == b,
            (RuntimeValue::Content(a), RuntimeValue::Content(b)) => Rc::ptr_eq(a, b),
            (RuntimeValue::Object(a), RuntimeValue::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for RuntimeValue {
    fn from(value: &str) -> Self {
        RuntimeValue::String(value.to_string())
    }
}

impl From<String> for RuntimeValue {
    fn from(value: String) -> Self {
        RuntimeValue::String(value)
    }
}

impl From<bool> for RuntimeValue {
    fn from(value: bool) -> Self {
        RuntimeValue::Boolean(value)
    }
}

impl From<i64> for RuntimeValue {
    fn from(value: i64) -> Self {
        RuntimeValue::Integer(value)
    }
}

impl From<f64> for RuntimeValue {
    fn from(value: f64) -> Self {
        RuntimeValue::Float(value)
    }
}

impl From<Map> for RuntimeValue {
    fn from(value: Map) -> Self {
        RuntimeValue::Map(value)
    }
}

impl<T: Into<RuntimeValue>> From<Vec<T>> for RuntimeValue {
    fn from(value: Vec<T>) -> Self {
        RuntimeValue::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<RuntimeValue>> From<Option<T>> for RuntimeValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(RuntimeValue::Nil)
    }
}
