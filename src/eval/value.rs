//! Runtime values of evaluated documents.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Serialize, Serializer};

use crate::core::types::{format_number, Literal};
use crate::errors::EvalError;
use crate::signal::Signal;

pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, EvalError>;

/// A callable value. Two functions are equal only if they are the same closure.
#[derive(Clone)]
pub struct Function {
    name: Option<Rc<str>>,
    body: Rc<NativeFn>,
}

impl Function {
    pub fn new(body: impl Fn(&[Value]) -> Result<Value, EvalError> + 'static) -> Self {
        Self { name: None, body: Rc::new(body) }
    }

    pub fn named(name: &str, body: impl Fn(&[Value]) -> Result<Value, EvalError> + 'static) -> Self {
        Self { name: Some(Rc::from(name)), body: Rc::new(body) }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        (self.body)(args)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "[function {}]", name),
            None => write!(f, "[function]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub props: IndexMap<String, Value>,
    pub children: Vec<Value>,
}

/// One step of a structural path into a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{}", key),
            PathSegment::Index(index) => write!(f, "{}", index),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<IndexMap<String, Value>>),
    Function(Function),
    Element(Rc<Element>),
    Signal(Signal<Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            // structural: NaN equals NaN, so a NaN write or recompute is not a change
            (Value::Number(a), Value::Number(b)) => OrderedFloat(*a) == OrderedFloat(*b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Element(a), Value::Element(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Signal(a), Value::Signal(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Number(n) => Value::Number(n.0),
            Literal::String(s) => Value::string(s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<Signal<Value>> for Value {
    fn from(signal: Signal<Value>) -> Self {
        Value::Signal(signal)
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Value::Function(function)
    }
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }

    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(Rc::new(fields.into_iter().map(|(k, v)| (k.into(), v)).collect()))
    }

    pub fn as_signal(&self) -> Option<&Signal<Value>> {
        match self {
            Value::Signal(signal) => Some(signal),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_signal(&self) -> bool {
        matches!(self, Value::Signal(_))
    }

    /// Read a signal's current value; other values are returned as they are.
    pub fn snapshot(self) -> Result<Value, EvalError> {
        match self {
            Value::Signal(signal) => Ok(signal.get()?),
            value => Ok(value),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Element(_) | Value::Signal(_) => {
                "object"
            }
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => if *b { 1.0 } else { 0.0 },
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        }
    }

    /// String conversion as used by `+` concatenation.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Array(items) => items.iter()
                .map(|item| match item {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.to_display_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) | Value::Element(_) | Value::Signal(_) => "[object Object]".to_string(),
            Value::Function(_) => "[function]".to_string(),
        }
    }

    /// `===`: primitives by value, everything else by identity.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Element(a), Value::Element(b)) => Rc::ptr_eq(a, b),
            _ => self == other,
        }
    }

    /// `==`: `null == undefined`, numbers compare with their string and boolean forms.
    pub fn loose_equals(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Undefined | Null, Undefined | Null) => true,
            (Undefined | Null, _) | (_, Undefined | Null) => false,
            (Number(_), String(_)) | (String(_), Number(_)) | (Boolean(_), _) | (_, Boolean(_)) => {
                self.to_number() == other.to_number()
            }
            _ => self.strict_equals(other),
        }
    }

    pub fn get_member(&self, name: &str) -> Value {
        match (self, name) {
            (Value::Object(fields), _) => fields.get(name).cloned().unwrap_or(Value::Undefined),
            (Value::Element(element), _) => {
                element.props.get(name).cloned().unwrap_or(Value::Undefined)
            }
            (Value::String(s), "length") => Value::Number(s.chars().count() as f64),
            (Value::Array(items), "length") => Value::Number(items.len() as f64),
            _ => Value::Undefined,
        }
    }

    pub fn get_index(&self, index: &Value) -> Value {
        match (self, index) {
            (Value::Array(items), Value::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => {
                items.get(*n as usize).cloned().unwrap_or(Value::Undefined)
            }
            (Value::String(s), Value::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => s
                .chars()
                .nth(*n as usize)
                .map(|c| Value::String(Rc::from(c.to_string())))
                .unwrap_or(Value::Undefined),
            (_, Value::String(key)) => self.get_member(key),
            _ => Value::Undefined,
        }
    }

    /// Child at one path step, for locating the cell that owns an assignment target.
    pub fn child(&self, segment: &PathSegment) -> Option<Value> {
        match (self, segment) {
            (Value::Object(fields), PathSegment::Key(key)) => fields.get(key).cloned(),
            (Value::Array(items), PathSegment::Index(index)) => items.get(*index).cloned(),
            _ => None,
        }
    }

    /// Replace the value at `path`, copying shared structure on the way down.
    pub fn set_path(&mut self, path: &[PathSegment], value: Value) -> Result<(), EvalError> {
        let Some((first, rest)) = path.split_first() else {
            *self = value;
            return Ok(());
        };
        match (self, first) {
            (Value::Object(fields), PathSegment::Key(key)) => {
                let fields = Rc::make_mut(fields);
                if rest.is_empty() {
                    fields.insert(key.clone(), value);
                    return Ok(());
                }
                match fields.get_mut(key) {
                    Some(child) => child.set_path(rest, value),
                    None => Err(EvalError::runtime(format!("cannot set properties of undefined ('{}')", key))),
                }
            }
            (Value::Array(items), PathSegment::Index(index)) => {
                let items = Rc::make_mut(items);
                if *index >= items.len() {
                    if !rest.is_empty() {
                        return Err(EvalError::runtime(format!("index {} out of bounds", index)));
                    }
                    items.resize(*index + 1, Value::Undefined);
                }
                items[*index].set_path(rest, value)
            }
            (target, segment) => Err(EvalError::runtime(format!(
                "cannot set '{}' on a {}",
                segment,
                target.type_of()
            ))),
        }
    }

    /// JSON rendering. Signals are read; functions and failed reads become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Undefined | Value::Null | Value::Function(_) => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Value::String(s) => Json::String(s.to_string()),
            Value::Array(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(fields) => Json::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
            ),
            Value::Element(element) => serde_json::json!({
                "tag": element.tag,
                "props": element.props.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<serde_json::Map<_, _>>(),
                "children": element.children.iter().map(Value::to_json).collect::<Vec<_>>(),
            }),
            Value::Signal(signal) => signal.get().map_or(Json::Null, |value| value.to_json()),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Boolean(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::string(s),
            Json::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            Json::Object(fields) => Value::object(
                fields.iter().map(|(k, v)| (k.clone(), Value::from_json(v)))
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
