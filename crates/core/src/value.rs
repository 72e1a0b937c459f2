//! Attribute values and attribute maps.
//!
//! `Value` is the dynamic interop type shared by projectors, the filter engine
//! and the host. Set values are kept canonical (sorted, deduplicated) so that
//! structural equality does not depend on insertion order; build them with
//! [`Value::set`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::schema::{AttrType, Elem};

/// Attribute name -> value. Ordered so rendered state is stable.
pub type AttrMap = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Set(Vec<Value>),
    /// Map of primitive values.
    Map(BTreeMap<String, Value>),
    /// One element of a nested resource.
    Object(AttrMap),
}

/// A value could not be converted to the requested attribute type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, found {found}")]
pub struct TypeMismatch {
    pub expected: String,
    pub found: &'static str,
}

impl Value {
    /// Build a canonical set value.
    pub fn set<I: IntoIterator<Item = Value>>(items: I) -> Self {
        let mut v: Vec<Value> = items.into_iter().collect();
        v.sort_by(Value::total_cmp);
        v.dedup_by(|a, b| a.total_cmp(b) == Ordering::Equal);
        Value::Set(v)
    }

    /// Map of strings from any iterator of pairs.
    pub fn string_map<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.into(), Value::String(v.into()))).collect())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self { Value::String(s) => Some(s), _ => None }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self { Value::Int(i) => Some(*i), _ => None }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self { Value::Float(f) => Some(*f), Value::Int(i) => Some(*i as f64), _ => None }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self { Value::Bool(b) => Some(*b), _ => None }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self { Value::List(v) | Value::Set(v) => Some(v), _ => None }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self { Value::Map(m) | Value::Object(m) => Some(m), _ => None }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_))
    }

    /// Convert to `ty`, applying the host protocol's string/number conversions.
    pub fn coerce(&self, ty: &AttrType) -> Result<Value, TypeMismatch> {
        let out = match ty {
            AttrType::String => self.coerce_elem(Elem::String),
            AttrType::Int => self.coerce_elem(Elem::Int),
            AttrType::Bool => self.coerce_elem(Elem::Bool),
            AttrType::Float => self.coerce_elem(Elem::Float),
            AttrType::List(e) => self
                .as_list()
                .and_then(|items| items.iter().map(|v| v.coerce_elem(*e)).collect::<Option<Vec<_>>>())
                .map(Value::List),
            AttrType::Set(e) => self
                .as_list()
                .and_then(|items| items.iter().map(|v| v.coerce_elem(*e)).collect::<Option<Vec<_>>>())
                .map(Value::set),
            AttrType::Map(e) => self
                .as_map()
                .and_then(|m| {
                    m.iter()
                        .map(|(k, v)| v.coerce_elem(*e).map(|v| (k.clone(), v)))
                        .collect::<Option<BTreeMap<_, _>>>()
                })
                .map(Value::Map),
            AttrType::Nested(_) => match self {
                Value::List(_) => Some(self.clone()),
                _ => None,
            },
        };
        out.ok_or_else(|| TypeMismatch { expected: ty.to_string(), found: self.kind_name() })
    }

    fn coerce_elem(&self, e: Elem) -> Option<Value> {
        match (e, self) {
            (Elem::String, Value::String(s)) => Some(Value::String(s.clone())),
            (Elem::String, Value::Int(i)) => Some(Value::String(i.to_string())),
            (Elem::String, Value::Float(f)) => Some(Value::String(f.to_string())),
            (Elem::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (Elem::Int, Value::Int(i)) => Some(Value::Int(*i)),
            (Elem::Int, Value::Float(f))
                if f.is_finite() && f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 =>
            {
                Some(Value::Int(*f as i64))
            }
            (Elem::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::Int),
            (Elem::Float, Value::Float(f)) => Some(Value::Float(*f)),
            (Elem::Float, Value::Int(i)) => Some(Value::Float(*i as f64)),
            (Elem::Float, Value::String(s)) => s.trim().parse::<f64>().ok().map(Value::Float),
            (Elem::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
            (Elem::Bool, Value::String(s)) => match s.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Total order across variants; used to canonicalise sets.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Bool(_) => 0,
                Value::Int(_) => 1,
                Value::Float(_) => 2,
                Value::String(_) => 3,
                Value::List(_) => 4,
                Value::Set(_) => 5,
                Value::Map(_) => 6,
                Value::Object(_) => 7,
            }
        }
        fn seq(a: &[Value], b: &[Value]) -> Ordering {
            for (x, y) in a.iter().zip(b.iter()) {
                let o = x.total_cmp(y);
                if o != Ordering::Equal { return o; }
            }
            a.len().cmp(&b.len())
        }
        fn maps(a: &BTreeMap<String, Value>, b: &BTreeMap<String, Value>) -> Ordering {
            for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                let o = ka.cmp(kb).then_with(|| va.total_cmp(vb));
                if o != Ordering::Equal { return o; }
            }
            a.len().cmp(&b.len())
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) | (Value::Set(a), Value::Set(b)) => seq(a, b),
            (Value::Map(a), Value::Map(b)) | (Value::Object(a), Value::Object(b)) => maps(a, b),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }

    /// Convert from JSON. `null` has no attribute value and yields `None`;
    /// nulls nested in arrays or objects are dropped.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        use serde_json::Value as Json;
        match json {
            Json::Null => None,
            Json::Bool(b) => Some(Value::Bool(*b)),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Some(Value::Int(i)),
                None => n.as_f64().map(Value::Float),
            },
            Json::String(s) => Some(Value::String(s.clone())),
            Json::Array(arr) => Some(Value::List(arr.iter().filter_map(Value::from_json).collect())),
            Json::Object(obj) => Some(Value::Map(
                obj.iter().filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v))).collect(),
            )),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        // Value serializes untagged; floats that JSON cannot carry become null.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::String(v.to_string()) }
}

impl From<String> for Value {
    fn from(v: String) -> Self { Value::String(v) }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self { Value::String(v.clone()) }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Int(v) }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self { Value::Int(v as i64) }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self { Value::Int(v as i64) }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Float(v) }
}

impl From<AttrMap> for Value {
    fn from(v: AttrMap) -> Self { Value::Object(v) }
}

/// Build an [`AttrMap`] from `key => value` pairs.
#[macro_export]
macro_rules! attr_map {
    () => { $crate::AttrMap::new() };
    ($($k:expr => $v:expr),+ $(,)?) => {{
        let mut m = $crate::AttrMap::new();
        $( m.insert(::std::string::String::from($k), $crate::Value::from($v)); )+
        m
    }};
}
