//! Schemas: attribute name -> descriptor (semantic type + mode).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::value::Value;

/// Primitive element type of list/set/map attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Elem {
    String,
    Int,
    Bool,
    Float,
}

impl Elem {
    pub fn zero(self) -> Value {
        match self {
            Elem::String => Value::String(String::new()),
            Elem::Int => Value::Int(0),
            Elem::Bool => Value::Bool(false),
            Elem::Float => Value::Float(0.0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Elem::String => "string",
            Elem::Int => "int",
            Elem::Bool => "bool",
            Elem::Float => "float",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "of", rename_all = "snake_case")]
pub enum AttrType {
    String,
    Int,
    Bool,
    Float,
    List(Elem),
    Set(Elem),
    Map(Elem),
    /// List of nested elements described by their own schema.
    Nested(Arc<Schema>),
}

impl AttrType {
    /// Value an absent source field projects to.
    pub fn zero(&self) -> Value {
        match self {
            AttrType::String => Elem::String.zero(),
            AttrType::Int => Elem::Int.zero(),
            AttrType::Bool => Elem::Bool.zero(),
            AttrType::Float => Elem::Float.zero(),
            AttrType::List(_) | AttrType::Nested(_) => Value::List(Vec::new()),
            AttrType::Set(_) => Value::Set(Vec::new()),
            AttrType::Map(_) => Value::Map(BTreeMap::new()),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, AttrType::String | AttrType::Int | AttrType::Bool | AttrType::Float)
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrType::String => f.write_str("string"),
            AttrType::Int => f.write_str("int"),
            AttrType::Bool => f.write_str("bool"),
            AttrType::Float => f.write_str("float"),
            AttrType::List(e) => write!(f, "list({})", e.name()),
            AttrType::Set(e) => write!(f, "set({})", e.name()),
            AttrType::Map(e) => write!(f, "map({})", e.name()),
            AttrType::Nested(_) => f.write_str("nested"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Required,
    Optional,
    Computed,
    OptionalComputed,
}

impl Mode {
    pub fn is_user_settable(self) -> bool {
        !matches!(self, Mode::Computed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    #[serde(flatten)]
    pub ty: AttrType,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Attribute {
    pub fn new(ty: AttrType, mode: Mode) -> Self { Self { ty, mode, description: None } }
    pub fn required(ty: AttrType) -> Self { Self::new(ty, Mode::Required) }
    pub fn optional(ty: AttrType) -> Self { Self::new(ty, Mode::Optional) }
    pub fn computed(ty: AttrType) -> Self { Self::new(ty, Mode::Computed) }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

/// Immutable once built; shared behind `Arc` by data sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Schema {
    attributes: BTreeMap<String, Attribute>,
}

impl Schema {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Insert or replace; returns the previous descriptor.
    pub fn insert(&mut self, name: impl Into<String>, attr: Attribute) -> Option<Attribute> {
        self.attributes.insert(name.into(), attr)
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> { self.attributes.get(name) }
    pub fn contains(&self, name: &str) -> bool { self.attributes.contains_key(name) }
    pub fn len(&self) -> usize { self.attributes.len() }
    pub fn is_empty(&self) -> bool { self.attributes.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> { self.attributes.keys().map(|k| k.as_str()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_per_type() {
        assert_eq!(AttrType::String.zero(), Value::String(String::new()));
        assert_eq!(AttrType::Int.zero(), Value::Int(0));
        assert_eq!(AttrType::Map(Elem::String).zero(), Value::Map(BTreeMap::new()));
        assert_eq!(AttrType::Nested(Arc::new(Schema::new())).zero(), Value::List(vec![]));
    }

    #[test]
    fn schema_serializes_with_type_and_mode() {
        let s = Schema::new()
            .with("id", Attribute::computed(AttrType::String))
            .with("tags", Attribute::optional(AttrType::Map(Elem::String)).describe("labels"));
        let j = serde_json::to_value(&s).unwrap();
        assert_eq!(j["id"], serde_json::json!({"type": "string", "mode": "computed"}));
        assert_eq!(j["tags"], serde_json::json!({"type": "map", "of": "string", "mode": "optional", "description": "labels"}));
    }
}
