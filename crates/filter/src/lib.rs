//! Cumulus filter engine: compile user-supplied filter values into typed
//! predicates and evaluate them against projected attribute maps.
//!
//! Matching rules by attribute type:
//! - string / int / float / bool: exact equality (strings are case-sensitive)
//! - map of strings: every pair in the filter must be present in the record;
//!   extra record keys are allowed
//!
//! A record matches when every predicate matches. A record missing the
//! filtered attribute is compared as if it held the type's zero value.

#![forbid(unsafe_code)]

use cumulus_core::{AttrMap, AttrType, Elem, Schema, TypeMismatch, Value};
use cumulus_schema::is_filterable;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Exact,
    /// Filter map must be a subset of the record map.
    Subset,
}

impl MatchRule {
    fn for_type(ty: &AttrType) -> Self {
        match ty {
            AttrType::Map(_) => MatchRule::Subset,
            _ => MatchRule::Exact,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    pub attribute: String,
    pub expected: Value,
    #[serde(skip)]
    pub ty: AttrType,
    pub rule: MatchRule,
}

impl Predicate {
    pub fn matches(&self, attrs: &AttrMap) -> bool {
        let zero;
        let actual = match attrs.get(&self.attribute) {
            Some(v) => v,
            None => {
                zero = self.ty.zero();
                &zero
            }
        };
        match self.rule {
            MatchRule::Exact => scalar_eq(actual, &self.expected),
            MatchRule::Subset => match (actual.as_map(), self.expected.as_map()) {
                (Some(have), Some(want)) => want.iter().all(|(k, v)| have.get(k) == Some(v)),
                _ => false,
            },
        }
    }
}

fn scalar_eq(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (a, b) => a == b,
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterError {
    #[error("invalid value for filter {attribute:?}: {source}")]
    InvalidFilterType {
        attribute: String,
        #[source]
        source: TypeMismatch,
    },
    #[error("unknown attribute {0:?}")]
    UnknownAttribute(String),
    #[error("attribute {attribute:?} of type {ty} cannot be filtered on")]
    NotFilterable { attribute: String, ty: String },
    #[error("malformed filter expression {0:?}; expected name=value")]
    Malformed(String),
}

impl FilterError {
    /// Attribute the error is about, when there is one.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            FilterError::InvalidFilterType { attribute, .. } => Some(attribute),
            FilterError::UnknownAttribute(a) => Some(a),
            FilterError::NotFilterable { attribute, .. } => Some(attribute),
            FilterError::Malformed(_) => None,
        }
    }
}

fn build(attribute: &str, ty: &AttrType, value: &Value) -> Result<Predicate, FilterError> {
    let expected = value
        .coerce(ty)
        .map_err(|source| FilterError::InvalidFilterType { attribute: attribute.to_string(), source })?;
    Ok(Predicate { attribute: attribute.to_string(), expected, ty: ty.clone(), rule: MatchRule::for_type(ty) })
}

/// Compile the supplied values of `filters` (the filter attributes of a data
/// source) into predicates ordered by attribute name. Keys of `input` that
/// are not filter attributes are ignored.
pub fn compile(filters: &Schema, input: &AttrMap) -> Result<Vec<Predicate>, FilterError> {
    let mut out = Vec::new();
    for (name, value) in input.iter() {
        let Some(attr) = filters.get(name) else { continue };
        out.push(build(name, &attr.ty, value)?);
    }
    debug!(predicates = out.len(), "compiled filters");
    Ok(out)
}

/// Build a single predicate against an element schema.
pub fn predicate_for(element: &Schema, name: &str, value: &Value) -> Result<Predicate, FilterError> {
    let attr = element.get(name).ok_or_else(|| FilterError::UnknownAttribute(name.to_string()))?;
    if !is_filterable(&attr.ty) {
        return Err(FilterError::NotFilterable { attribute: name.to_string(), ty: attr.ty.to_string() });
    }
    build(name, &attr.ty, value)
}

/// Parse `name=value` into a predicate. String-map attributes take
/// `name=k1:v1,k2:v2` (`k=v` pairs are accepted too).
pub fn parse_filter(element: &Schema, expr: &str) -> Result<Predicate, FilterError> {
    let (name, raw) = expr.split_once('=').ok_or_else(|| FilterError::Malformed(expr.to_string()))?;
    let name = name.trim();
    if name.is_empty() { return Err(FilterError::Malformed(expr.to_string())); }
    let attr = element.get(name).ok_or_else(|| FilterError::UnknownAttribute(name.to_string()))?;
    let value = match attr.ty {
        AttrType::Map(Elem::String) => {
            let mut pairs = Vec::new();
            for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let (k, v) = part
                    .split_once(':')
                    .or_else(|| part.split_once('='))
                    .ok_or_else(|| FilterError::Malformed(expr.to_string()))?;
                pairs.push((k.trim().to_string(), v.trim().to_string()));
            }
            Value::string_map(pairs)
        }
        _ => Value::String(raw.to_string()),
    };
    predicate_for(element, name, &value)
}

/// True when every predicate matches `attrs`. An empty sequence matches.
pub fn check_for_match(attrs: &AttrMap, preds: &[Predicate]) -> bool {
    preds.iter().all(|p| p.matches(attrs))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub attribute: String,
    pub remaining: usize,
}

/// Survivor counts after each predicate, for `--explain` style output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterExplain {
    pub total: usize,
    pub matched: usize,
    pub stages: SmallVec<[Stage; 8]>,
}

/// Keep the maps matching every predicate, preserving input order.
pub fn apply(maps: Vec<AttrMap>, preds: &[Predicate]) -> (Vec<AttrMap>, FilterExplain) {
    let started = std::time::Instant::now();
    let total = maps.len();
    let mut keep: Vec<bool> = vec![true; total];
    let mut remaining = total;
    let mut stages: SmallVec<[Stage; 8]> = SmallVec::new();
    for p in preds.iter() {
        for (i, m) in maps.iter().enumerate() {
            if keep[i] && !p.matches(m) {
                keep[i] = false;
                remaining -= 1;
            }
        }
        stages.push(Stage { attribute: p.attribute.clone(), remaining });
    }
    let out: Vec<AttrMap> = maps.into_iter().zip(keep).filter_map(|(m, k)| k.then_some(m)).collect();
    metrics::histogram!("filter_eval_ms", started.elapsed().as_secs_f64() * 1_000.0);
    let explain = FilterExplain { total, matched: out.len(), stages };
    (out, explain)
}
