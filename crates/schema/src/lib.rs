//! Cumulus schema engine: derive filter attributes from an element schema,
//! compose list data-source schemas, and check attribute maps against a schema.

#![forbid(unsafe_code)]

use std::sync::Arc;

use cumulus_core::{AttrMap, AttrType, Attribute, Elem, Schema, Value};
use serde::Serialize;
use tracing::trace;

/// Attribute holding a data source's own identifier.
pub const ID_ATTRIBUTE: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("zone attribute {attribute:?} is declared as {found} in the element schema; expected string")]
    ZoneType { attribute: String, found: String },
    #[error("list attribute and zone attribute share the name {0:?}")]
    NameClash(String),
    #[error("{0:?} is reserved for the data source identifier")]
    Reserved(String),
}

/// Scalars and string maps can be filtered on; lists, sets and nested
/// resources cannot.
pub fn is_filterable(ty: &AttrType) -> bool {
    matches!(
        ty,
        AttrType::String | AttrType::Int | AttrType::Bool | AttrType::Float | AttrType::Map(Elem::String)
    )
}

/// One optional top-level attribute per filterable element attribute, same
/// name and type as the source. Names in `reserved` are skipped.
pub fn filter_attributes(element: &Schema, reserved: &[&str]) -> Schema {
    let mut out = Schema::new();
    for (name, attr) in element.iter() {
        if reserved.contains(&name) {
            trace!(attribute = name, "reserved name; no filter attribute");
            continue;
        }
        if !is_filterable(&attr.ty) {
            trace!(attribute = name, ty = %attr.ty, "not filterable");
            continue;
        }
        let filter = Attribute::optional(attr.ty.clone())
            .describe(format!("Only return elements whose `{}` matches this value", name));
        out.insert(name, filter);
    }
    out
}

/// Full schema of a list data source plus the pieces it was built from.
#[derive(Debug, Clone)]
pub struct ListSchema {
    /// Top-level data-source schema: id, zone, list attribute, filters.
    pub schema: Schema,
    /// Element schema, extended with the zone attribute.
    pub element: Arc<Schema>,
    /// Filter attributes only (a subset of `schema`).
    pub filters: Schema,
    pub list_attribute: String,
    pub zone_attribute: String,
}

/// Compose the data-source schema for a list of `element`s.
///
/// The zone is echoed into every element, so the element schema gains a
/// computed string attribute for it when it does not declare one.
pub fn compose_list_schema(
    mut element: Schema,
    list_attribute: &str,
    zone_attribute: &str,
) -> Result<ListSchema, SchemaError> {
    if list_attribute == zone_attribute {
        return Err(SchemaError::NameClash(list_attribute.to_string()));
    }
    for name in [list_attribute, zone_attribute] {
        if name == ID_ATTRIBUTE { return Err(SchemaError::Reserved(name.to_string())); }
    }
    match element.get(zone_attribute) {
        Some(attr) if attr.ty != AttrType::String => {
            return Err(SchemaError::ZoneType { attribute: zone_attribute.to_string(), found: attr.ty.to_string() });
        }
        Some(_) => {}
        None => {
            element.insert(zone_attribute, Attribute::computed(AttrType::String));
        }
    }
    let element = Arc::new(element);

    let filters = filter_attributes(&element, &[ID_ATTRIBUTE, zone_attribute, list_attribute]);
    let mut schema = filters.clone();
    schema.insert(ID_ATTRIBUTE, Attribute::computed(AttrType::String).describe("Digest of the listed element ids"));
    schema.insert(zone_attribute, Attribute::required(AttrType::String).describe("Zone to list from"));
    schema.insert(list_attribute, Attribute::computed(AttrType::Nested(Arc::clone(&element))));

    Ok(ListSchema {
        schema,
        element,
        filters,
        list_attribute: list_attribute.to_string(),
        zone_attribute: zone_attribute.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub error: String,
    pub hint: Option<String>,
}

/// Shape check of one value against a type. Nested elements are only checked
/// to be objects; [`validate_map`] descends into them.
pub fn conforms(value: &Value, ty: &AttrType) -> bool {
    fn elem(v: &Value, e: Elem) -> bool {
        match e {
            Elem::String => matches!(v, Value::String(_)),
            Elem::Int => matches!(v, Value::Int(_)),
            Elem::Bool => matches!(v, Value::Bool(_)),
            Elem::Float => matches!(v, Value::Float(_) | Value::Int(_)),
        }
    }
    match (ty, value) {
        (AttrType::String, v) => elem(v, Elem::String),
        (AttrType::Int, v) => elem(v, Elem::Int),
        (AttrType::Bool, v) => elem(v, Elem::Bool),
        (AttrType::Float, v) => elem(v, Elem::Float),
        (AttrType::List(e), Value::List(items)) => items.iter().all(|v| elem(v, *e)),
        (AttrType::Set(e), Value::Set(items)) => items.iter().all(|v| elem(v, *e)),
        (AttrType::Map(e), Value::Map(m)) => m.values().all(|v| elem(v, *e)),
        (AttrType::Nested(_), Value::List(items)) => items.iter().all(|v| matches!(v, Value::Object(_))),
        _ => false,
    }
}

/// Check every key of `map` against `schema`. Returns an empty list when the
/// map conforms. Presence of attributes is not checked.
pub fn validate_map(map: &AttrMap, schema: &Schema) -> Vec<ValidationIssue> {
    let mut out = Vec::new();
    walk_map(map, schema, "", &mut out);
    out
}

/// Check a single top-level write.
pub fn validate_attribute(schema: &Schema, name: &str, value: &Value) -> Vec<ValidationIssue> {
    let mut out = Vec::new();
    walk_value(schema, name, value, name, &mut out);
    out
}

fn walk_map(map: &AttrMap, schema: &Schema, base: &str, out: &mut Vec<ValidationIssue>) {
    for (k, v) in map.iter() {
        let path = if base.is_empty() { k.clone() } else { format!("{}.{}", base, k) };
        walk_value(schema, k, v, &path, out);
    }
}

fn walk_value(schema: &Schema, name: &str, value: &Value, path: &str, out: &mut Vec<ValidationIssue>) {
    let attr = match schema.get(name) {
        Some(a) => a,
        None => {
            out.push(ValidationIssue {
                path: path.to_string(),
                error: "attribute not declared in schema".into(),
                hint: Some("projectors may only emit schema attributes".into()),
            });
            return;
        }
    };
    if !conforms(value, &attr.ty) {
        out.push(ValidationIssue {
            path: path.to_string(),
            error: format!("expected {}, found {}", attr.ty, value.kind_name()),
            hint: Some("mismatched type".into()),
        });
        return;
    }
    if let (AttrType::Nested(inner), Value::List(items)) = (&attr.ty, value) {
        for (i, item) in items.iter().enumerate() {
            if let Value::Object(m) = item {
                walk_map(m, inner, &format!("{}[{}]", path, i), out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_core::attr_map;

    fn element() -> Schema {
        let pool = Schema::new()
            .with("id", Attribute::computed(AttrType::String))
            .with("size", Attribute::computed(AttrType::Int));
        Schema::new()
            .with("id", Attribute::computed(AttrType::String))
            .with("name", Attribute::computed(AttrType::String))
            .with("node_count", Attribute::computed(AttrType::Int))
            .with("ratio", Attribute::computed(AttrType::Float))
            .with("autoscale", Attribute::computed(AttrType::Bool))
            .with("tags", Attribute::computed(AttrType::Map(Elem::String)))
            .with("limits", Attribute::computed(AttrType::Map(Elem::Int)))
            .with("instance_ids", Attribute::computed(AttrType::List(Elem::String)))
            .with("zones", Attribute::computed(AttrType::Set(Elem::String)))
            .with("pools", Attribute::computed(AttrType::Nested(Arc::new(pool))))
    }

    #[test]
    fn only_scalars_and_string_maps_become_filters() {
        let f = filter_attributes(&element(), &["id"]);
        let names: Vec<&str> = f.names().collect();
        assert_eq!(names, vec!["autoscale", "name", "node_count", "ratio", "tags"]);
        for (_, attr) in f.iter() {
            assert_eq!(attr.mode, cumulus_core::Mode::Optional);
        }
        assert_eq!(f.get("tags").map(|a| &a.ty), Some(&AttrType::Map(Elem::String)));
    }

    #[test]
    fn compose_adds_id_zone_list_and_filters() {
        let ls = compose_list_schema(element(), "clusters", "zone").unwrap();
        assert_eq!(ls.schema.get("id").unwrap().mode, cumulus_core::Mode::Computed);
        assert_eq!(ls.schema.get("zone").unwrap().mode, cumulus_core::Mode::Required);
        assert!(matches!(ls.schema.get("clusters").unwrap().ty, AttrType::Nested(_)));
        assert!(ls.schema.contains("name"));
        assert!(!ls.filters.contains("id"));
        assert!(!ls.filters.contains("zone"));
        // zone is echoed into each element
        assert_eq!(ls.element.get("zone").unwrap().ty, AttrType::String);
    }

    #[test]
    fn compose_rejects_bad_names() {
        assert_eq!(
            compose_list_schema(element(), "zone", "zone").unwrap_err(),
            SchemaError::NameClash("zone".into())
        );
        assert_eq!(compose_list_schema(element(), "id", "zone").unwrap_err(), SchemaError::Reserved("id".into()));
        let bad = element().with("zone", Attribute::computed(AttrType::Int));
        assert!(matches!(compose_list_schema(bad, "clusters", "zone"), Err(SchemaError::ZoneType { .. })));
    }

    #[test]
    fn validate_reports_unknown_and_mistyped_keys() {
        let s = element();
        let ok = attr_map! { "id" => "x", "name" => "a", "ratio" => 1i64 };
        assert!(validate_map(&ok, &s).is_empty());

        let bad = attr_map! { "id" => 3i64, "colour" => "blue" };
        let issues = validate_map(&bad, &s);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|i| i.path == "colour"));
        assert!(issues.iter().any(|i| i.path == "id" && i.error == "expected string, found int"));
    }

    #[test]
    fn validate_descends_into_nested_elements() {
        let s = element();
        let pools = Value::List(vec![
            Value::Object(attr_map! { "id" => "p1", "size" => 3i64 }),
            Value::Object(attr_map! { "id" => "p2", "size" => "big" }),
        ]);
        let issues = validate_attribute(&s, "pools", &pools);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "pools[1].size");
    }
}
