//! Element schemas and projectors for clusters and node pools.
//!
//! Absent optional fields project to the zero value of their attribute type,
//! so every element carries every declared attribute.

use chrono::SecondsFormat;
use cumulus_core::{attr_map, AttrMap, AttrType, Attribute, Elem, Schema, Value};

use crate::model::{Cluster, Pool};

fn computed(ty: AttrType, doc: &str) -> Attribute { Attribute::computed(ty).describe(doc) }

fn tags(map: &std::collections::BTreeMap<String, String>) -> Value { Value::string_map(map.iter()) }

fn size(n: Option<u32>) -> Value { Value::Int(n.map(i64::from).unwrap_or(0)) }

/// Element schema of one node pool.
pub fn pool_schema() -> Schema {
    Schema::new()
        .with("id", computed(AttrType::String, "Node pool identifier"))
        .with("cluster_id", computed(AttrType::String, "Identifier of the owning cluster"))
        .with("name", computed(AttrType::String, "Node pool name"))
        .with("node_type", computed(AttrType::String, "Commercial type of the pool's nodes"))
        .with("size", computed(AttrType::Int, "Current number of nodes"))
        .with("autoscaling", computed(AttrType::Bool, "Whether the pool scales automatically"))
        .with("min_size", computed(AttrType::Int, "Autoscaling lower bound"))
        .with("max_size", computed(AttrType::Int, "Autoscaling upper bound"))
        .with("tags", computed(AttrType::Map(Elem::String), "Tags on the node pool"))
}

/// Element schema of one cluster; pools are nested.
pub fn cluster_schema() -> Schema {
    Schema::new()
        .with("id", computed(AttrType::String, "Cluster identifier"))
        .with("name", computed(AttrType::String, "Cluster name"))
        .with("version", computed(AttrType::String, "Kubernetes version"))
        .with("status", computed(AttrType::String, "Lifecycle status"))
        .with("node_count", computed(AttrType::Int, "Nodes across all pools"))
        .with("description", computed(AttrType::String, "Free-form description"))
        .with("created_at", computed(AttrType::String, "Creation time, RFC 3339"))
        .with("private_network_id", computed(AttrType::String, "Attached private network"))
        .with("tags", computed(AttrType::Map(Elem::String), "Tags on the cluster"))
        .with("instance_ids", computed(AttrType::List(Elem::String), "Instances backing the nodes"))
        .with("pools", computed(AttrType::Nested(pool_schema().into()), "Node pools of the cluster"))
}

pub fn project_pool(p: &Pool) -> AttrMap {
    attr_map! {
        "id" => p.id.as_str(),
        "cluster_id" => p.cluster_id.as_str(),
        "name" => p.name.as_str(),
        "node_type" => p.node_type.as_str(),
        "size" => p.size,
        "autoscaling" => p.autoscaling,
        "min_size" => size(p.min_size),
        "max_size" => size(p.max_size),
        "tags" => tags(&p.tags),
    }
}

pub fn project_cluster(c: &Cluster) -> AttrMap {
    let created = c.created_at.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)).unwrap_or_default();
    attr_map! {
        "id" => c.id.as_str(),
        "name" => c.name.as_str(),
        "version" => c.version.as_str(),
        "status" => c.status.as_str(),
        "node_count" => size(c.node_count),
        "description" => c.description.clone().unwrap_or_default(),
        "created_at" => created,
        "private_network_id" => c.private_network_id.clone().unwrap_or_default(),
        "tags" => tags(&c.tags),
        "instance_ids" => Value::List(c.instance_ids.iter().map(Value::from).collect()),
        "pools" => Value::List(c.owned_pools().map(|p| Value::Object(project_pool(&p))).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_core::Projector;

    fn bare_cluster() -> Cluster {
        serde_json::from_value(serde_json::json!({"id": "c1", "name": "alpha"})).unwrap()
    }

    #[test]
    fn projection_covers_the_schema() {
        let c: Cluster = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "name": "alpha",
            "pools": [{"id": "p1", "name": "default", "min_size": 1}]
        }))
        .unwrap();
        let m = project_cluster(&c);
        let schema = cluster_schema();
        let names: Vec<&str> = schema.names().collect();
        assert_eq!(m.keys().map(String::as_str).collect::<Vec<_>>(), names);

        let pools = m["pools"].as_list().unwrap();
        let pool = pools[0].as_map().unwrap();
        let pools_schema = pool_schema();
        assert_eq!(pool.keys().map(String::as_str).collect::<Vec<_>>(), pools_schema.names().collect::<Vec<_>>());
        assert_eq!(pool["cluster_id"], Value::from("c1"));
        assert_eq!(pool["min_size"], Value::Int(1));
        assert_eq!(pool["max_size"], Value::Int(0));
    }

    #[test]
    fn absent_fields_project_to_zero_values() {
        let m = project_cluster(&bare_cluster());
        assert_eq!(m["description"], Value::from(""));
        assert_eq!(m["created_at"], Value::from(""));
        assert_eq!(m["node_count"], Value::Int(0));
        assert_eq!(m["instance_ids"], Value::List(Vec::new()));
        assert_eq!(m["tags"], Value::Map(Default::default()));
    }

    #[test]
    fn created_at_is_rfc3339() {
        let mut c = bare_cluster();
        c.created_at = "2024-03-01T10:00:00Z".parse().ok();
        let projector: &dyn Projector<Cluster> = &project_cluster;
        assert_eq!(projector.project(&c)["created_at"], Value::from("2024-03-01T10:00:00Z"));
    }
}
