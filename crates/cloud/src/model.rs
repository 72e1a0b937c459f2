//! Typed control-plane records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use cumulus_core::Identified;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub node_count: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub private_network_id: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub instance_ids: Vec<String>,
    #[serde(default)]
    pub pools: Vec<Pool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    /// Empty in nested listings; filled from the parent cluster.
    #[serde(default)]
    pub cluster_id: String,
    pub name: String,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub autoscaling: bool,
    #[serde(default)]
    pub min_size: Option<u32>,
    #[serde(default)]
    pub max_size: Option<u32>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Identified for Cluster {
    fn id(&self) -> &str { &self.id }
}

impl Identified for Pool {
    fn id(&self) -> &str { &self.id }
}

impl Cluster {
    /// Pools with `cluster_id` set to this cluster where the listing left it empty.
    pub fn owned_pools(&self) -> impl Iterator<Item = Pool> + '_ {
        self.pools.iter().cloned().map(move |mut p| {
            if p.cluster_id.is_empty() {
                p.cluster_id = self.id.clone();
            }
            p
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_cluster_deserializes_with_defaults() {
        let c: Cluster = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "name": "alpha",
            "created_at": "2024-03-01T10:00:00Z",
            "pools": [{"id": "p1", "name": "default"}]
        }))
        .unwrap();
        assert_eq!(c.node_count, None);
        assert!(c.tags.is_empty());
        assert_eq!(c.created_at.map(|t| t.timestamp()), Some(1_709_287_200));
        assert_eq!(c.pools[0].cluster_id, "");
        assert_eq!(c.owned_pools().next().map(|p| p.cluster_id), Some("c1".to_string()));
    }

    #[test]
    fn explicit_pool_owner_is_kept() {
        let c: Cluster = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "name": "alpha",
            "pools": [{"id": "p1", "name": "default", "cluster_id": "other"}]
        }))
        .unwrap();
        assert_eq!(c.owned_pools().next().map(|p| p.cluster_id), Some("other".to_string()));
    }
}
