//! Cumulus cloud entities: control-plane client seam and the cluster and
//! node-pool list data sources built on it.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use cumulus_datasource::{BuildError, Fetcher, ListDataSource, ListQuery, Provider, ReadConfig, ReadContext};
use serde::Deserialize;
use tracing::{debug, info};

pub mod columns;
pub mod model;

pub use model::{Cluster, Pool};

pub const CLUSTERS: &str = "cumulus_kubernetes_clusters";
pub const NODE_POOLS: &str = "cumulus_kubernetes_node_pools";
pub const ZONE_ATTRIBUTE: &str = "zone";

#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    #[error("unknown zone {0:?}")]
    UnknownZone(String),
    #[error("reading fixtures from {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing fixtures: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The slice of the control-plane API the data sources need.
#[async_trait::async_trait]
pub trait CloudClient: Send + Sync {
    /// Every cluster in `zone`, pools included.
    async fn list_clusters(&self, zone: &str) -> Result<Vec<Cluster>, CloudError>;
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ZoneFixture {
    #[serde(default)]
    clusters: Vec<Cluster>,
}

/// Client answering from a JSON document of the form
/// `{ "<zone>": { "clusters": [...] } }`.
#[derive(Debug, Clone, Default)]
pub struct FixtureClient {
    zones: BTreeMap<String, ZoneFixture>,
}

impl FixtureClient {
    pub fn from_json(doc: serde_json::Value) -> Result<Self, CloudError> {
        Ok(Self { zones: serde_json::from_value(doc)? })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CloudError> {
        Ok(Self { zones: serde_json::from_slice(bytes)? })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CloudError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| CloudError::Io { path: path.to_path_buf(), source })?;
        let client = Self::from_slice(&bytes)?;
        debug!(path = %path.display(), zones = client.zones.len(), "fixtures loaded");
        Ok(client)
    }

    pub fn zones(&self) -> impl Iterator<Item = &str> { self.zones.keys().map(|z| z.as_str()) }
}

#[async_trait::async_trait]
impl CloudClient for FixtureClient {
    async fn list_clusters(&self, zone: &str) -> Result<Vec<Cluster>, CloudError> {
        self.zones
            .get(zone)
            .map(|z| z.clusters.clone())
            .ok_or_else(|| CloudError::UnknownZone(zone.to_string()))
    }
}

/// Lists the clusters of the requested zone.
pub struct ClusterLister {
    client: Arc<dyn CloudClient>,
}

impl ClusterLister {
    pub fn new(client: Arc<dyn CloudClient>) -> Self { Self { client } }
}

#[async_trait::async_trait]
impl Fetcher<Cluster> for ClusterLister {
    async fn list(&self, _ctx: &ReadContext, query: &ListQuery) -> anyhow::Result<Vec<Cluster>> {
        let clusters = self.client.list_clusters(&query.zone).await.context("listing clusters")?;
        Ok(clusters)
    }
}

/// Lists node pools by walking the zone's clusters; pools keep cluster order.
pub struct PoolLister {
    client: Arc<dyn CloudClient>,
}

impl PoolLister {
    pub fn new(client: Arc<dyn CloudClient>) -> Self { Self { client } }
}

#[async_trait::async_trait]
impl Fetcher<Pool> for PoolLister {
    async fn list(&self, _ctx: &ReadContext, query: &ListQuery) -> anyhow::Result<Vec<Pool>> {
        let clusters = self.client.list_clusters(&query.zone).await.context("listing clusters for node pools")?;
        Ok(clusters.iter().flat_map(|c| c.owned_pools()).collect())
    }
}

pub fn clusters_data_source(client: Arc<dyn CloudClient>) -> Result<ListDataSource<Cluster>, BuildError> {
    ListDataSource::<Cluster>::builder(CLUSTERS)
        .list_attribute("clusters")
        .zone_attribute(ZONE_ATTRIBUTE)
        .fetcher(ClusterLister::new(client))
        .projector(columns::project_cluster)
        .default_list_id()
        .element_schema(columns::cluster_schema)
        .build()
}

pub fn node_pools_data_source(client: Arc<dyn CloudClient>) -> Result<ListDataSource<Pool>, BuildError> {
    ListDataSource::<Pool>::builder(NODE_POOLS)
        .list_attribute("node_pools")
        .zone_attribute(ZONE_ATTRIBUTE)
        .fetcher(PoolLister::new(client))
        .projector(columns::project_pool)
        .default_list_id()
        .element_schema(columns::pool_schema)
        .build()
}

/// Provider with every cloud data source registered.
pub fn provider(client: Arc<dyn CloudClient>, config: ReadConfig) -> Result<Provider, BuildError> {
    let mut p = Provider::new(config);
    p.register(clusters_data_source(client.clone())?);
    p.register(node_pools_data_source(client)?);
    info!(data_sources = ?p.names(), timeout = ?p.config().timeout, "provider ready");
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_client_rejects_unknown_zones() {
        let client = FixtureClient::from_json(serde_json::json!({"r1": {"clusters": []}})).unwrap();
        assert!(client.list_clusters("r1").await.unwrap().is_empty());
        let err = client.list_clusters("r9").await.unwrap_err();
        assert!(matches!(err, CloudError::UnknownZone(ref z) if z == "r9"));
    }

    #[test]
    fn fixture_documents_must_be_zone_objects() {
        assert!(matches!(FixtureClient::from_slice(b"[1, 2]"), Err(CloudError::Parse(_))));
        let empty_zone = FixtureClient::from_json(serde_json::json!({"r1": {}})).unwrap();
        assert_eq!(empty_zone.zones().collect::<Vec<_>>(), vec!["r1"]);
    }

    #[test]
    fn missing_fixture_file_names_the_path() {
        let err = FixtureClient::from_path("/nonexistent/cumulus.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cumulus.json"));
    }
}
