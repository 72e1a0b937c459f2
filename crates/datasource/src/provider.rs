//! Registry of built data sources, addressed by name.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::{DataSource, Host, ReadConfig, ReadContext, ReadError, ReadReport};

pub struct Provider {
    sources: FxHashMap<String, Arc<dyn DataSource>>,
    config: ReadConfig,
}

impl Provider {
    pub fn new(config: ReadConfig) -> Self { Self { sources: FxHashMap::default(), config } }

    pub fn config(&self) -> &ReadConfig { &self.config }

    /// Register a data source; a later registration under the same name wins.
    pub fn register(&mut self, ds: impl DataSource + 'static) -> &mut Self {
        let name = ds.name().to_string();
        if self.sources.insert(name.clone(), Arc::new(ds)).is_some() {
            warn!(data_source = %name, "data source registered twice; keeping the latest");
        } else {
            info!(data_source = %name, "data source registered");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DataSource>> { self.sources.get(name).cloned() }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.sources.keys().map(|k| k.as_str()).collect();
        v.sort_unstable();
        v
    }

    /// Run one read with a fresh deadline from the provider's config.
    pub async fn read(&self, name: &str, host: &mut dyn Host) -> Result<ReadReport, ReadError> {
        let Some(ds) = self.get(name) else {
            let err = ReadError::UnknownDataSource(name.to_string());
            host.diagnose(err.to_diagnostic());
            return Err(err);
        };
        let ctx = ReadContext::from_config(&self.config);
        ds.read(&ctx, host).await
    }
}

impl Default for Provider {
    fn default() -> Self { Self::new(ReadConfig::default()) }
}
