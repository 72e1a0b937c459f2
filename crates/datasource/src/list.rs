//! Generic list data-source factory.

use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use cumulus_core::{AttrMap, AttrType, Identified, Projector, Schema, Value};
use cumulus_schema::{compose_list_schema, validate_map, ListSchema, SchemaError, ID_ATTRIBUTE};
use tracing::{debug, warn};

use crate::{list_id, DataSource, Host, ReadContext, ReadError, ReadReport};

/// What a fetcher is asked for: the zone plus a snapshot of the user's input.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub zone: String,
    pub input: AttrMap,
}

/// Lists every remote record of one kind in a zone. Implementations must
/// honour the context deadline; the read also enforces it.
#[async_trait::async_trait]
pub trait Fetcher<T>: Send + Sync {
    async fn list(&self, ctx: &ReadContext, query: &ListQuery) -> anyhow::Result<Vec<T>>;
}

pub type ListIdFn<T> = Arc<dyn Fn(&[T]) -> String + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("{data_source}: missing {field}")]
    Missing { data_source: String, field: &'static str },
    #[error("{data_source}: {source}")]
    Schema {
        data_source: String,
        #[source]
        source: SchemaError,
    },
}

/// A list data source for records of type `T`. Immutable once built.
pub struct ListDataSource<T> {
    name: String,
    id_attribute: String,
    schema: ListSchema,
    fetcher: Arc<dyn Fetcher<T>>,
    projector: Arc<dyn Projector<T>>,
    list_id: ListIdFn<T>,
}

pub struct ListDataSourceBuilder<T> {
    name: String,
    id_attribute: String,
    list_attribute: Option<String>,
    zone_attribute: Option<String>,
    fetcher: Option<Arc<dyn Fetcher<T>>>,
    projector: Option<Arc<dyn Projector<T>>>,
    list_id: Option<ListIdFn<T>>,
    element_schema: Option<fn() -> Schema>,
}

impl<T: Send + 'static> ListDataSource<T> {
    pub fn builder(name: impl Into<String>) -> ListDataSourceBuilder<T> {
        ListDataSourceBuilder {
            name: name.into(),
            id_attribute: ID_ATTRIBUTE.to_string(),
            list_attribute: None,
            zone_attribute: None,
            fetcher: None,
            projector: None,
            list_id: None,
            element_schema: None,
        }
    }
}

impl<T: Send + 'static> ListDataSourceBuilder<T> {
    /// Attribute the matched elements are exposed under.
    pub fn list_attribute(mut self, name: impl Into<String>) -> Self {
        self.list_attribute = Some(name.into());
        self
    }

    /// Attribute carrying the zone; forwarded to the fetcher and echoed into
    /// every element.
    pub fn zone_attribute(mut self, name: impl Into<String>) -> Self {
        self.zone_attribute = Some(name.into());
        self
    }

    /// Element attribute every projected map must carry. Defaults to `id`.
    pub fn id_attribute(mut self, name: impl Into<String>) -> Self {
        self.id_attribute = name.into();
        self
    }

    pub fn fetcher(mut self, fetcher: impl Fetcher<T> + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    pub fn projector(mut self, projector: impl Projector<T> + 'static) -> Self {
        self.projector = Some(Arc::new(projector));
        self
    }

    pub fn list_id(mut self, f: impl Fn(&[T]) -> String + Send + Sync + 'static) -> Self {
        self.list_id = Some(Arc::new(f));
        self
    }

    /// Resolved once, in [`build`](Self::build).
    pub fn element_schema(mut self, f: fn() -> Schema) -> Self {
        self.element_schema = Some(f);
        self
    }

    pub fn build(self) -> Result<ListDataSource<T>, BuildError> {
        let name = self.name;
        let missing = |field: &'static str| BuildError::Missing { data_source: name.clone(), field };
        let list_attribute = self.list_attribute.ok_or_else(|| missing("list attribute"))?;
        let zone_attribute = self.zone_attribute.ok_or_else(|| missing("zone attribute"))?;
        let fetcher = self.fetcher.ok_or_else(|| missing("fetcher"))?;
        let projector = self.projector.ok_or_else(|| missing("projector"))?;
        let list_id = self.list_id.ok_or_else(|| missing("list id function"))?;
        let element_schema = self.element_schema.ok_or_else(|| missing("element schema"))?;

        let schema = compose_list_schema(element_schema(), &list_attribute, &zone_attribute)
            .map_err(|source| BuildError::Schema { data_source: name.clone(), source })?;
        debug!(
            data_source = %name,
            filters = schema.filters.len(),
            elements = schema.element.len(),
            "list data source built"
        );
        Ok(ListDataSource { name, id_attribute: self.id_attribute, schema, fetcher, projector, list_id })
    }
}

impl<T: Identified + Send + 'static> ListDataSourceBuilder<T> {
    /// Use the sorted-id MD5 digest ([`list_id`]).
    pub fn default_list_id(self) -> Self { self.list_id(|items: &[T]| list_id(items)) }
}

impl<T: Send + 'static> ListDataSource<T> {
    pub fn list_schema(&self) -> &ListSchema { &self.schema }

    fn zone(&self, host: &dyn Host) -> Result<String, ReadError> {
        let attr = &self.schema.zone_attribute;
        host.get(attr)
            .and_then(|v| v.coerce(&AttrType::String).ok())
            .and_then(|v| match v {
                Value::String(s) if !s.is_empty() => Some(s),
                _ => None,
            })
            .ok_or_else(|| ReadError::MissingZone { data_source: self.name.clone(), attribute: attr.clone() })
    }

    /// The user's zone and filter values, copied once per read.
    fn snapshot(&self, host: &dyn Host, zone: &str) -> AttrMap {
        let mut input: AttrMap = self
            .schema
            .filters
            .names()
            .filter_map(|n| host.get(n).map(|v| (n.to_string(), v)))
            .collect();
        input.insert(self.schema.zone_attribute.clone(), Value::String(zone.to_string()));
        input
    }

    fn check_projection(&self, index: usize, map: &AttrMap) -> Result<(), ReadError> {
        let fail = |detail: String| ReadError::ProjectionFailed { data_source: self.name.clone(), index, detail };
        if !map.contains_key(&self.id_attribute) {
            return Err(fail(format!("missing identifier attribute {:?}", self.id_attribute)));
        }
        let issues = validate_map(map, &self.schema.element);
        if let Some(first) = issues.first() {
            return Err(fail(format!("{}: {}", first.path, first.error)));
        }
        Ok(())
    }

    async fn read_inner(&self, ctx: &ReadContext, host: &mut dyn Host) -> Result<ReadReport, ReadError> {
        let zone = self.zone(host)?;
        let input = self.snapshot(host, &zone);
        let query = ListQuery { zone: zone.clone(), input };

        let fetch_started = Instant::now();
        let fetched = tokio::time::timeout_at(ctx.deadline(), self.fetcher.list(ctx, &query)).await;
        metrics::histogram!("datasource_fetch_ms", fetch_started.elapsed().as_secs_f64() * 1_000.0, "data_source" => self.name.clone());
        let items = match fetched {
            Ok(Ok(items)) => items,
            Ok(Err(source)) => return Err(ReadError::FetchFailed { data_source: self.name.clone(), zone, source }),
            Err(_) => {
                let source = anyhow!("deadline exceeded after {:?}", fetch_started.elapsed());
                return Err(ReadError::FetchFailed { data_source: self.name.clone(), zone, source });
            }
        };
        metrics::gauge!("datasource_records", items.len() as f64, "data_source" => self.name.clone());

        let preds = cumulus_filter::compile(&self.schema.filters, &query.input)
            .map_err(|source| ReadError::FilterCompileFailed { data_source: self.name.clone(), source })?;

        let mut maps = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let mut map = self.projector.project(item);
            map.insert(self.schema.zone_attribute.clone(), Value::String(zone.clone()));
            self.check_projection(index, &map)?;
            maps.push(map);
        }
        let (matched, explain) = cumulus_filter::apply(maps, &preds);

        // Identity covers the whole listing, not the filtered view.
        let id = (self.list_id)(&items);
        debug!(
            data_source = %self.name,
            zone = %zone,
            fetched = items.len(),
            matched = matched.len(),
            id = %id,
            "list read"
        );

        let report = ReadReport { id: id.clone(), fetched: items.len(), matched: matched.len(), explain };
        let list = Value::List(matched.into_iter().map(Value::Object).collect());
        host.set(&self.schema.list_attribute, list).map_err(ReadError::SetAttributeFailed)?;
        host.set_id(&id);
        Ok(report)
    }
}

#[async_trait::async_trait]
impl<T: Send + 'static> DataSource for ListDataSource<T> {
    fn name(&self) -> &str { &self.name }

    fn schema(&self) -> &Schema { &self.schema.schema }

    fn element_schema(&self) -> &Schema { &self.schema.element }

    async fn read(&self, ctx: &ReadContext, host: &mut dyn Host) -> Result<ReadReport, ReadError> {
        let result = self.read_inner(ctx, host).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!("datasource_reads_total", 1u64, "data_source" => self.name.clone(), "outcome" => outcome);
        if let Err(e) = &result {
            warn!(data_source = %self.name, kind = e.kind(), error = %e, "read failed");
            host.diagnose(e.to_diagnostic());
        }
        result
    }
}
