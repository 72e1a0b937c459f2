//! Cumulus list data sources.
//!
//! A list data source fetches every remote object of one kind in a zone,
//! projects each into an attribute map, narrows the result with the user's
//! filter attributes and names the listing by a digest of the fetched ids.
//! [`ListDataSource`] is the generic factory; [`Provider`] registers built
//! data sources by name behind the object-safe [`DataSource`] trait.

#![forbid(unsafe_code)]

use cumulus_core::{Identified, Schema};
use cumulus_filter::{FilterError, FilterExplain};
use serde::Serialize;

pub mod config;
pub mod host;
pub mod list;
pub mod provider;

pub use config::{ReadConfig, ReadContext};
pub use host::{Host, HostError, MemoryHost, PersistedState};
pub use list::{BuildError, Fetcher, ListDataSource, ListDataSourceBuilder, ListQuery};
pub use provider::Provider;

/// Errors that abort a read. Every one is fatal: nothing is written.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("{data_source}: attribute {attribute:?} is required")]
    MissingZone { data_source: String, attribute: String },
    #[error("{data_source}: listing in zone {zone:?} failed: {source:#}")]
    FetchFailed {
        data_source: String,
        zone: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{data_source}: {source}")]
    FilterCompileFailed {
        data_source: String,
        #[source]
        source: FilterError,
    },
    #[error("{data_source}: element {index} does not match the element schema: {detail}")]
    ProjectionFailed { data_source: String, index: usize, detail: String },
    #[error("{0}")]
    SetAttributeFailed(#[source] HostError),
    #[error("unknown data source {0:?}")]
    UnknownDataSource(String),
}

impl ReadError {
    pub fn kind(&self) -> &'static str {
        match self {
            ReadError::MissingZone { .. } => "missing_zone",
            ReadError::FetchFailed { .. } => "fetch_failed",
            ReadError::FilterCompileFailed { .. } => "filter_compile_failed",
            ReadError::ProjectionFailed { .. } => "projection_failed",
            ReadError::SetAttributeFailed(_) => "set_attribute_failed",
            ReadError::UnknownDataSource(_) => "unknown_data_source",
        }
    }

    /// Host-facing rendering of the error.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ReadError::MissingZone { attribute, .. } => Diagnostic::error(
                format!("Missing required attribute {:?}", attribute),
                self.to_string(),
            )
            .at(attribute.clone()),
            ReadError::FetchFailed { zone, source, .. } => {
                Diagnostic::error(format!("Error listing in zone {}", zone), format!("{:#}", source))
            }
            ReadError::FilterCompileFailed { source, .. } => {
                let d = Diagnostic::error("Invalid filter", source.to_string());
                match source.attribute() {
                    Some(a) => d.at(a.to_string()),
                    None => d,
                }
            }
            ReadError::ProjectionFailed { .. } => Diagnostic::error("Error flattening element", self.to_string()),
            ReadError::SetAttributeFailed(e) => {
                let d = Diagnostic::error(e.to_string(), e.to_string());
                match e {
                    HostError::Undeclared(a) | HostError::Invalid { attribute: a, .. } => d.at(a.clone()),
                }
            }
            ReadError::UnknownDataSource(_) => Diagnostic::error("Unknown data source", self.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { severity: Severity::Error, summary: summary.into(), detail: detail.into(), attribute: None }
    }

    pub fn at(mut self, attribute: String) -> Self {
        self.attribute = Some(attribute);
        self
    }
}

/// Outcome of a successful read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadReport {
    pub id: String,
    pub fetched: usize,
    pub matched: usize,
    pub explain: FilterExplain,
}

/// Object-safe face of a built list data source.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;
    /// Top-level schema: id, zone, list attribute and filter attributes.
    fn schema(&self) -> &Schema;
    fn element_schema(&self) -> &Schema;
    async fn read(&self, ctx: &ReadContext, host: &mut dyn Host) -> Result<ReadReport, ReadError>;
}

/// Default list identifier: sort the ids, concatenate them without a
/// separator and hex-encode the MD5 digest. Not a security boundary.
pub fn list_id<T: Identified>(items: &[T]) -> String {
    digest_ids(items.iter().map(|i| i.id()))
}

/// [`list_id`] over bare ids.
pub fn digest_ids<'a, I>(ids: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut ids: Vec<&str> = ids.into_iter().collect();
    ids.sort_unstable();
    format!("{:x}", md5::compute(ids.concat()))
}
