use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use cumulus_cloud::{CloudClient, FixtureClient, ZONE_ATTRIBUTE};
use cumulus_core::{AttrMap, AttrType, Mode, Schema, Value};
use cumulus_datasource::{Diagnostic, MemoryHost, PersistedState, Provider, ReadConfig, ReadReport};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "cumulusctl", version, about = "Cumulus list data sources")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// JSON document standing in for the control plane: { "<zone>": { "clusters": [...] } }
    #[arg(long = "fixtures", env = "CUMULUS_FIXTURES", global = true)]
    fixtures: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered data sources
    List,
    /// Print the composed schema of a data source
    Schema {
        /// Data source name, e.g. "cumulus_kubernetes_clusters"
        data_source: String,
        /// Print the element schema instead
        #[arg(long = "element", action = ArgAction::SetTrue)]
        element: bool,
    },
    /// Read a data source in one or more zones
    Read {
        /// Data source name, e.g. "cumulus_kubernetes_node_pools"
        data_source: String,
        /// Zone to list in; repeat to read several zones concurrently
        #[arg(long = "zone", required = true)]
        zones: Vec<String>,
        /// Filter as name=value; map filters take key:value,key2:value2
        #[arg(short = 'f', long = "filter")]
        filters: Vec<String>,
        /// Print survivor counts after each filter
        #[arg(long = "explain", action = ArgAction::SetTrue)]
        explain: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("CUMULUS_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CUMULUS_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid CUMULUS_METRICS_ADDR; expected host:port");
        }
    }
}

fn build_provider(fixtures: Option<&Path>) -> Result<Provider> {
    let client: Arc<dyn CloudClient> = match fixtures {
        Some(path) => Arc::new(FixtureClient::from_path(path)?),
        None => Arc::new(FixtureClient::default()),
    };
    Ok(cumulus_cloud::provider(client, ReadConfig::from_env())?)
}

/// Turn `--filter` expressions into typed input values. Only optional
/// top-level attributes are filters.
fn filter_input(schema: &Schema, exprs: &[String]) -> Result<AttrMap> {
    let mut input = AttrMap::new();
    for expr in exprs {
        let pred = cumulus_filter::parse_filter(schema, expr).with_context(|| format!("--filter {}", expr))?;
        match schema.get(&pred.attribute) {
            Some(attr) if attr.mode == Mode::Optional => {}
            _ => bail!("{:?} is not a filter attribute", pred.attribute),
        }
        input.insert(pred.attribute, pred.expected);
    }
    Ok(input)
}

fn list_attribute(schema: &Schema) -> Option<&str> {
    schema.iter().find(|(_, a)| matches!(a.ty, AttrType::Nested(_))).map(|(n, _)| n)
}

#[derive(Serialize)]
struct ZoneRead {
    zone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<ReadReport>,
    state: PersistedState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    diagnostics: Vec<Diagnostic>,
}

fn print_human(r: &ZoneRead, list_attr: &str, explain: bool) {
    let Some(report) = &r.report else {
        for d in &r.diagnostics {
            eprintln!("error: {}: {}", d.summary, d.detail);
        }
        return;
    };
    println!("# zone={} fetched={} matched={} id={}", r.zone, report.fetched, report.matched, report.id);
    println!("{:<40} NAME", "ID");
    let elements = r.state.attributes.get(list_attr).and_then(Value::as_list).unwrap_or_default();
    for el in elements.iter().filter_map(Value::as_map) {
        let id = el.get("id").and_then(Value::as_str).unwrap_or("-");
        let name = el.get("name").and_then(Value::as_str).unwrap_or("");
        println!("{:<40} {}", id, name);
    }
    if explain {
        let stages: Vec<String> = report.explain.stages.iter().map(|s| format!("{}={}", s.attribute, s.remaining)).collect();
        eprintln!("explain: total={} {} matched={}", report.explain.total, stages.join(" "), report.explain.matched);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            let provider = build_provider(cli.fixtures.as_deref())?;
            match cli.output {
                Output::Human => {
                    for name in provider.names() {
                        println!("{}", name);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&provider.names())?),
            }
        }
        Commands::Schema { data_source, element } => {
            let provider = build_provider(None)?;
            let ds = provider.get(&data_source).ok_or_else(|| anyhow!("unknown data source {:?}", data_source))?;
            let schema = if element { ds.element_schema() } else { ds.schema() };
            match cli.output {
                Output::Human => {
                    for (name, attr) in schema.iter() {
                        let ty = attr.ty.to_string();
                        let mode = format!("{:?}", attr.mode).to_lowercase();
                        println!("{:<20} {:<12} {:<18} {}", name, ty, mode, attr.description.as_deref().unwrap_or(""));
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(schema)?),
            }
        }
        Commands::Read { data_source, zones, filters, explain } => {
            let fixtures = cli.fixtures.as_deref().ok_or_else(|| anyhow!("read needs --fixtures or CUMULUS_FIXTURES"))?;
            let provider = build_provider(Some(fixtures))?;
            let ds = provider.get(&data_source).ok_or_else(|| anyhow!("unknown data source {:?}", data_source))?;
            let schema = Arc::new(ds.schema().clone());
            let list_attr = list_attribute(&schema).unwrap_or_default().to_string();
            let input = filter_input(&schema, &filters)?;
            info!(data_source = %data_source, zones = ?zones, filters = input.len(), "read invoked");

            let (provider, schema, input, name) = (&provider, &schema, &input, data_source.as_str());
            let reads = zones.iter().map(|zone| async move {
                let mut config = input.clone();
                config.insert(ZONE_ATTRIBUTE.to_string(), Value::String(zone.clone()));
                let mut host = MemoryHost::new(schema.clone(), config);
                let report = provider.read(name, &mut host).await.ok();
                ZoneRead { zone: zone.clone(), report, state: host.state(), diagnostics: host.diagnostics().to_vec() }
            });
            let results = futures::future::join_all(reads).await;

            match cli.output {
                Output::Human => results.iter().for_each(|r| print_human(r, &list_attr, explain)),
                Output::Json => println!("{}", serde_json::to_string_pretty(&results)?),
            }
            let failed = results.iter().filter(|r| r.report.is_none()).count();
            if failed > 0 {
                bail!("{} of {} reads failed", failed, results.len());
            }
        }
    }

    Ok(())
}
