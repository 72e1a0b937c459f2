use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use cumulus_core::{attr_map, AttrMap, AttrType, Attribute, Elem, Identified, Schema, Value};
use cumulus_datasource::{
    list_id, BuildError, DataSource, Fetcher, Host, HostError, ListDataSource, ListQuery, MemoryHost, Provider,
    ReadContext, ReadError,
};

#[derive(Debug, Clone)]
struct Rec {
    id: &'static str,
    name: Option<&'static str>,
    tags: Vec<(&'static str, &'static str)>,
}

impl Identified for Rec {
    fn id(&self) -> &str { self.id }
}

fn rec(id: &'static str, name: &'static str) -> Rec { Rec { id, name: Some(name), tags: Vec::new() } }

fn element() -> Schema {
    Schema::new()
        .with("id", Attribute::computed(AttrType::String))
        .with("name", Attribute::computed(AttrType::String))
        .with("tags", Attribute::computed(AttrType::Map(Elem::String)))
}

fn project(r: &Rec) -> AttrMap {
    attr_map! {
        "id" => r.id,
        "name" => r.name.unwrap_or_default(),
        "tags" => Value::string_map(r.tags.iter().copied()),
    }
}

/// Hands back a fixed listing, or fails.
struct Fixed(Result<Vec<Rec>, &'static str>);

#[async_trait::async_trait]
impl Fetcher<Rec> for Fixed {
    async fn list(&self, _ctx: &ReadContext, query: &ListQuery) -> anyhow::Result<Vec<Rec>> {
        assert_eq!(query.input.get("zone"), Some(&Value::String(query.zone.clone())));
        match &self.0 {
            Ok(items) => Ok(items.clone()),
            Err(msg) => Err(anyhow!(*msg)),
        }
    }
}

struct Stalled;

#[async_trait::async_trait]
impl Fetcher<Rec> for Stalled {
    async fn list(&self, _ctx: &ReadContext, _query: &ListQuery) -> anyhow::Result<Vec<Rec>> {
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
}

fn data_source(fetcher: impl Fetcher<Rec> + 'static) -> ListDataSource<Rec> {
    ListDataSource::<Rec>::builder("test_things")
        .list_attribute("things")
        .zone_attribute("zone")
        .fetcher(fetcher)
        .projector(project)
        .default_list_id()
        .element_schema(element)
        .build()
        .unwrap()
}

fn host_for(ds: &ListDataSource<Rec>, config: AttrMap) -> MemoryHost { MemoryHost::new(ds.schema().clone(), config) }

fn ctx() -> ReadContext { ReadContext::with_timeout(Duration::from_secs(5)) }

fn listed(host: &MemoryHost) -> Vec<AttrMap> {
    match host.get_written("things") {
        Some(Value::List(items)) => items
            .iter()
            .map(|v| match v {
                Value::Object(m) => m.clone(),
                other => panic!("unexpected element {:?}", other),
            })
            .collect(),
        other => panic!("list not written: {:?}", other),
    }
}

const ID_XY: &str = "3e44107170a520582ade522fa73c1d15";

#[tokio::test]
async fn unfiltered_read_lists_everything_with_zone() {
    let ds = data_source(Fixed(Ok(vec![rec("x", "a"), rec("y", "b")])));
    let mut host = host_for(&ds, attr_map! { "zone" => "r1" });
    let report = ds.read(&ctx(), &mut host).await.unwrap();

    let empty = Value::string_map(Vec::<(String, String)>::new());
    assert_eq!(
        listed(&host),
        vec![
            attr_map! { "id" => "x", "name" => "a", "zone" => "r1", "tags" => empty.clone() },
            attr_map! { "id" => "y", "name" => "b", "zone" => "r1", "tags" => empty },
        ]
    );
    assert_eq!(host.id(), Some(ID_XY));
    assert_eq!(report.fetched, 2);
    assert_eq!(report.matched, 2);
    assert!(host.diagnostics().is_empty());
}

#[tokio::test]
async fn name_filter_narrows_the_list_but_keeps_the_id() {
    let ds = data_source(Fixed(Ok(vec![rec("x", "a"), rec("y", "b")])));
    let mut host = host_for(&ds, attr_map! { "zone" => "r1", "name" => "b" });
    ds.read(&ctx(), &mut host).await.unwrap();

    let items = listed(&host);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], Value::from("y"));
    assert_eq!(items[0]["zone"], Value::from("r1"));
    assert_eq!(host.id(), Some(ID_XY));

    let st = host.state();
    assert_eq!(st.attributes.get("name"), Some(&Value::from("b")));
    assert_eq!(st.attributes.get("zone"), Some(&Value::from("r1")));
    assert_eq!(st.attributes.len(), 3);
}

#[tokio::test]
async fn empty_fetch_writes_an_empty_list() {
    let ds = data_source(Fixed(Ok(Vec::new())));
    let mut host = host_for(&ds, attr_map! { "zone" => "r1" });
    ds.read(&ctx(), &mut host).await.unwrap();
    assert!(listed(&host).is_empty());
    assert_eq!(host.id(), Some("d41d8cd98f00b204e9800998ecf8427e"));
}

#[tokio::test]
async fn permuted_fetch_yields_the_same_id_and_keeps_fetch_order() {
    let ds = data_source(Fixed(Ok(vec![rec("y", "b"), rec("x", "a")])));
    let mut host = host_for(&ds, attr_map! { "zone" => "r1" });
    ds.read(&ctx(), &mut host).await.unwrap();
    assert_eq!(host.id(), Some(ID_XY));
    let ids: Vec<Value> = listed(&host).into_iter().map(|m| m["id"].clone()).collect();
    assert_eq!(ids, vec![Value::from("y"), Value::from("x")]);
}

#[tokio::test]
async fn tags_filter_matches_subsets() {
    let records = vec![
        Rec { id: "x", name: None, tags: vec![("env", "prod"), ("tier", "web")] },
        Rec { id: "y", name: None, tags: vec![("env", "dev")] },
    ];
    let ds = data_source(Fixed(Ok(records.clone())));
    let mut host = host_for(&ds, attr_map! { "zone" => "r1", "tags" => Value::string_map([("env", "prod")]) });
    ds.read(&ctx(), &mut host).await.unwrap();
    let items = listed(&host);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], Value::from("x"));
    // absent name projects to the zero value
    assert_eq!(items[0]["name"], Value::from(""));
    assert_eq!(host.id(), Some(list_id(&records).as_str()));
}

#[tokio::test]
async fn fetch_error_writes_nothing_and_reports_once() {
    let ds = data_source(Fixed(Err("control plane unavailable")));
    let mut host = host_for(&ds, attr_map! { "zone" => "r1" });
    let err = ds.read(&ctx(), &mut host).await.unwrap_err();

    assert!(matches!(err, ReadError::FetchFailed { ref zone, .. } if zone == "r1"));
    assert!(host.written().is_empty());
    assert_eq!(host.id(), None);
    assert_eq!(host.diagnostics().len(), 1);
    let d = &host.diagnostics()[0];
    assert!(d.summary.contains("r1"));
    assert!(d.detail.contains("control plane unavailable"));
}

#[tokio::test]
async fn deadline_aborts_a_stalled_fetch() {
    let ds = data_source(Stalled);
    let mut host = host_for(&ds, attr_map! { "zone" => "r1" });
    let ctx = ReadContext::with_timeout(Duration::from_millis(20));
    let err = ds.read(&ctx, &mut host).await.unwrap_err();
    assert_eq!(err.kind(), "fetch_failed");
    assert!(err.to_string().contains("deadline exceeded"));
    assert_eq!(host.id(), None);
}

#[tokio::test]
async fn missing_zone_is_fatal() {
    let ds = data_source(Fixed(Ok(vec![rec("x", "a")])));
    let mut host = host_for(&ds, AttrMap::new());
    let err = ds.read(&ctx(), &mut host).await.unwrap_err();
    assert_eq!(err.kind(), "missing_zone");
    assert_eq!(host.diagnostics()[0].attribute.as_deref(), Some("zone"));
    assert!(host.written().is_empty());
}

#[tokio::test]
async fn ill_typed_filter_names_the_attribute() {
    let ds = data_source(Fixed(Ok(vec![rec("x", "a")])));
    let mut host = host_for(&ds, attr_map! { "zone" => "r1", "tags" => "env=prod" });
    let err = ds.read(&ctx(), &mut host).await.unwrap_err();
    assert_eq!(err.kind(), "filter_compile_failed");
    assert_eq!(host.diagnostics().len(), 1);
    assert_eq!(host.diagnostics()[0].attribute.as_deref(), Some("tags"));
    assert!(host.written().is_empty());
    assert_eq!(host.id(), None);
}

#[tokio::test]
async fn projector_emitting_unknown_keys_fails_the_read() {
    let ds = ListDataSource::<Rec>::builder("test_things")
        .list_attribute("things")
        .zone_attribute("zone")
        .fetcher(Fixed(Ok(vec![rec("x", "a")])))
        .projector(|r: &Rec| attr_map! { "id" => r.id, "colour" => "red" })
        .default_list_id()
        .element_schema(element)
        .build()
        .unwrap();
    let mut host = host_for(&ds, attr_map! { "zone" => "r1" });
    let err = ds.read(&ctx(), &mut host).await.unwrap_err();
    assert_eq!(err.kind(), "projection_failed");
    assert_eq!(host.id(), None);
}

/// Host that refuses every write.
struct Refusing {
    zone: &'static str,
    id: Option<String>,
    diags: usize,
}

impl Host for Refusing {
    fn get(&self, name: &str) -> Option<Value> { (name == "zone").then(|| Value::from(self.zone)) }
    fn set(&mut self, name: &str, _value: Value) -> Result<(), HostError> {
        Err(HostError::Invalid { attribute: name.to_string(), detail: "read-only".into() })
    }
    fn set_id(&mut self, id: &str) { self.id = Some(id.to_string()); }
    fn diagnose(&mut self, _diag: cumulus_datasource::Diagnostic) { self.diags += 1; }
}

#[tokio::test]
async fn rejected_write_leaves_no_id() {
    let ds = data_source(Fixed(Ok(vec![rec("x", "a")])));
    let mut host = Refusing { zone: "r1", id: None, diags: 0 };
    let err = ds.read(&ctx(), &mut host).await.unwrap_err();
    assert_eq!(err.kind(), "set_attribute_failed");
    assert_eq!(err.to_string(), "invalid value for attribute \"things\": read-only");
    assert_eq!(host.id, None);
    assert_eq!(host.diags, 1);
}

#[test]
fn builder_reports_missing_inputs() {
    let err = ListDataSource::<Rec>::builder("test_things")
        .zone_attribute("zone")
        .fetcher(Fixed(Ok(Vec::new())))
        .projector(project)
        .default_list_id()
        .element_schema(element)
        .build()
        .err()
        .unwrap();
    assert_eq!(err, BuildError::Missing { data_source: "test_things".into(), field: "list attribute" });
}

#[test]
fn schema_has_list_zone_id_and_filters() {
    let ds = data_source(Fixed(Ok(Vec::new())));
    let names: Vec<&str> = ds.schema().names().collect();
    assert_eq!(names, vec!["id", "name", "tags", "things", "zone"]);
    assert!(ds.element_schema().contains("zone"));
}

#[tokio::test]
async fn provider_dispatches_by_name() {
    let mut provider = Provider::default();
    provider.register(data_source(Fixed(Ok(vec![rec("x", "a"), rec("y", "b")]))));
    assert_eq!(provider.names(), vec!["test_things"]);

    let ds: Arc<dyn DataSource> = provider.get("test_things").unwrap();
    let mut host = MemoryHost::new(ds.schema().clone(), attr_map! { "zone" => "r1" });
    let report = provider.read("test_things", &mut host).await.unwrap();
    assert_eq!(report.id, ID_XY);

    let err = provider.read("nope", &mut host).await.unwrap_err();
    assert_eq!(err.kind(), "unknown_data_source");
    assert_eq!(host.diagnostics().len(), 1);
}
