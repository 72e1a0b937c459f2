//! Host seam: how a read gets user input and hands results back.

use std::sync::Arc;

use cumulus_core::{AttrMap, Schema, Value};
use cumulus_schema::{validate_attribute, ID_ATTRIBUTE};
use serde::Serialize;

use crate::Diagnostic;

/// What a read needs from the plugin runtime.
pub trait Host: Send {
    /// User-supplied value of a top-level attribute.
    fn get(&self, name: &str) -> Option<Value>;
    /// Write a computed attribute; the host checks it against the schema.
    fn set(&mut self, name: &str, value: Value) -> Result<(), HostError>;
    fn set_id(&mut self, id: &str);
    fn diagnose(&mut self, diag: Diagnostic);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("attribute {0:?} is not declared in the schema")]
    Undeclared(String),
    #[error("invalid value for attribute {attribute:?}: {detail}")]
    Invalid { attribute: String, detail: String },
}

/// In-memory host: config in, state and diagnostics out.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    schema: Arc<Schema>,
    config: AttrMap,
    written: AttrMap,
    id: Option<String>,
    diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistedState {
    pub id: Option<String>,
    #[serde(flatten)]
    pub attributes: AttrMap,
}

impl MemoryHost {
    pub fn new(schema: impl Into<Arc<Schema>>, config: AttrMap) -> Self {
        Self { schema: schema.into(), config, written: AttrMap::new(), id: None, diagnostics: Vec::new() }
    }

    /// Config from a JSON object; `null` members count as unset.
    pub fn from_json(schema: impl Into<Arc<Schema>>, config: &serde_json::Value) -> Self {
        let config = match Value::from_json(config) {
            Some(Value::Map(m)) => m,
            _ => AttrMap::new(),
        };
        Self::new(schema, config)
    }

    pub fn id(&self) -> Option<&str> { self.id.as_deref() }
    pub fn diagnostics(&self) -> &[Diagnostic] { &self.diagnostics }
    pub fn written(&self) -> &AttrMap { &self.written }
    pub fn get_written(&self, name: &str) -> Option<&Value> { self.written.get(name) }

    /// State as the runtime would persist it: the id, user-settable
    /// attributes that were supplied, and written attributes.
    pub fn state(&self) -> PersistedState {
        let mut attributes: AttrMap = self
            .config
            .iter()
            .filter(|(k, _)| {
                k.as_str() != ID_ATTRIBUTE
                    && self.schema.get(k).map(|a| a.mode.is_user_settable()).unwrap_or(false)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, v) in self.written.iter() {
            attributes.insert(k.clone(), v.clone());
        }
        PersistedState { id: self.id.clone(), attributes }
    }
}

impl Host for MemoryHost {
    fn get(&self, name: &str) -> Option<Value> { self.config.get(name).cloned() }

    fn set(&mut self, name: &str, value: Value) -> Result<(), HostError> {
        if !self.schema.contains(name) {
            return Err(HostError::Undeclared(name.to_string()));
        }
        let issues = validate_attribute(&self.schema, name, &value);
        if !issues.is_empty() {
            let detail = issues.iter().map(|i| format!("{}: {}", i.path, i.error)).collect::<Vec<_>>().join("; ");
            return Err(HostError::Invalid { attribute: name.to_string(), detail });
        }
        self.written.insert(name.to_string(), value);
        Ok(())
    }

    fn set_id(&mut self, id: &str) { self.id = Some(id.to_string()); }

    fn diagnose(&mut self, diag: Diagnostic) { self.diagnostics.push(diag); }
}
