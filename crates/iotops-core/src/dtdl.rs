//! DTDL model records and dependency resolution
//!
//! A model depends on another model when it names it through `extends` or
//! through the `schema` of a `Component` content entry. Either position may
//! hold a DTMI string, an embedded model object, or a list of those.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A model as returned by the Digital Twins model listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelData {
    /// Model DTMI
    pub id: String,
    /// Language map or plain string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(default)]
    pub decommissioned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_time: Option<DateTime<Utc>>,
    /// Full DTDL definition, present when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelData {
    /// Dependencies of this model's definition (empty without a definition)
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.model
            .as_ref()
            .map(model_dependencies)
            .unwrap_or_default()
    }
}

/// Collect every DTMI a model definition references
///
/// Embedded models are walked with the same rules, so a DTMI referenced by a
/// model nested inside `extends` or inside a component schema is included.
pub fn model_dependencies(model: &Value) -> BTreeSet<String> {
    let mut dependencies = BTreeSet::new();
    collect_dependencies(model, &mut dependencies);
    dependencies
}

fn collect_dependencies(model: &Value, dependencies: &mut BTreeSet<String>) {
    if let Some(contents) = model.get("contents").and_then(Value::as_array) {
        for item in contents.iter().filter(|item| is_component(item)) {
            if let Some(schema) = item.get("schema") {
                collect_reference(schema, dependencies);
            }
        }
    }

    if let Some(extends) = model.get("extends") {
        collect_reference(extends, dependencies);
    }
}

fn collect_reference(reference: &Value, dependencies: &mut BTreeSet<String>) {
    match reference {
        Value::String(dtmi) => {
            dependencies.insert(dtmi.clone());
        }
        Value::Object(_) => collect_dependencies(reference, dependencies),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(dtmi) => {
                        dependencies.insert(dtmi.clone());
                    }
                    Value::Object(_) => collect_dependencies(item, dependencies),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn is_component(item: &Value) -> bool {
    match item.get("@type") {
        Some(Value::String(kind)) => kind == "Component",
        Some(Value::Array(kinds)) => kinds.iter().any(|k| k.as_str() == Some("Component")),
        _ => false,
    }
}
