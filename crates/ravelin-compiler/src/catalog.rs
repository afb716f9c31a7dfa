//! The compiled catalog: the declarative configuration artifact for one
//! node, plus its serialized resource view.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use uuid::Uuid;

/// One declared resource in the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub tags: Vec<String>,
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Resource {
    pub fn new(kind: &str, title: &str) -> Self {
        let kind = capitalize(kind);
        let tags = vec![kind.to_lowercase(), title.to_lowercase()];
        Self {
            kind,
            title: title.to_string(),
            tags,
            parameters: BTreeMap::new(),
        }
    }

    /// Reference form used in edges and requires: `File[/etc/motd]`.
    pub fn reference(&self) -> String {
        format!("{}[{}]", self.kind, self.title)
    }
}

/// A containment or dependency edge between two resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

/// The compiled artifact for one node.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub name: String,
    pub version: String,
    pub catalog_uuid: Uuid,
    pub environment: String,
    pub resources: Vec<Resource>,
    pub edges: Vec<Edge>,
}

impl Catalog {
    pub fn new(name: &str, environment: &str) -> Self {
        let version = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs().to_string())
            .unwrap_or_else(|_| "0".to_string());
        Self {
            name: name.to_string(),
            version,
            catalog_uuid: Uuid::new_v4(),
            environment: environment.to_string(),
            resources: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_resource(&mut self, resource: Resource) {
        self.resources.push(resource);
    }

    /// Derive dependency edges from `require` parameters.
    pub fn build_edges(&mut self) {
        let mut edges = Vec::new();
        for resource in &self.resources {
            if let Some(serde_json::Value::String(target)) = resource.parameters.get("require") {
                edges.push(Edge {
                    source: target.clone(),
                    target: resource.reference(),
                });
            }
        }
        self.edges = edges;
    }

    /// The structured view emitted to clients and to stdout in one-shot
    /// compiles. The catalog itself is opaque to callers; this is the
    /// serialization hook.
    pub fn to_resource_view(&self) -> serde_json::Value {
        // Serialize is derived over plain JSON values, so this cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Pretty-printed resource view, one catalog block.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_resource_view())
    }
}

fn capitalize(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
