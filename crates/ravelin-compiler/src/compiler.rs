//! Catalog compilation against a directory of node manifests.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::catalog::{Catalog, Resource};
use crate::diagnostic::{DiagnosticCollector, DiagnosticEntry};
use crate::error::CompileError;
use crate::node::{permissive_json, Node, NodeManifest};

/// Version stamp recorded by compile-service status responses.
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The compilation collaborator.
///
/// When a collector is supplied, the compile runs under migration
/// checking and every finding is routed into it. `Ok(None)` is a miss:
/// no manifest exists for the node.
pub trait CatalogCompiler: Send + Sync {
    fn find_catalog(
        &self,
        node: &str,
        checker: Option<&DiagnosticCollector>,
    ) -> Result<Option<Catalog>, CompileError>;
}

/// Node cache terminus consulted while resolving a node.
///
/// The default installed implementation is write-only: `store` persists
/// and `find` always misses, so resolved node data is recorded for
/// inspection without ever serving stale state back into a compile.
pub trait NodeCache: Send + Sync {
    fn store(&self, node: &Node) -> Result<(), CompileError>;
    fn find(&self, name: &str) -> Option<Node>;
}

/// Compiles catalogs from YAML node manifests under a directory.
pub struct ManifestCompiler {
    manifest_dir: PathBuf,
    environment: String,
    cache: Option<Arc<dyn NodeCache>>,
}

impl ManifestCompiler {
    pub fn new(
        manifest_dir: PathBuf,
        environment: &str,
        cache: Option<Arc<dyn NodeCache>>,
    ) -> Self {
        Self {
            manifest_dir,
            environment: environment.to_string(),
            cache,
        }
    }

    fn resolve_node(&self, name: &str, manifest: &NodeManifest) -> Result<Node, CompileError> {
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.find(name)) {
            return Ok(cached);
        }
        let node = Node::from_manifest(name, manifest, &self.environment);
        if let Some(cache) = &self.cache {
            cache.store(&node)?;
        }
        Ok(node)
    }
}

impl CatalogCompiler for ManifestCompiler {
    fn find_catalog(
        &self,
        node: &str,
        checker: Option<&DiagnosticCollector>,
    ) -> Result<Option<Catalog>, CompileError> {
        // Node names become file names; anything path-like is a miss.
        if node.is_empty() || node.contains(['/', '\\']) || node.contains("..") {
            return Ok(None);
        }

        let manifest_path = self.manifest_dir.join(format!("{node}.yaml"));
        if !manifest_path.exists() {
            return Ok(None);
        }

        let manifest: NodeManifest = serde_yaml::from_str(&fs::read_to_string(&manifest_path)?)?;
        let resolved = self.resolve_node(node, &manifest)?;

        let mut catalog = Catalog::new(&resolved.name, &resolved.environment);

        for class in &manifest.classes {
            let mut resource = Resource::new("class", &class.name);
            if let Some(checker) = checker {
                check_parameters(checker, &resource.reference(), &class.parameters);
            }
            resource.parameters = convert_parameters(&class.parameters);
            catalog.add_resource(resource);
        }

        for declaration in &manifest.resources {
            let mut resource = Resource::new(&declaration.kind, &declaration.title);
            if let Some(checker) = checker {
                check_parameters(checker, &resource.reference(), &declaration.parameters);
            }
            resource.parameters = convert_parameters(&declaration.parameters);
            catalog.add_resource(resource);
        }

        catalog.build_edges();
        Ok(Some(catalog))
    }
}

fn convert_parameters(
    parameters: &BTreeMap<String, serde_yaml::Value>,
) -> BTreeMap<String, serde_json::Value> {
    parameters
        .iter()
        .map(|(k, v)| (k.clone(), permissive_json(v)))
        .collect()
}

/// Migration-compatibility checks over one resource's parameters.
///
/// Each check flags a construct whose meaning changes across the
/// compiler-version migration. Findings are warnings only; the compiled
/// parameters are left untouched.
fn check_parameters(
    checker: &DiagnosticCollector,
    reference: &str,
    parameters: &BTreeMap<String, serde_yaml::Value>,
) {
    for (name, value) in parameters {
        let serde_yaml::Value::String(text) = value else {
            continue;
        };
        let location = Some(format!("{reference}/{name}"));

        if !text.is_empty() && text.parse::<f64>().is_ok() {
            checker.accept(DiagnosticEntry::warning(
                "MIG-0001",
                format!("quoted value \"{text}\" is treated as a number by the new compiler"),
                location,
            ));
        } else if text == "true" || text == "false" {
            checker.accept(DiagnosticEntry::warning(
                "MIG-0002",
                format!("bare word \"{text}\" becomes a boolean in the new compiler"),
                location,
            ));
        } else if text.is_empty() && name == "enabled" {
            checker.accept(DiagnosticEntry::warning(
                "MIG-0003",
                "empty string is no longer true in the new compiler",
                location,
            ));
        }
    }
}
