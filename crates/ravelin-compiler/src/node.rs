//! Node model and the on-disk manifest it is resolved from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// On-disk description of a node: `<confdir>/nodes/<name>.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeManifest {
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub facts: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub classes: Vec<ClassDeclaration>,
    #[serde(default)]
    pub resources: Vec<ResourceDeclaration>,
}

/// A class applied to the node, with parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassDeclaration {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_yaml::Value>,
}

/// A resource declared directly on the node.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDeclaration {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_yaml::Value>,
}

/// A resolved node: the manifest with its name and defaults applied.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub name: String,
    pub environment: String,
    pub facts: BTreeMap<String, serde_json::Value>,
}

impl Node {
    pub fn from_manifest(name: &str, manifest: &NodeManifest, default_environment: &str) -> Self {
        Self {
            name: name.to_string(),
            environment: manifest
                .environment
                .clone()
                .unwrap_or_else(|| default_environment.to_string()),
            facts: manifest
                .facts
                .iter()
                .map(|(k, v)| (k.clone(), permissive_json(v)))
                .collect(),
        }
    }
}

/// Converts a YAML value into JSON without ever failing.
///
/// JSON has no encoding for non-finite numbers, so NaN and the
/// infinities become their string spellings instead of raising. Nesting
/// depth is not limited.
pub fn permissive_json(value: &serde_yaml::Value) -> serde_json::Value {
    match value {
        serde_yaml::Value::Null => serde_json::Value::Null,
        serde_yaml::Value::Bool(b) => serde_json::Value::Bool(*b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_json::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                serde_json::Value::from(u)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                match serde_json::Number::from_f64(f) {
                    Some(num) => serde_json::Value::Number(num),
                    None if f.is_nan() => serde_json::Value::String("NaN".to_string()),
                    None if f.is_sign_negative() => {
                        serde_json::Value::String("-Infinity".to_string())
                    }
                    None => serde_json::Value::String("Infinity".to_string()),
                }
            }
        }
        serde_yaml::Value::String(s) => serde_json::Value::String(s.clone()),
        serde_yaml::Value::Sequence(items) => {
            serde_json::Value::Array(items.iter().map(permissive_json).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                let key = match k {
                    serde_yaml::Value::String(s) => s.clone(),
                    other => serde_yaml::to_string(other)
                        .map(|s| s.trim_end().to_string())
                        .unwrap_or_default(),
                };
                out.insert(key, permissive_json(v));
            }
            serde_json::Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => permissive_json(&tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn manifest_parses_with_defaults() {
        let manifest: NodeManifest = serde_yaml::from_str(
            r#"
facts:
  role: web
resources:
  - type: file
    title: /etc/motd
    parameters:
      content: hello
"#,
        )
        .unwrap();

        assert!(manifest.environment.is_none());
        assert_eq!(manifest.resources.len(), 1);
        assert_eq!(manifest.resources[0].kind, "file");

        let node = Node::from_manifest("web01", &manifest, "production");
        assert_eq!(node.environment, "production");
        assert_eq!(node.facts["role"], serde_json::json!("web"));
    }

    #[test]
    fn non_finite_numbers_serialize_as_strings() {
        assert_eq!(permissive_json(&yaml(".nan")), serde_json::json!("NaN"));
        assert_eq!(permissive_json(&yaml(".inf")), serde_json::json!("Infinity"));
        assert_eq!(
            permissive_json(&yaml("-.inf")),
            serde_json::json!("-Infinity")
        );
    }

    #[test]
    fn deep_nesting_converts_without_limit() {
        let mut doc = String::new();
        for depth in 0..200 {
            doc.push_str(&"  ".repeat(depth));
            doc.push_str("nested:\n");
        }
        doc.push_str(&"  ".repeat(200));
        doc.push_str("leaf: 1\n");

        let converted = permissive_json(&yaml(&doc));
        assert!(converted.is_object());
    }

    #[test]
    fn integers_and_floats_pass_through() {
        assert_eq!(permissive_json(&yaml("42")), serde_json::json!(42));
        assert_eq!(permissive_json(&yaml("2.5")), serde_json::json!(2.5));
    }
}
