//! The write-only node cache terminus.
//!
//! Writes succeed and persist; lookups unconditionally miss. A real
//! cache here would serve stale node data whenever invalidation cannot
//! be guaranteed, so the miss behavior is the point, not an omission.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ravelin_compiler::{CompileError, Node, NodeCache};

use crate::config::CachePolicy;

/// Persists resolved nodes as YAML under the cache directory and never
/// reads them back.
pub struct WriteOnlyYamlCache {
    dir: PathBuf,
}

impl WriteOnlyYamlCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl NodeCache for WriteOnlyYamlCache {
    fn store(&self, node: &Node) -> Result<(), CompileError> {
        fs::create_dir_all(&self.dir)?;
        let rendered = serde_yaml::to_string(node).map_err(CompileError::Manifest)?;
        fs::write(self.dir.join(format!("{}.yaml", node.name)), rendered)?;
        Ok(())
    }

    fn find(&self, _name: &str) -> Option<Node> {
        None
    }
}

/// Install the configured node cache policy. `Disabled` turns caching
/// off entirely.
pub fn install(policy: CachePolicy, cachedir: &Path) -> Option<Arc<dyn NodeCache>> {
    match policy {
        CachePolicy::WriteOnlyYaml => {
            Some(Arc::new(WriteOnlyYamlCache::new(cachedir.join("node"))))
        }
        CachePolicy::Disabled => None,
    }
}
