//! Compiles node manifests into catalogs for the Ravelin compile server.
//!
//! Resolves a node from its manifest, builds the declarative catalog,
//! and routes migration-compatibility findings into a caller-supplied
//! collector without ever altering the compiled result.

pub mod catalog;
pub mod compiler;
pub mod diagnostic;
pub mod error;
pub mod node;

pub use catalog::{Catalog, Edge, Resource};
pub use compiler::{CatalogCompiler, ManifestCompiler, NodeCache, COMPILER_VERSION};
pub use diagnostic::{DiagnosticCollector, DiagnosticEntry, DiagnosticFormatter, Severity};
pub use error::CompileError;
pub use node::{Node, NodeManifest};
