//! The one-shot compile flow: compile one catalog under migration
//! checking, print the artifact and the findings, and hand the caller a
//! result the binary maps onto exit code 0 or 30.

use std::io::Write;

use ravelin_compiler::{CatalogCompiler, CompileError, DiagnosticFormatter};

use crate::error::AppError;
use crate::migration::MigrationCheck;

/// Compile `node` and write the catalog block followed by one
/// `MIGRATION WARNING:` line per finding, in collection order.
///
/// One migration scope per compile, torn down on every return path
/// because it lives on this frame.
pub fn run(
    node: &str,
    compiler: &dyn CatalogCompiler,
    out: &mut dyn Write,
) -> Result<(), AppError> {
    let check = MigrationCheck::new("migration-checking");

    let catalog = compiler
        .find_catalog(node, Some(check.collector()))?
        .ok_or_else(|| AppError::CatalogMiss {
            node: node.to_string(),
        })?;

    let rendered = catalog
        .to_pretty_json()
        .map_err(|e| AppError::Compile(CompileError::Json(e)))?;
    writeln!(out, "{rendered}")?;

    let formatter = DiagnosticFormatter::new();
    for warning in check.warnings() {
        writeln!(out, "MIGRATION WARNING: {}", formatter.format(&warning))?;
    }

    Ok(())
}
