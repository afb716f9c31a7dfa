//! The migration-check scope wrapped around a one-shot compile.
//!
//! The scope owns the collector for exactly one compile and hands it to
//! the compiler by explicit parameter, so findings can never leak
//! between compiles and nothing has to be saved or restored when the
//! scope exits.

use ravelin_compiler::{DiagnosticCollector, DiagnosticEntry};

/// A labeled migration-check scope. Construct one per compile; drop it
/// when the compile's findings have been reported.
pub struct MigrationCheck {
    label: String,
    collector: DiagnosticCollector,
}

impl MigrationCheck {
    pub fn new(label: &str) -> Self {
        tracing::debug!(label, "opening migration check scope");
        Self {
            label: label.to_string(),
            collector: DiagnosticCollector::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The collector to pass into the compile call.
    pub fn collector(&self) -> &DiagnosticCollector {
        &self.collector
    }

    /// Findings gathered during this scope, in insertion order.
    pub fn warnings(&self) -> Vec<DiagnosticEntry> {
        self.collector.warnings()
    }
}
