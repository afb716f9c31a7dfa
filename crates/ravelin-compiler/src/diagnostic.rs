//! Migration-compatibility findings and their collection.
//!
//! A compile that runs under migration checking gets a
//! [`DiagnosticCollector`]; every finding the compiler produces is
//! appended there and reported after the compile finishes. Findings are
//! warnings only and never change the compiled catalog.

use parking_lot::Mutex;
use serde::Serialize;

/// Severity of a migration finding. Current checks only produce warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
}

/// One migration-compatibility finding.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEntry {
    pub severity: Severity,
    /// Stable issue code, e.g. `MIG-0001`.
    pub code: String,
    pub message: String,
    /// Where the finding was made, e.g. `File[/etc/motd]/content`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl DiagnosticEntry {
    pub fn warning(code: &str, message: impl Into<String>, location: Option<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: code.to_string(),
            message: message.into(),
            location,
        }
    }
}

/// Ordered accumulator for the findings of exactly one compile.
///
/// Append-only while the compile runs; drained (read, not cleared) for
/// reporting afterwards.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    entries: Mutex<Vec<DiagnosticEntry>>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finding, preserving insertion order.
    pub fn accept(&self, entry: DiagnosticEntry) {
        self.entries.lock().push(entry);
    }

    /// All findings collected so far, in insertion order. Reading does
    /// not clear the collector.
    pub fn warnings(&self) -> Vec<DiagnosticEntry> {
        self.entries.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Renders a finding as a single report line. Stateless.
#[derive(Debug, Default)]
pub struct DiagnosticFormatter;

impl DiagnosticFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format(&self, entry: &DiagnosticEntry) -> String {
        match &entry.location {
            Some(location) => format!("{}: {} (at {})", entry.code, entry.message, location),
            None => format!("{}: {}", entry.code, entry.message),
        }
    }
}
