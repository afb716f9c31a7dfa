//! Top-level execution mode selection.

use crate::config::Options;

/// The two mutually exclusive execution modes.
#[derive(Debug, PartialEq, Eq)]
pub enum Mode<'a> {
    /// Compile one catalog and exit.
    Compile(&'a str),
    /// Bring up the persistent compile service.
    Service,
}

/// Pure branch, no side effects: a supplied target node selects the
/// one-shot compile flow, anything else the service flow.
pub fn run_mode(options: &Options) -> Mode<'_> {
    match &options.target_node {
        Some(node) => Mode::Compile(node),
        None => Mode::Service,
    }
}
