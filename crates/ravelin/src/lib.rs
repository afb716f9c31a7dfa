//! Ravelin front-end library.
//!
//! Exposes the startup, dispatch and service internals so tests and
//! embedding hosts can drive them. The main entry point is the
//! `ravelin` binary.

pub mod cache;
pub mod compile;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod embedded;
pub mod error;
pub mod fileserving;
pub mod logging;
pub mod migration;
pub mod privilege;
pub mod server;
pub mod service;
pub mod setup;
pub mod ssl;
