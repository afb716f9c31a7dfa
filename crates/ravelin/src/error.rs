use thiserror::Error;

use crate::config::ConfigError;
use crate::daemon::DaemonError;
use crate::privilege::PrivilegeError;
use crate::ssl::SslError;
use ravelin_compiler::CompileError;

/// Front-end errors. The binary maps these onto the observable exit
/// codes: 30 for one-shot compile failures, 39 for privilege drop, 1
/// for everything else fatal.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("ravelin is not supported on Microsoft Windows")]
    UnsupportedPlatform,

    #[error("could not compile catalog for {node}")]
    CatalogMiss { node: String },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to print configuration: {0}")]
    ConfigPrint(std::io::Error),

    #[error("could not change to the configured user: {0}")]
    PrivilegeDrop(#[from] PrivilegeError),

    #[error(transparent)]
    Ssl(#[from] SslError),

    #[error(transparent)]
    Daemon(#[from] DaemonError),

    #[error("embedded mode requires an inherited listener from the host (LISTEN_FDS)")]
    NoInheritedListener,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
