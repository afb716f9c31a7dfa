//! Startup sequencing: the ordered steps that take a parsed command
//! line to a ready application, with an interrupt check between steps.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ravelin_compiler::ManifestCompiler;

use crate::cache;
use crate::config::{log_destination, Options, Section, Settings};
use crate::error::AppError;
use crate::fileserving::{FileBucket, FileServer};
use crate::logging;
use crate::ssl::{CaMode, CertificateAuthority};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Cancellation token polled between startup steps.
///
/// `install` wires SIGINT to the process-wide flag; once startup is
/// past the point of no return the caller disarms the handler and the
/// default interrupt disposition returns.
pub struct StartupCancel {
    flag: Option<Arc<AtomicBool>>,
}

impl StartupCancel {
    /// Wire SIGINT to the process-wide cancellation flag.
    pub fn install() -> Self {
        // SAFETY: the handler only touches an atomic.
        unsafe {
            libc::signal(libc::SIGINT, on_sigint as libc::sighandler_t);
        }
        Self { flag: None }
    }

    /// A token with its own flag, not wired to any signal.
    pub fn detached() -> Self {
        Self {
            flag: Some(Arc::new(AtomicBool::new(false))),
        }
    }

    pub fn canceled(&self) -> bool {
        match &self.flag {
            Some(flag) => flag.load(Ordering::SeqCst),
            None => INTERRUPTED.load(Ordering::SeqCst),
        }
    }

    pub fn request(&self) {
        match &self.flag {
            Some(flag) => flag.store(true, Ordering::SeqCst),
            None => INTERRUPTED.store(true, Ordering::SeqCst),
        }
    }

    /// Restore the default SIGINT disposition before the blocking
    /// serve phase.
    pub fn disarm(&self) {
        if self.flag.is_none() {
            // SAFETY: resetting to the default disposition.
            unsafe {
                libc::signal(libc::SIGINT, libc::SIG_DFL);
            }
        }
    }
}

/// Everything setup produces for the dispatch phase.
pub struct App {
    pub settings: Settings,
    pub compiler: Arc<ManifestCompiler>,
    pub file_server: FileServer,
    pub bucket: FileBucket,
    pub ca: Option<CertificateAuthority>,
    pub ca_mode: CaMode,
}

/// How a setup run ended.
pub enum SetupOutcome {
    /// Ready to dispatch.
    Ready(Box<App>),
    /// `--configprint` handled; nothing further to run.
    ConfigPrinted,
    /// Interrupted between steps.
    Canceled,
}

/// Run the ordered startup sequence.
///
/// Steps: platform check, logging, configprint short-circuit, settings
/// sections, file serving, compiler and cache, certificate authority.
/// The cancellation token is polled between steps so an interrupt lands
/// before any later side effect.
pub fn setup(
    options: &Options,
    settings: &Settings,
    cancel: &StartupCancel,
) -> Result<SetupOutcome, AppError> {
    if cfg!(windows) {
        return Err(AppError::UnsupportedPlatform);
    }

    logging::init(
        log_destination(
            options.log_destination,
            options.target_node.is_some(),
            settings.daemonize,
            options.embedded,
        ),
        options.debug,
        options.verbose,
        &settings.vardir.join("log"),
    )?;
    if cancel.canceled() {
        return Ok(SetupOutcome::Canceled);
    }

    if options.config_print {
        settings
            .print(&mut io::stdout())
            .map_err(AppError::ConfigPrint)?;
        return Ok(SetupOutcome::ConfigPrinted);
    }

    for section in [Section::Main, Section::Server, Section::Ssl, Section::Metrics] {
        settings.use_section(section)?;
    }
    if cancel.canceled() {
        return Ok(SetupOutcome::Canceled);
    }

    let mut file_server = FileServer::new();
    file_server.add_mount("files", settings.mount_dir());
    let bucket = FileBucket::new(settings.bucketdir.clone());
    if cancel.canceled() {
        return Ok(SetupOutcome::Canceled);
    }

    let node_cache = cache::install(settings.node_cache, &settings.cachedir);
    let compiler = Arc::new(ManifestCompiler::new(
        settings.manifest_dir(),
        &settings.environment,
        node_cache,
    ));
    if cancel.canceled() {
        return Ok(SetupOutcome::Canceled);
    }

    let (ca, ca_mode) = if settings.certificate_authority {
        settings.use_section(Section::Ca)?;
        let ca = CertificateAuthority::materialize(&settings.ssldir)?;
        (Some(ca), CaMode::Local)
    } else {
        (None, CaMode::None)
    };
    if cancel.canceled() {
        return Ok(SetupOutcome::Canceled);
    }

    Ok(SetupOutcome::Ready(Box::new(App {
        settings: settings.clone(),
        compiler,
        file_server,
        bucket,
        ca,
        ca_mode,
    })))
}
