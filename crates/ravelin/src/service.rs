//! Service startup: TLS identity, privilege drop, then either the
//! self-managed daemon or a handle for an embedding host.

use std::sync::Arc;

use ravelin_compiler::COMPILER_VERSION;

use crate::config::Options;
use crate::daemon::{Daemon, PidLock};
use crate::embedded::EmbeddedService;
use crate::error::AppError;
use crate::privilege;
use crate::server::{Server, ServiceState};
use crate::setup::{App, StartupCancel};
use crate::ssl::{self, CaMode};

/// What the service flow hands back to the binary.
pub enum ServiceMode {
    /// The daemon ran to completion; the process is done.
    Daemon,
    /// Embedded hosting: the host drives this handle.
    Embedded(EmbeddedService),
}

/// Run the service startup flow.
///
/// Blocks for the life of the process in the self-managed case;
/// returns promptly with a handle in the embedded case.
pub fn run(
    mut app: App,
    options: &Options,
    argv: Vec<String>,
    cancel: &StartupCancel,
) -> Result<ServiceMode, AppError> {
    let identity = ssl::localhost_identity(&app.settings.ssldir, app.ca.as_ref())?;
    if app.ca.is_some() {
        // A serving CA answers for itself only.
        app.ca_mode = CaMode::Only;
    }

    if privilege::running_as_root() {
        privilege::drop_to(&app.settings.user, &app.settings.group)?;
    }

    let state = Arc::new(ServiceState {
        compiler: app.compiler.clone(),
        file_server: app.file_server,
        bucket: app.bucket,
        ca_mode: app.ca_mode,
    });

    if options.embedded {
        announce_startup();
        return Ok(ServiceMode::Embedded(EmbeddedService::new(state)));
    }

    let tls = ssl::server_config(&identity)?;
    let addr = app.settings.listen_addr()?;
    let server = Server::new(addr, tls, state);

    let mut daemon = Daemon::new(PidLock::new(app.settings.pidfile()));
    daemon.argv = argv;
    daemon.set_server(server);

    if app.settings.daemonize {
        daemon.daemonize()?;
    }

    // Startup is past the point of no return; interrupts now take the
    // default disposition.
    cancel.disarm();
    announce_startup();
    daemon.start()?;
    Ok(ServiceMode::Daemon)
}

/// The startup announcement, identical for both hosting modes.
fn announce_startup() {
    tracing::info!("Starting ravelin compile server version {COMPILER_VERSION}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, SettingsOverrides};
    use crate::setup::{setup, SetupOutcome};

    fn ready_app(confdir: &std::path::Path, vardir: &std::path::Path) -> App {
        let mut settings = Settings::load(&SettingsOverrides {
            confdir: Some(confdir.to_path_buf()),
            vardir: Some(vardir.to_path_buf()),
            ..Default::default()
        })
        .unwrap();
        // Dropping to our own identity is a no-op under the test runner.
        settings.user = "root".to_string();
        settings.group = "root".to_string();

        let cancel = StartupCancel::detached();
        match setup(&Options::default(), &settings, &cancel).unwrap() {
            SetupOutcome::Ready(app) => *app,
            _ => panic!("expected a ready app"),
        }
    }

    #[tokio::test]
    async fn embedded_mode_returns_a_handle_without_blocking() {
        let confdir = tempfile::tempdir().unwrap();
        let vardir = tempfile::tempdir().unwrap();
        let app = ready_app(confdir.path(), vardir.path());

        let options = Options {
            embedded: true,
            ..Default::default()
        };
        let mode = run(app, &options, vec!["ravelin".to_string()], &StartupCancel::detached())
            .unwrap();
        let service = match mode {
            ServiceMode::Embedded(service) => service,
            ServiceMode::Daemon => panic!("expected the embedded handle"),
        };

        // The handle answers requests and reports the restricted CA mode.
        let request = hyper::Request::builder()
            .method(hyper::Method::GET)
            .uri("/status")
            .body(http_body_util::Full::new(bytes::Bytes::new()))
            .unwrap();
        let response = service.handle(request).await;
        assert_eq!(response.status(), hyper::StatusCode::OK);

        use http_body_util::BodyExt;
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["ca"], "only");
    }

    #[derive(Clone)]
    struct Capture(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn announcement_is_visible_at_default_verbosity() {
        let buffer = Arc::new(std::sync::Mutex::new(Vec::new()));
        let capture = Capture(buffer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(
                crate::logging::level_for(false, false),
            ))
            .with_writer(move || capture.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, announce_startup);

        let output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Starting ravelin compile server version"));
    }

    #[test]
    fn embedded_startup_materializes_the_tls_identity() {
        let confdir = tempfile::tempdir().unwrap();
        let vardir = tempfile::tempdir().unwrap();
        let app = ready_app(confdir.path(), vardir.path());
        let ssldir = app.settings.ssldir.clone();

        let options = Options {
            embedded: true,
            ..Default::default()
        };
        run(app, &options, Vec::new(), &StartupCancel::detached()).unwrap();
        assert!(ssldir.join("certs/localhost.pem").is_file());
        assert!(ssldir.join("private_keys/localhost.pem").is_file());
    }
}
