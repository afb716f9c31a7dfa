use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use ravelin_lib::compile;
use ravelin_lib::config::{LogDestination, Options, Settings, SettingsOverrides};
use ravelin_lib::dispatch::{self, Mode};
use ravelin_lib::embedded;
use ravelin_lib::error::AppError;
use ravelin_lib::service::{self, ServiceMode};
use ravelin_lib::setup::{setup, SetupOutcome, StartupCancel};

/// Compile-service front end: one-shot catalog compiles or the
/// persistent compile server.
#[derive(Debug, Parser)]
#[command(name = "ravelin", version, about)]
struct Cli {
    /// Log at debug level.
    #[arg(short = 'd', long)]
    debug: bool,

    /// Log at info level.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Log destination: console or syslog.
    #[arg(short = 'l', long = "logdest", value_name = "DEST")]
    logdest: Option<LogDestination>,

    /// Compile a catalog for one node, print it, and exit.
    #[arg(long, value_name = "NODE")]
    compile: Option<String>,

    /// Like --compile, with migration validation of the node's manifest.
    #[arg(long, value_name = "NODE", conflicts_with = "compile")]
    migrate: Option<String>,

    /// Attach to an embedding host instead of managing the server.
    #[arg(long, hide = true)]
    embedded: bool,

    /// Detach from the terminal and run in the background.
    #[arg(long)]
    daemonize: bool,

    /// Print the resolved settings and exit.
    #[arg(long)]
    configprint: bool,

    /// Configuration directory.
    #[arg(long, value_name = "DIR")]
    confdir: Option<PathBuf>,

    /// State directory.
    #[arg(long, value_name = "DIR")]
    vardir: Option<PathBuf>,

    /// Address to bind the compile server to.
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Port to bind the compile server to.
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,
}

const COMPILE_FAILURE: u8 = 30;
const PRIVILEGE_FAILURE: u8 = 39;

fn main() -> ExitCode {
    // Captured before anything mutates the environment; the daemon
    // records it for diagnostics.
    let argv: Vec<String> = std::env::args().collect();
    let cli = Cli::parse();

    let options = Options {
        target_node: cli.compile.or(cli.migrate),
        embedded: cli.embedded,
        log_destination: cli.logdest,
        debug: cli.debug,
        verbose: cli.verbose,
        config_print: cli.configprint,
    };
    let overrides = SettingsOverrides {
        confdir: cli.confdir,
        vardir: cli.vardir,
        bind_address: cli.bind,
        port: cli.port,
        daemonize: cli.daemonize,
    };

    let cancel = StartupCancel::install();

    let settings = match Settings::load(&overrides) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("ravelin: {e}");
            return ExitCode::FAILURE;
        }
    };

    let app = match setup(&options, &settings, &cancel) {
        Ok(SetupOutcome::Ready(app)) => *app,
        Ok(SetupOutcome::ConfigPrinted) => return ExitCode::SUCCESS,
        Ok(SetupOutcome::Canceled) => {
            eprintln!("Canceling startup");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("ravelin: {e}");
            return ExitCode::FAILURE;
        }
    };

    match dispatch::run_mode(&options) {
        Mode::Compile(node) => {
            // Startup is over; interrupts take the default disposition
            // again so a hung compile stays killable.
            cancel.disarm();
            match compile::run(node, app.compiler.as_ref(), &mut io::stdout()) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, "catalog compilation failed");
                    eprintln!("ravelin: {e}");
                    ExitCode::from(COMPILE_FAILURE)
                }
            }
        }
        Mode::Service => match service::run(app, &options, argv, &cancel) {
            Ok(ServiceMode::Daemon) => ExitCode::SUCCESS,
            Ok(ServiceMode::Embedded(svc)) => {
                cancel.disarm();
                serve_embedded(svc)
            }
            Err(e @ AppError::PrivilegeDrop(_)) => {
                eprintln!("ravelin: {e}");
                ExitCode::from(PRIVILEGE_FAILURE)
            }
            Err(e) => {
                eprintln!("ravelin: {e}");
                ExitCode::FAILURE
            }
        },
    }
}

fn serve_embedded(svc: embedded::EmbeddedService) -> ExitCode {
    let outcome = (|| -> Result<(), AppError> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async {
            let listener = embedded::inherited_listener()?;
            svc.serve(listener)
                .await
                .map_err(|e| AppError::Io(io::Error::other(e.to_string())))
        })
    })();

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ravelin: {e}");
            ExitCode::FAILURE
        }
    }
}
