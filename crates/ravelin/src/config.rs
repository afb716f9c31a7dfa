//! Process configuration: CLI-derived options and the settings record.
//!
//! Settings are built once at startup from defaults, an optional
//! `<confdir>/ravelin.toml`, and CLI overrides, then passed by reference
//! into each flow. Nothing here is mutated after load.

use std::fs;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Configuration errors, fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: io::Error,
    },

    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("unknown node cache terminus {0:?} (expected write_only_yaml or none)")]
    UnknownCacheTerminus(String),

    #[error("unknown log destination {0:?} (expected console or syslog)")]
    LogDestination(String),

    #[error("invalid listen address {0:?}")]
    ListenAddress(String),
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDestination {
    /// Human-readable output on stderr.
    Console,
    /// Structured JSON appended to the service log file under vardir.
    System,
}

impl FromStr for LogDestination {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "console" => Ok(Self::Console),
            "syslog" | "system" => Ok(Self::System),
            other => Err(ConfigError::LogDestination(other.to_string())),
        }
    }
}

/// Default log destination when none was requested explicitly.
///
/// One-shot compiles and foregrounded servers log to the console;
/// daemonized or embedded servers log to the system destination.
pub fn default_log_destination(
    target_node: bool,
    daemonize: bool,
    embedded: bool,
) -> LogDestination {
    if target_node {
        LogDestination::Console
    } else if !daemonize && !embedded {
        LogDestination::Console
    } else {
        LogDestination::System
    }
}

/// Resolve the destination, honoring an explicit `--logdest` first.
pub fn log_destination(
    explicit: Option<LogDestination>,
    target_node: bool,
    daemonize: bool,
    embedded: bool,
) -> LogDestination {
    explicit.unwrap_or_else(|| default_log_destination(target_node, daemonize, embedded))
}

/// Node cache terminus selection; installed once during setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Writes persist, reads always miss. The default.
    #[default]
    WriteOnlyYaml,
    /// Caching disabled entirely.
    Disabled,
}

impl CachePolicy {
    fn from_config(value: &str) -> Result<Self, ConfigError> {
        match value {
            "write_only_yaml" => Ok(Self::WriteOnlyYaml),
            "" | "none" => Ok(Self::Disabled),
            other => Err(ConfigError::UnknownCacheTerminus(other.to_string())),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::WriteOnlyYaml => "write_only_yaml",
            Self::Disabled => "none",
        }
    }
}

/// Options accumulated from process arguments. Immutable after parse.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Set by `--compile` / `--migrate`; selects the one-shot flow.
    pub target_node: Option<String>,
    /// Internal flag: the service is driven by an external host.
    pub embedded: bool,
    /// Explicit `--logdest`, if any.
    pub log_destination: Option<LogDestination>,
    pub debug: bool,
    pub verbose: bool,
    /// Print resolved settings and exit.
    pub config_print: bool,
}

/// CLI values that override the config file.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub confdir: Option<PathBuf>,
    pub vardir: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub daemonize: bool,
}

/// `<confdir>/ravelin.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    vardir: Option<PathBuf>,
    bind_address: Option<String>,
    port: Option<u16>,
    daemonize: Option<bool>,
    ca: Option<bool>,
    user: Option<String>,
    group: Option<String>,
    environment: Option<String>,
    node_cache_terminus: Option<String>,
}

/// The resolved settings record.
#[derive(Debug, Clone)]
pub struct Settings {
    pub confdir: PathBuf,
    pub vardir: PathBuf,
    pub rundir: PathBuf,
    pub ssldir: PathBuf,
    pub cachedir: PathBuf,
    pub bucketdir: PathBuf,
    pub bind_address: String,
    pub port: u16,
    pub daemonize: bool,
    /// Whether this process is authorized to act as a certificate authority.
    pub certificate_authority: bool,
    pub user: String,
    pub group: String,
    pub environment: String,
    pub node_cache: CachePolicy,
}

impl Settings {
    pub fn load(overrides: &SettingsOverrides) -> Result<Self, ConfigError> {
        let confdir = overrides
            .confdir
            .clone()
            .unwrap_or_else(|| PathBuf::from("/etc/ravelin"));

        let file = read_config_file(&confdir.join("ravelin.toml"))?;

        let vardir = overrides
            .vardir
            .clone()
            .or(file.vardir)
            .unwrap_or_else(|| PathBuf::from("/var/lib/ravelin"));

        let node_cache = match file.node_cache_terminus.as_deref() {
            Some(value) => CachePolicy::from_config(value)?,
            None => CachePolicy::default(),
        };

        Ok(Self {
            rundir: vardir.join("run"),
            ssldir: vardir.join("ssl"),
            cachedir: vardir.join("cache"),
            bucketdir: vardir.join("bucket"),
            bind_address: overrides
                .bind_address
                .clone()
                .or(file.bind_address)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: overrides.port.or(file.port).unwrap_or(8140),
            daemonize: overrides.daemonize || file.daemonize.unwrap_or(false),
            certificate_authority: file.ca.unwrap_or(true),
            user: file.user.unwrap_or_else(|| "ravelin".to_string()),
            group: file.group.unwrap_or_else(|| "ravelin".to_string()),
            environment: file.environment.unwrap_or_else(|| "production".to_string()),
            node_cache,
            confdir,
            vardir,
        })
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.confdir.join("nodes")
    }

    pub fn mount_dir(&self) -> PathBuf {
        self.confdir.join("files")
    }

    pub fn pidfile(&self) -> PathBuf {
        self.rundir.join("ravelin.pid")
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let spec = format!("{}:{}", self.bind_address, self.port);
        spec.parse().map_err(|_| ConfigError::ListenAddress(spec))
    }

    /// Create the directories a settings section owns. Idempotent.
    pub fn use_section(&self, section: Section) -> io::Result<()> {
        for dir in self.section_dirs(section) {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    fn section_dirs(&self, section: Section) -> Vec<PathBuf> {
        match section {
            Section::Main => vec![self.confdir.clone(), self.vardir.clone()],
            Section::Server => vec![
                self.rundir.clone(),
                self.manifest_dir(),
                self.mount_dir(),
                self.bucketdir.clone(),
            ],
            Section::Ssl => vec![self.ssldir.join("certs"), self.ssldir.join("private_keys")],
            Section::Metrics => vec![self.vardir.join("metrics")],
            Section::Ca => vec![self.ssldir.join("ca")],
        }
    }

    /// Render the resolved settings, one `key = value` line each.
    pub fn print(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "confdir = {}", self.confdir.display())?;
        writeln!(out, "vardir = {}", self.vardir.display())?;
        writeln!(out, "rundir = {}", self.rundir.display())?;
        writeln!(out, "ssldir = {}", self.ssldir.display())?;
        writeln!(out, "cachedir = {}", self.cachedir.display())?;
        writeln!(out, "bucketdir = {}", self.bucketdir.display())?;
        writeln!(out, "bind_address = {}", self.bind_address)?;
        writeln!(out, "port = {}", self.port)?;
        writeln!(out, "daemonize = {}", self.daemonize)?;
        writeln!(out, "ca = {}", self.certificate_authority)?;
        writeln!(out, "user = {}", self.user)?;
        writeln!(out, "group = {}", self.group)?;
        writeln!(out, "environment = {}", self.environment)?;
        writeln!(out, "node_cache_terminus = {}", self.node_cache.as_str())?;
        Ok(())
    }
}

/// Settings sections whose directories get activated during setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Main,
    Server,
    Ssl,
    Metrics,
    Ca,
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Exhaustive check of the destination policy table: every
    // combination of (explicit set, node set, daemonize, embedded).
    #[test]
    fn log_destination_table() {
        for explicit in [None, Some(LogDestination::System)] {
            for target_node in [false, true] {
                for daemonize in [false, true] {
                    for embedded in [false, true] {
                        let expected = if let Some(dest) = explicit {
                            dest
                        } else if target_node {
                            LogDestination::Console
                        } else if !daemonize && !embedded {
                            LogDestination::Console
                        } else {
                            LogDestination::System
                        };
                        assert_eq!(
                            log_destination(explicit, target_node, daemonize, embedded),
                            expected,
                            "explicit={explicit:?} node={target_node} daemonize={daemonize} embedded={embedded}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn log_destination_parses() {
        assert_eq!(
            "console".parse::<LogDestination>().unwrap(),
            LogDestination::Console
        );
        assert_eq!(
            "syslog".parse::<LogDestination>().unwrap(),
            LogDestination::System
        );
        assert!("elsewhere".parse::<LogDestination>().is_err());
    }

    #[test]
    fn defaults_without_config_file() {
        let confdir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&SettingsOverrides {
            confdir: Some(confdir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(settings.port, 8140);
        assert_eq!(settings.node_cache, CachePolicy::WriteOnlyYaml);
        assert!(settings.certificate_authority);
        assert!(!settings.daemonize);
        assert_eq!(settings.ssldir, settings.vardir.join("ssl"));
    }

    #[test]
    fn config_file_applies_and_cli_wins() {
        let confdir = tempfile::tempdir().unwrap();
        fs::write(
            confdir.path().join("ravelin.toml"),
            "port = 9999\nenvironment = \"staging\"\nnode_cache_terminus = \"none\"\n",
        )
        .unwrap();

        let settings = Settings::load(&SettingsOverrides {
            confdir: Some(confdir.path().to_path_buf()),
            port: Some(1234),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(settings.port, 1234);
        assert_eq!(settings.environment, "staging");
        assert_eq!(settings.node_cache, CachePolicy::Disabled);
    }

    #[test]
    fn unknown_cache_terminus_is_rejected() {
        let confdir = tempfile::tempdir().unwrap();
        fs::write(
            confdir.path().join("ravelin.toml"),
            "node_cache_terminus = \"lru\"\n",
        )
        .unwrap();

        let err = Settings::load(&SettingsOverrides {
            confdir: Some(confdir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCacheTerminus(_)));
    }

    #[test]
    fn section_activation_is_idempotent() {
        let confdir = tempfile::tempdir().unwrap();
        let vardir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&SettingsOverrides {
            confdir: Some(confdir.path().to_path_buf()),
            vardir: Some(vardir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();

        settings.use_section(Section::Server).unwrap();
        settings.use_section(Section::Server).unwrap();
        assert!(settings.rundir.is_dir());
        assert!(settings.manifest_dir().is_dir());
    }

    #[test]
    fn print_lists_every_setting() {
        let confdir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&SettingsOverrides {
            confdir: Some(confdir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();

        let mut out = Vec::new();
        settings.print(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("confdir = "));
        assert!(text.contains("node_cache_terminus = write_only_yaml"));
        assert!(text.contains("port = 8140"));
    }

    #[test]
    fn listen_addr_parses_and_rejects() {
        let confdir = tempfile::tempdir().unwrap();
        let mut settings = Settings::load(&SettingsOverrides {
            confdir: Some(confdir.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(settings.listen_addr().unwrap().port(), 8140);

        settings.bind_address = "not an address".to_string();
        assert!(matches!(
            settings.listen_addr(),
            Err(ConfigError::ListenAddress(_))
        ));
    }
}
