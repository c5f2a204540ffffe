//! CLI argument parsing and config file support.
//!
//! The daemon can be configured via CLI flags, a JSON config file,
//! or a combination of both (CLI overrides config file).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use zeta_network::config::DEFAULT_DIRECTORY_URL;
use zeta_types::config::{IdentityMode, MAX_CONNECTIONS};

const DEFAULT_LISTEN_ADDR: &str = "/ip4/0.0.0.0/tcp/0";

// ---------------------------------------------------------------------------
// CLI arguments (manual parsing, no clap dependency)
// ---------------------------------------------------------------------------

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    pub data_dir: Option<PathBuf>,
    pub directory_url: Option<String>,
    pub listen_addr: Option<String>,
    pub max_connections: Option<usize>,
    pub persist_identity: bool,
    pub no_store: bool,
    pub config_path: Option<PathBuf>,
}

impl CliArgs {
    /// Parses CLI arguments from `std::env::args`.
    pub fn parse_from_env() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        match Self::parse(&args) {
            Ok(Some(cli)) => cli,
            Ok(None) => {
                print_help();
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("{e}");
                eprintln!("use --help for usage information");
                std::process::exit(1);
            }
        }
    }

    /// Parses `args` (without the program name). Returns `Ok(None)` when
    /// help was requested.
    pub fn parse(args: &[String]) -> Result<Option<Self>, String> {
        let mut cli = Self::default();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--data-dir" => {
                    i += 1;
                    cli.data_dir = Some(PathBuf::from(value(args, i, "--data-dir")?));
                }
                "--directory" => {
                    i += 1;
                    cli.directory_url = Some(value(args, i, "--directory")?.to_string());
                }
                "--listen" => {
                    i += 1;
                    cli.listen_addr = Some(value(args, i, "--listen")?.to_string());
                }
                "--max-connections" => {
                    i += 1;
                    let raw = value(args, i, "--max-connections")?;
                    cli.max_connections = Some(
                        raw.parse()
                            .map_err(|_| format!("invalid --max-connections value: {raw}"))?,
                    );
                }
                "--persist-identity" => {
                    cli.persist_identity = true;
                }
                "--no-store" => {
                    cli.no_store = true;
                }
                "--config" => {
                    i += 1;
                    cli.config_path = Some(PathBuf::from(value(args, i, "--config")?));
                }
                "--help" | "-h" => return Ok(None),
                other => return Err(format!("unknown argument: {other}")),
            }
            i += 1;
        }

        Ok(Some(cli))
    }
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, String> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} requires a value"))
}

// ---------------------------------------------------------------------------
// Config file (JSON)
// ---------------------------------------------------------------------------

/// JSON config file format.
///
/// Example `daemon.json`:
/// ```json
/// {
///   "data_dir": "/opt/zeta/data",
///   "directory_url": "https://zetanetwork.org/api/v1",
///   "listen_addr": "/ip4/0.0.0.0/tcp/9000",
///   "max_connections": 10,
///   "identity": "persistent",
///   "store": true
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DaemonConfigFile {
    pub data_dir: Option<String>,
    pub directory_url: Option<String>,
    pub listen_addr: Option<String>,
    pub max_connections: Option<usize>,
    pub identity: Option<IdentityMode>,
    pub store: Option<bool>,
}

// ---------------------------------------------------------------------------
// Resolved config (all defaults applied)
// ---------------------------------------------------------------------------

/// Fully resolved daemon configuration with all defaults applied.
#[derive(Debug)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub directory_url: String,
    pub listen_addr: String,
    pub max_connections: usize,
    pub identity_mode: IdentityMode,
    pub use_store: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            directory_url: DEFAULT_DIRECTORY_URL.into(),
            listen_addr: DEFAULT_LISTEN_ADDR.into(),
            max_connections: MAX_CONNECTIONS,
            identity_mode: IdentityMode::Ephemeral,
            use_store: true,
        }
    }
}

impl DaemonConfig {
    /// Build config purely from CLI args with defaults.
    pub fn from_cli(cli: &CliArgs) -> Self {
        Self::default().merge_cli(cli)
    }

    /// Load config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file: {e}"))?;
        Self::from_json(&text)
    }

    fn from_json(text: &str) -> Result<Self, String> {
        let file: DaemonConfigFile =
            serde_json::from_str(text).map_err(|e| format!("invalid config JSON: {e}"))?;

        let defaults = Self::default();
        Ok(Self {
            data_dir: file.data_dir.map(PathBuf::from).unwrap_or(defaults.data_dir),
            directory_url: file.directory_url.unwrap_or(defaults.directory_url),
            listen_addr: file.listen_addr.unwrap_or(defaults.listen_addr),
            max_connections: file.max_connections.unwrap_or(defaults.max_connections),
            identity_mode: file.identity.unwrap_or(defaults.identity_mode),
            use_store: file.store.unwrap_or(defaults.use_store),
        })
    }

    /// Merge CLI overrides onto a config-file base.
    pub fn merge_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(ref dir) = cli.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(ref url) = cli.directory_url {
            self.directory_url = url.clone();
        }
        if let Some(ref addr) = cli.listen_addr {
            self.listen_addr = addr.clone();
        }
        if let Some(max) = cli.max_connections {
            self.max_connections = max;
        }
        if cli.persist_identity {
            self.identity_mode = IdentityMode::Persistent;
        }
        if cli.no_store {
            self.use_store = false;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Platform-specific default data directory.
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        if let Some(home) = dirs::home_dir() {
            return home.join(".zeta");
        }
    }
    if let Some(data) = dirs::data_dir() {
        return data.join("Zeta");
    }
    PathBuf::from("zeta-data")
}

fn print_help() {
    println!(
        r#"Zeta Daemon - headless gossip network node

USAGE:
    zeta-daemon [OPTIONS]

OPTIONS:
    --data-dir <PATH>          Data directory (default: platform-specific)
    --directory <URL>          Relay directory API base (default: {DEFAULT_DIRECTORY_URL})
    --listen <MULTIADDR>       P2P listen address (default: {DEFAULT_LISTEN_ADDR})
    --max-connections <N>      Upper bound on connected relays (default: {MAX_CONNECTIONS})
    --persist-identity         Reuse the peer identity across launches
    --no-store                 Keep history in memory only
    --config <PATH>            Load settings from JSON config file
    -h, --help                 Show this help

INPUT:
    <text>                     Publish <text> on the global topic
    /status                    Print session status
    /reconnect                 Rediscover relays and reconnect
    /quit                      Shut down

ENVIRONMENT:
    RUST_LOG                   Log level filter (default: info)
"#
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_all_flags() {
        let cli = CliArgs::parse(&args(&[
            "--data-dir",
            "/tmp/zeta",
            "--directory",
            "http://localhost:8080/api/v1",
            "--listen",
            "/ip4/127.0.0.1/tcp/9000",
            "--max-connections",
            "4",
            "--persist-identity",
            "--no-store",
        ]))
        .unwrap()
        .unwrap();

        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/zeta")));
        assert_eq!(cli.directory_url.as_deref(), Some("http://localhost:8080/api/v1"));
        assert_eq!(cli.max_connections, Some(4));
        assert!(cli.persist_identity);
        assert!(cli.no_store);
    }

    #[test]
    fn help_and_errors() {
        assert!(CliArgs::parse(&args(&["--help"])).unwrap().is_none());
        assert!(CliArgs::parse(&args(&["--bogus"])).is_err());
        assert!(CliArgs::parse(&args(&["--listen"])).is_err());
        assert!(CliArgs::parse(&args(&["--max-connections", "many"])).is_err());
    }

    #[test]
    fn defaults_are_ephemeral_with_store() {
        let cfg = DaemonConfig::from_cli(&CliArgs::default());
        assert_eq!(cfg.identity_mode, IdentityMode::Ephemeral);
        assert!(cfg.use_store);
        assert_eq!(cfg.directory_url, DEFAULT_DIRECTORY_URL);
        assert_eq!(cfg.max_connections, MAX_CONNECTIONS);
    }

    #[test]
    fn cli_overrides_config_file() {
        let file = DaemonConfig::from_json(
            r#"{"listen_addr":"/ip4/0.0.0.0/tcp/9000","identity":"persistent","store":false}"#,
        )
        .unwrap();
        assert_eq!(file.identity_mode, IdentityMode::Persistent);
        assert!(!file.use_store);

        let cli = CliArgs {
            listen_addr: Some("/ip4/127.0.0.1/tcp/9100".into()),
            ..CliArgs::default()
        };
        let merged = file.merge_cli(&cli);
        assert_eq!(merged.listen_addr, "/ip4/127.0.0.1/tcp/9100");
        assert_eq!(merged.identity_mode, IdentityMode::Persistent);
    }

    #[test]
    fn invalid_json_rejected() {
        assert!(DaemonConfig::from_json("{not json").is_err());
    }
}
