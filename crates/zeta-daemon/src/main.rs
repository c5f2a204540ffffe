//! Zeta Daemon -- headless gossip network node.
//!
//! Usage:
//!
//!   zeta-daemon [OPTIONS]
//!
//! Options:
//!
//!   --data-dir <PATH>       Data directory (default: platform-specific)
//!   --directory <URL>       Relay directory API base
//!   --listen <MULTIADDR>    P2P listen address (default: /ip4/0.0.0.0/tcp/0)
//!   --max-connections <N>   Relay connection cap (default: 10)
//!   --persist-identity      Reuse the peer identity across launches
//!   --no-store              Keep history in memory only
//!   --config <PATH>         Load config from JSON file
//!
//! Lines read from stdin are published on the global topic. The daemon
//! runs until `/quit` or Ctrl+C.

use std::path::Path;
use std::sync::Arc;

use libp2p::Multiaddr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use zeta_network::config::NetworkConfig;
use zeta_network::{identity, GossipTransport, HttpDirectory, HttpRegistrar};
use zeta_node::{Node, NodeCommand, NodeParts, ObserverRegistry, SessionObserver};
use zeta_storage::settings::SettingsStore;
use zeta_storage::{LocalStore, MessageStore, NullStore};
use zeta_types::config::SessionConfig;
use zeta_types::{MessageRecord, PeerIdentity, SessionStatus};

mod config;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const STORE_DIR: &str = "store";

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = config::CliArgs::parse_from_env();

    let daemon_config = match &cli.config_path {
        Some(path) => match config::DaemonConfig::load(path) {
            Ok(cfg) => cfg.merge_cli(&cli),
            Err(e) => {
                tracing::error!("failed to load config file: {e}");
                std::process::exit(1);
            }
        },
        None => config::DaemonConfig::from_cli(&cli),
    };

    if let Err(e) = run_daemon(daemon_config).await {
        tracing::error!("daemon error: {e}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Daemon main logic
// ---------------------------------------------------------------------------

async fn run_daemon(cfg: config::DaemonConfig) -> Result<(), String> {
    std::fs::create_dir_all(&cfg.data_dir)
        .map_err(|e| format!("failed to create data directory: {e}"))?;
    tracing::info!(data_dir = %cfg.data_dir.display(), "data directory ready");

    // -----------------------------------------------------------------------
    // 1. Local store (history is optional)
    // -----------------------------------------------------------------------

    let (store, settings) = open_store(&cfg.data_dir.join(STORE_DIR), cfg.use_store);

    // -----------------------------------------------------------------------
    // 2. Identity
    // -----------------------------------------------------------------------

    let keypair = identity::resolve(cfg.identity_mode, settings.as_ref())
        .map_err(|e| format!("failed to resolve identity: {e}"))?;

    // -----------------------------------------------------------------------
    // 3. Network
    // -----------------------------------------------------------------------

    let listen_addr = cfg
        .listen_addr
        .parse::<Multiaddr>()
        .map_err(|e| format!("invalid listen address '{}': {e}", cfg.listen_addr))?;

    let net_config = NetworkConfig {
        directory_url: cfg.directory_url.clone(),
        listen_addr,
        ..NetworkConfig::default()
    };

    let defaults = SessionConfig::default();
    let session_config = SessionConfig {
        max_connections: cfg.max_connections,
        healthy_relay_threshold: defaults.healthy_relay_threshold.min(cfg.max_connections),
        identity_mode: cfg.identity_mode,
        ..defaults
    };

    let (transport, events) = GossipTransport::spawn(&net_config, keypair)
        .map_err(|e| format!("transport start failed: {e}"))?;
    let local_peer_id = zeta_network::Transport::local_peer_id(&transport);

    let directory = HttpDirectory::new(&net_config, session_config.max_connections)
        .map_err(|e| format!("directory client failed: {e}"))?;
    let registrar =
        HttpRegistrar::new(&net_config).map_err(|e| format!("registrar client failed: {e}"))?;

    tracing::info!(
        directory = %net_config.directory_url,
        listen = %cfg.listen_addr,
        identity = ?cfg.identity_mode,
        "network config"
    );

    // -----------------------------------------------------------------------
    // 4. Start node
    // -----------------------------------------------------------------------

    let mut observers = ObserverRegistry::new();
    observers.register(Arc::new(ConsoleObserver));

    let parts = NodeParts {
        transport: Arc::new(transport),
        events,
        directory: Arc::new(directory),
        registrar: Arc::new(registrar),
        store,
        observers,
    };

    let mut node = Node::new(session_config, net_config.topics.clone(), parts)
        .map_err(|e| format!("node creation failed: {e}"))?;
    let command_tx = node.command_sender();
    let mut node_handle = node.start().map_err(|e| format!("node start failed: {e}"))?;

    println!();
    println!("============================================================");
    println!("  Zeta Daemon running");
    println!("============================================================");
    println!("  Peer ID:      {local_peer_id}");
    println!("  Directory:    {}", net_config.directory_url);
    println!("  P2P listen:   {}", cfg.listen_addr);
    println!("  History:      {}", if cfg.use_store { "stored" } else { "memory only" });
    println!("  Data dir:     {}", cfg.data_dir.display());
    println!("============================================================");
    println!("  Type a message and press Enter; /quit or Ctrl+C to stop");
    println!("============================================================");
    println!();

    // -----------------------------------------------------------------------
    // 5. Input loop until shutdown
    // -----------------------------------------------------------------------

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut loop_finished = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received Ctrl+C, shutting down...");
                break;
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        if handle_input(line.trim(), &command_tx).await {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("stdin closed, input disabled");
                        stdin_open = false;
                    }
                    Err(e) => {
                        tracing::warn!(%e, "stdin read failed, input disabled");
                        stdin_open = false;
                    }
                }
            }
            result = &mut node_handle => {
                loop_finished = true;
                match result {
                    Ok(()) => tracing::error!("node event loop exited unexpectedly"),
                    Err(e) => tracing::error!(%e, "node event loop panicked"),
                }
                break;
            }
        }
    }

    if !loop_finished {
        node.shutdown().map_err(|e| format!("shutdown failed: {e}"))?;
        if let Err(e) = node_handle.await {
            tracing::error!(%e, "node event loop panicked during shutdown");
        }
    }

    tracing::info!("daemon stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Opens the sled store, falling back to an in-memory session when the
/// store is disabled or cannot be opened.
fn open_store(path: &Path, enabled: bool) -> (Box<dyn MessageStore>, Option<SettingsStore>) {
    if !enabled {
        tracing::info!("local store disabled, history kept in memory only");
        return (Box::new(NullStore), None);
    }

    let store = match LocalStore::open(path) {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!(%e, path = %path.display(), "local store unavailable, continuing without history");
            return (Box::new(NullStore), None);
        }
    };

    let settings = match store.settings() {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!(%e, "settings table unavailable");
            None
        }
    };

    tracing::info!(path = %path.display(), "local store opened");
    (Box::new(store), settings)
}

/// Handles one line of user input. Returns `true` to quit.
async fn handle_input(line: &str, command_tx: &mpsc::Sender<NodeCommand>) -> bool {
    match line {
        "" => false,
        "/quit" => true,
        "/status" => {
            let (reply, rx) = oneshot::channel();
            if command_tx.send(NodeCommand::GetStatus { reply }).await.is_err() {
                return true;
            }
            if let Ok(status) = rx.await {
                println!(
                    "status: {} ({}), relays: {}, received: {}, buffered: {}, uptime: {}",
                    status.session,
                    status.status,
                    status.active_relays.len(),
                    status.stats.messages_received,
                    status.buffered_messages,
                    status.stats.uptime_display(),
                );
            }
            false
        }
        "/reconnect" => {
            let (reply, rx) = oneshot::channel();
            if command_tx.send(NodeCommand::Reconnect { reply }).await.is_err() {
                return true;
            }
            match rx.await {
                Ok(Ok(count)) => println!("reconnected to {count} relay(s)"),
                Ok(Err(e)) => println!("reconnect failed: {e}"),
                Err(_) => {}
            }
            false
        }
        content => {
            let (reply, rx) = oneshot::channel();
            let cmd = NodeCommand::SendMessage {
                content: content.to_string(),
                topic: None,
                reply,
            };
            if command_tx.send(cmd).await.is_err() {
                return true;
            }
            if let Ok(Err(e)) = rx.await {
                println!("message not sent: {e}");
            }
            false
        }
    }
}

// ---------------------------------------------------------------------------
// ConsoleObserver
// ---------------------------------------------------------------------------

/// Prints messages to stdout and logs session changes.
struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn on_status(&self, status: SessionStatus) {
        tracing::info!(%status, "session status");
    }

    fn on_relays(&self, relays: &[PeerIdentity]) {
        tracing::info!(count = relays.len(), "active relays changed");
    }

    fn on_message(&self, record: &MessageRecord) {
        println!(
            "[{}] {}: {}",
            record.timestamp.format("%H:%M:%S"),
            record.display_author(),
            record.content,
        );
    }
}
