//! `nightjar-node`: wires the relay server, the mesh participant and the
//! kernel's lifecycle primitives into a runnable daemon.
//!
//! This binary owns the only `tokio` runtime in the workspace; every other
//! crate takes an ambient handle rather than spawning its own.

use clap::{Parser, ValueEnum};
use libp2p::Multiaddr;
use nightjar_core::NodeId;
use nightjar_mesh::{MeshConfigBuilder, MeshParticipant};
use nightjar_relay::{NullSink, RelayConfig, RelayServer, ServerMode};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Host,
    Relay,
    Private,
}

impl From<ModeArg> for ServerMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Host => ServerMode::Host,
            ModeArg::Relay => ServerMode::Relay,
            ModeArg::Private => ServerMode::Private,
        }
    }
}

/// A relay mesh node: accepts WebSocket sync clients and, unless running in
/// `private` mode, joins the gossipsub/Kademlia mesh.
#[derive(Parser, Debug)]
#[command(name = "nightjar-node", version)]
struct Cli {
    /// Server mode: `host` persists payloads and joins the mesh, `relay`
    /// joins the mesh without persisting, `private` does neither.
    #[arg(long, env = "NIGHTJAR_MODE", default_value = "host")]
    mode: ModeArg,

    /// The `wss://` endpoint announced in mesh relay-announce messages.
    #[arg(long, env = "PUBLIC_URL")]
    public_url: Option<String>,

    /// Per-room subscriber cap.
    #[arg(long, env = "MAX_PEERS_PER_ROOM", default_value_t = 100)]
    max_peers_per_room: usize,

    /// Address the WebSocket relay server listens on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// TCP port the mesh's libp2p swarm listens on.
    #[arg(long, env = "MESH_LISTEN_PORT", default_value_t = 4001)]
    mesh_port: u16,

    /// Known mesh peer to dial at startup; repeatable. An empty list starts
    /// the node DHT-only, relying on incoming dials or a known `PUBLIC_URL`.
    #[arg(long = "bootstrap")]
    bootstrap: Vec<Multiaddr>,

    /// `tracing_subscriber::EnvFilter` directive string.
    #[arg(long, default_value = "info")]
    log_filter: String,
}

fn init_tracing(log_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_filter);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "fatal startup error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mode: ServerMode = cli.mode.into();
    let node_id = NodeId::generate();

    let mesh = if mode.participates_in_mesh() {
        let mut mesh_config = MeshConfigBuilder::new()
            .listen_port(cli.mesh_port)
            .bootstrap_peers(cli.bootstrap)
            .relay_mode(matches!(mode, ServerMode::Relay | ServerMode::Host))
            .announce_workspaces(mode.persists_payloads());
        if let Some(url) = &cli.public_url {
            mesh_config = mesh_config.public_url(url.clone());
        }
        let mut participant = MeshParticipant::new(node_id, env!("CARGO_PKG_VERSION"), mesh_config.build());
        participant.start().await?;
        info!(node_id = %node_id, "mesh participant joined the DHT");
        Some(Arc::new(participant))
    } else {
        info!("private mode: not joining the mesh");
        None
    };

    let mut relay_config = RelayConfig::new(mode, cli.bind).with_max_peers_per_room(cli.max_peers_per_room);
    if let Some(url) = cli.public_url {
        relay_config = relay_config.with_public_url(url);
    }

    let server = Arc::new(RelayServer::new(relay_config, mesh, Arc::new(NullSink)));
    let run_handle = Arc::clone(&server);
    let server_task = tokio::spawn(async move {
        if let Err(err) = run_handle.run().await {
            error!(error = %err, "relay server exited with an error");
        }
    });

    nightjar_kernel::graceful_shutdown(None, || async {
        server.shutdown().await;
    })
    .await;

    server_task.await.ok();
    Ok(())
}
