use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use p2p_ledger_node::config::{Config, DEFAULT_WORKER_POOL_SIZE};
use p2p_ledger_node::network::{MultipleConnectionHandler, run_node_server};
use p2p_ledger_node::node::NodeState;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    prelude::*,
};
use uuid::Uuid;

/// A single peer node (§6 CLI collaborator).
#[derive(Debug, Parser)]
#[command(name = "p2p-ledger-node")]
struct Opt {
    /// Address to listen on and advertise to peers.
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(long)]
    port: u16,

    /// This node's identity. Generated if omitted.
    #[arg(long)]
    node_id: Option<Uuid>,

    /// Path to the `config.ini`-style file holding the mining difficulty.
    #[arg(long, default_value = "config.ini")]
    config: PathBuf,

    /// Number of worker threads draining the task queue.
    #[arg(long, default_value_t = DEFAULT_WORKER_POOL_SIZE)]
    worker_pool_size: usize,

    /// Disable the dedicated mining thread on this node.
    #[arg(long)]
    no_mine: bool,

    /// Wait for a `benchmark_initialize` RPC before mining the first block.
    #[arg(long)]
    benchmark: bool,

    /// Peers to register with at startup, as `host:port`.
    #[arg(long = "peer")]
    peers: Vec<SocketAddr>,

    /// Verbose (debug-level) logging.
    #[arg(long)]
    debug: bool,
}

fn initialize_logging(debug: bool) {
    let default_level = if debug { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(filter))
        .init();
}

/// Tells every peer supplied on the command line about ourselves and
/// records them locally (§4.5's register_nodes, run once at startup
/// rather than over the wire).
fn announce_to_initial_peers(state: &Arc<NodeState>) {
    if state.config.peers.is_empty() {
        return;
    }
    state.peers.add_nodes(&state.config.peers);
    let host = state.config.bind_addr.ip().to_string();
    let port = state.config.bind_addr.port();
    let handler = MultipleConnectionHandler::new(state.config.peers.clone());
    handler.send_wout_response(&json!({
        "action": "register_nodes",
        "params": [[[host, port]]],
    }));
}

fn main() {
    let opt = Opt::parse();
    initialize_logging(opt.debug);

    let bind_addr = SocketAddr::new(opt.host, opt.port);
    let node_id = opt.node_id.unwrap_or_else(Uuid::new_v4);
    let config = Config::load(
        &opt.config,
        bind_addr,
        node_id,
        opt.worker_pool_size,
        !opt.no_mine,
        opt.benchmark,
        opt.peers,
    );

    info!("starting node {node_id} at {bind_addr} (difficulty={})", config.difficulty);
    let state = NodeState::new(config);

    announce_to_initial_peers(&state);

    if state.config.is_miner {
        let miner_state = state.clone();
        thread::spawn(move || p2p_ledger_node::miner::run_miner(miner_state));
    }

    if let Err(e) = run_node_server(state) {
        error!("node server exited: {e}");
        std::process::exit(1);
    }
}
