use std::net::SocketAddr;
use std::sync::Arc;

use p2p_ledger_node::config::Config;
use p2p_ledger_node::node::NodeState;
use uuid::Uuid;

/// A node bound to `addr`, mining disabled, zero difficulty, with an
/// optional set of peers -- the baseline fixture integration tests start
/// a real server from.
pub fn node_bound_to(addr: SocketAddr, peers: Vec<SocketAddr>) -> Arc<NodeState> {
    let config = Config::load(
        std::path::Path::new("/nonexistent/config.ini"),
        addr,
        Uuid::new_v4(),
        2,
        false,
        false,
        peers,
    );
    NodeState::new(config)
}
