use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;

use p2p_ledger_node::network::{SingleConnectionHandler, run_node_server};
use p2p_ledger_node::node::NodeState;
use serde_json::json;

mod test_helpers;

/// Reserves an ephemeral port by binding then immediately dropping a
/// listener, so the real node server can be told exactly which address
/// to bind to before it starts.
fn reserve_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Spawns a node's full acceptor + worker pool on a background thread and
/// returns a client handler connected to it.
fn spawn_node(state: Arc<NodeState>) {
    thread::spawn(move || {
        let _ = run_node_server(state);
    });
    // Give the listener a moment to bind before the first connection.
    thread::sleep(std::time::Duration::from_millis(50));
}

fn request(addr: SocketAddr, action: &str, params: serde_json::Value) -> serde_json::Value {
    let mut client = SingleConnectionHandler::connect(addr, true).unwrap();
    client
        .send_with_response(&json!({"action": action, "params": params}))
        .unwrap()
}

#[test]
fn get_chain_starts_at_genesis_only() {
    let addr = reserve_addr();
    let node = test_helpers::node_bound_to(addr, vec![]);
    spawn_node(node);

    let response = request(addr, "get_chain", json!([]));
    assert_eq!(response["length"], 1);
}

#[test]
fn benchmark_initialize_seeds_balance_exactly_once() {
    let addr = reserve_addr();
    let node = test_helpers::node_bound_to(addr, vec![]);
    spawn_node(node);

    let node_id = "benchmark-peer";
    let first = request(addr, "benchmark_initialize", json!([[node_id], 50]));
    assert_eq!(first, json!(true));

    let balance = request(addr, "get_balance", json!([]));
    // The seed coin is minted to the literal node-id string supplied, not
    // to this node's own identity, so this node's own wallet stays empty.
    assert_eq!(balance, json!(0));

    let second = request(addr, "benchmark_initialize", json!([[node_id], 50]));
    assert_eq!(second, json!(false));
}

#[test]
fn new_transaction_rejects_insufficient_funds() {
    let addr = reserve_addr();
    let node = test_helpers::node_bound_to(addr, vec![]);
    spawn_node(node);

    let response = request(
        addr,
        "new_transaction",
        json!([{"input": 100, "output": {"someone": 10}}]),
    );
    assert_eq!(response[0], "Not enough coins");
}

#[test]
fn get_chain_paginated_walks_down_to_genesis() {
    let addr = reserve_addr();
    let node = test_helpers::node_bound_to(addr, vec![]);
    spawn_node(node);

    let mut client = SingleConnectionHandler::connect(addr, false).unwrap();
    let first = client
        .send_with_response(&json!({"action": "get_chain_paginated", "params": [10]}))
        .unwrap();
    assert_eq!(first["status"], "FINISHED");
    let section = first["section"].as_array().unwrap();
    assert_eq!(section.len(), 1);
}

#[test]
fn get_balance_is_zero_for_a_fresh_node() {
    let addr = reserve_addr();
    let node = test_helpers::node_bound_to(addr, vec![]);
    spawn_node(node);

    let balance = request(addr, "get_balance", json!([]));
    assert_eq!(balance, json!(0));
}
