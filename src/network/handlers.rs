use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};

use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Block, Coin, SYSTEM_SENDER, Transaction, verify_and_accept_transaction};
use crate::error::{NodeError, Result};
use crate::node::{NodeState, TaskItem};

use super::framing::{MultipleConnectionHandler, encode_frame};
use super::resolve;

/// The SHA-1-derived namespace benchmark coin ids are minted under (§8
/// scenario 6: "deterministic UUIDs (SHA-1 of node-id)").
const BENCHMARK_NAMESPACE: Uuid = Uuid::from_bytes([
    0xc4, 0x56, 0x28, 0x9e, 0x1f, 0x3a, 0x4b, 0x0e, 0x9c, 0x77, 0x1f, 0x0e, 0x6b, 0x0b, 0x9a, 0x12,
]);

fn write_json(conn: &mut TcpStream, value: &Value) -> Result<()> {
    use std::io::Write;
    conn.write_all(&encode_frame(value)?)?;
    Ok(())
}

fn peer_addr(host: &str, port: u16) -> Result<SocketAddr> {
    format!("{host}:{port}").parse().map_err(|_| NodeError::InvalidData)
}

fn known_peers(state: &NodeState) -> Vec<SocketAddr> {
    state.peers.get_nodes()
}

/// The single source of truth for what operations exist (§4.2). Unknown
/// actions are the caller's responsibility to reject with `BadRequest`
/// before this is reached.
pub fn dispatch(state: &NodeState, action: &str, params: &Value, conn: &mut TcpStream) -> Result<()> {
    match action {
        "get_chain" => get_chain(state, conn),
        "get_chain_paginated" => get_chain_paginated(state, params, conn),
        "get_block" => get_block(state, params, conn),
        "new_transaction" => new_transaction(state, params, conn),
        "receive_transactions" => receive_transactions(state, params, conn),
        "receive_block" => receive_block(state, params),
        "forward_transaction" => forward_transaction(state, params),
        "forward_block" => forward_block(state, params),
        "register_nodes" => register_nodes(state, params),
        "unregister_nodes" => unregister_nodes(state, params),
        "resolve_conflicts" => resolve_conflicts_rpc(state, conn),
        "resolve_conflicts_internal" => resolve_conflicts_internal_rpc(state, params, conn),
        "get_balance" => get_balance(state, conn),
        "benchmark_initialize" => benchmark_initialize(state, params, conn),
        "wait_test" => wait_test(conn),
        "response_test" => response_test(conn),
        _ => Err(NodeError::BadRequest),
    }
}

fn get_chain(state: &NodeState, conn: &mut TcpStream) -> Result<()> {
    let body = state.with_ledger(|ledger| {
        json!({"chain": ledger.chain.blocks(), "length": ledger.chain.len()})
    });
    write_json(conn, &body)
}

const PAGE_STATUS_INITIAL: &str = "INITIAL";
const PAGE_STATUS_CONTINUE: &str = "CONTINUE";
const PAGE_STATUS_FINISHED: &str = "FINISHED";
const PAGE_STATUS_ERROR: &str = "ERROR";

/// Streams the chain newest-block-first in windows of `size` (§4.5). The
/// connection stays open for the whole exchange; the caller (the worker
/// that accepted it) closes it once this returns. If another thread
/// replaces the chain mid-stream (fork resolution bumping the version
/// number), the walk restarts from the new tail rather than risk reading
/// blocks that no longer exist.
fn get_chain_paginated(state: &NodeState, params: &Value, conn: &mut TcpStream) -> Result<()> {
    use std::io::BufReader;

    let size = params
        .get(0)
        .and_then(Value::as_i64)
        .ok_or(NodeError::InvalidData)?;

    if size < 1 {
        return write_json(conn, &json!({"status": PAGE_STATUS_ERROR}));
    }
    let size = size as usize;

    let mut reader = BufReader::new(conn.try_clone()?);

    'restart: loop {
        let version_at_start = state.with_ledger(|l| l.chain.get_version_number());
        let mut cursor = state.with_ledger(|l| l.chain.len());
        let mut first = true;

        loop {
            let (section, new_cursor) = state.with_ledger(|ledger| {
                let start = cursor.saturating_sub(size);
                let section: Vec<_> = ledger.chain.blocks()[start..cursor].to_vec();
                (section, start)
            });
            let finished = new_cursor == 0;
            let status = if finished {
                PAGE_STATUS_FINISHED
            } else if first {
                PAGE_STATUS_INITIAL
            } else {
                PAGE_STATUS_CONTINUE
            };
            write_json(conn, &json!({"status": status, "section": section}))?;
            if finished {
                return Ok(());
            }
            first = false;
            cursor = new_cursor;

            let reply = super::framing::read_frame(&mut reader)?;
            let message = reply
                .get("params")
                .and_then(|p| p.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("");
            if message == "STOP" {
                return Ok(());
            }

            if state.with_ledger(|l| l.chain.get_version_number()) != version_at_start {
                continue 'restart;
            }
        }
    }
}

fn get_block(state: &NodeState, params: &Value, conn: &mut TcpStream) -> Result<()> {
    let index = params.get(0).and_then(Value::as_u64).ok_or(NodeError::InvalidData)?;
    let block = state.with_ledger(|ledger| ledger.chain.get_block(index).cloned());
    match block {
        Some(b) => write_json(conn, &serde_json::to_value(b)?),
        None => write_json(conn, &json!("Block does not exist")),
    }
}

#[derive(serde::Deserialize)]
struct NewTransactionParams {
    input: u64,
    output: HashMap<String, u64>,
}

fn new_transaction(state: &NodeState, params: &Value, conn: &mut TcpStream) -> Result<()> {
    let request: NewTransactionParams = serde_json::from_value(
        params.get(0).cloned().ok_or(NodeError::InvalidData)?,
    )
    .map_err(|_| NodeError::InvalidData)?;

    let message = build_and_submit_transaction(state, request.input, request.output);
    write_json(conn, &json!([message]))
}

/// §4.6: build the transaction from `input`/`output`, select coins from
/// the wallet, mint the reward-sink and change coins, then hand it to the
/// shared verify+enqueue path.
fn build_and_submit_transaction(
    state: &NodeState,
    input: u64,
    output: HashMap<String, u64>,
) -> String {
    let requested: u64 = output.values().sum();
    if input < requested {
        return NodeError::InvalidData.to_string();
    }
    let reward = input - requested;

    let tx_uuid = Uuid::new_v4();
    let (selected, change, ok) = state.with_ledger(|ledger| ledger.history.wallet_mut().get_coins(input));
    if !ok {
        return NodeError::NotEnoughCoins.to_string();
    }

    let mut outputs: HashMap<String, Vec<Coin>> = HashMap::new();
    for (recipient, value) in &output {
        outputs.entry(recipient.clone()).or_default().push(Coin::new(tx_uuid, *value));
    }
    outputs.entry(SYSTEM_SENDER.to_string()).or_default().push(Coin::new(tx_uuid, reward));
    if change > 0 {
        outputs
            .entry(state.config.node_id.to_string())
            .or_default()
            .push(Coin::new(tx_uuid, change));
    }

    let sender = state.config.node_id.to_string();
    let mut tx = Transaction::new(sender, selected, outputs);
    tx.uuid = tx_uuid;

    submit_verified(state, tx)
}

fn submit_verified(state: &NodeState, tx: Transaction) -> String {
    let reward_inputs: Vec<Coin> = tx
        .outputs
        .get(SYSTEM_SENDER)
        .cloned()
        .unwrap_or_default();

    let result = state.with_ledger(|ledger| {
        verify_and_accept_transaction(&mut ledger.history, tx.clone())?;
        // Reward must land in pool slot 0 *before* this ordinary transaction
        // is pushed: `update_reward` overwrites slot 0 when the pool is
        // already non-empty but falls back to pushing when it's empty, so
        // calling it after `new_transaction` on the first submit of a round
        // would clobber the very transaction just appended.
        ledger.reward_builder.add_new_inputs(&reward_inputs);
        ledger.chain.update_reward(ledger.reward_builder.build());
        ledger.chain.new_transaction(tx.clone());
        Ok::<(), NodeError>(())
    });

    match result {
        Ok(()) => {
            state.queues.push_trans(tx.clone());
            "Transaction added".to_string()
        }
        Err(e) => e.to_string(),
    }
}

fn receive_transactions(state: &NodeState, params: &Value, conn: &mut TcpStream) -> Result<()> {
    let txs = params.get(0).and_then(Value::as_array).ok_or(NodeError::InvalidData)?;
    let mut messages = Vec::with_capacity(txs.len());
    for raw in txs {
        match serde_json::from_value::<Transaction>(raw.clone()) {
            Ok(tx) => messages.push(submit_verified(state, tx)),
            Err(_) => messages.push(NodeError::InvalidData.to_string()),
        }
    }
    write_json(conn, &json!(messages))
}

fn receive_block(state: &NodeState, params: &Value) -> Result<()> {
    let block_json = params.get(0).cloned().ok_or(NodeError::InvalidData)?;
    let block: Block = serde_json::from_value(block_json)?;
    let host = params.get(1).and_then(Value::as_str).ok_or(NodeError::InvalidData)?;
    let port = params.get(2).and_then(Value::as_u64).ok_or(NodeError::InvalidData)? as u16;
    let origin = peer_addr(host, port)?;
    state.queues.push_block(origin, block);
    Ok(())
}

fn forward_transaction(state: &NodeState, params: &Value) -> Result<()> {
    let txs = params.get(0).and_then(Value::as_array).cloned().unwrap_or_default();
    let handler = MultipleConnectionHandler::new(known_peers(state));
    handler.send_wout_response(&json!({"action": "receive_transactions", "params": [txs]}));
    Ok(())
}

fn forward_block(state: &NodeState, params: &Value) -> Result<()> {
    let block = params.get(0).cloned().ok_or(NodeError::InvalidData)?;
    let host = state.config.bind_addr.ip().to_string();
    let port = state.config.bind_addr.port();
    let handler = MultipleConnectionHandler::new(known_peers(state));
    handler.send_wout_response(&json!({"action": "receive_block", "params": [block, host, port]}));
    Ok(())
}

#[derive(serde::Deserialize)]
struct HostPort(String, u16);

fn register_nodes(state: &NodeState, params: &Value) -> Result<()> {
    let raw = params.get(0).and_then(Value::as_array).ok_or(NodeError::InvalidData)?;
    let mut valid = Vec::new();
    for entry in raw {
        match serde_json::from_value::<HostPort>(entry.clone()) {
            Ok(HostPort(host, port)) => match peer_addr(&host, port) {
                Ok(addr) if addr != state.config.bind_addr => valid.push(addr),
                _ => warn!("dropping invalid/self peer entry in register_nodes: {entry}"),
            },
            Err(_) => warn!("dropping malformed peer entry in register_nodes: {entry}"),
        }
    }
    let newly_added = state.peers.add_nodes(&valid);
    if !newly_added.is_empty() {
        let my_host = state.config.bind_addr.ip().to_string();
        let my_port = state.config.bind_addr.port();
        let handler = MultipleConnectionHandler::new(newly_added);
        handler.send_wout_response(&json!({
            "action": "register_nodes",
            "params": [[[my_host, my_port]]],
        }));
    }
    Ok(())
}

fn unregister_nodes(state: &NodeState, params: &Value) -> Result<()> {
    let raw = params.get(0).and_then(Value::as_array).ok_or(NodeError::InvalidData)?;
    let mut addrs = Vec::new();
    for entry in raw {
        if let Ok(HostPort(host, port)) = serde_json::from_value::<HostPort>(entry.clone()) {
            if let Ok(addr) = peer_addr(&host, port) {
                addrs.push(addr);
            }
        }
    }
    state.peers.evict_nodes(&addrs);
    Ok(())
}

fn resolve_conflicts_rpc(state: &NodeState, conn: &mut TcpStream) -> Result<()> {
    let count = resolve::active_resolve_conflicts(state);
    write_json(conn, &json!(count))
}

fn resolve_conflicts_internal_rpc(state: &NodeState, params: &Value, conn: &mut TcpStream) -> Result<()> {
    let req_id: Uuid = params
        .get(0)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .ok_or(NodeError::InvalidData)?;
    let host = params.get(1).and_then(Value::as_str).ok_or(NodeError::InvalidData)?;
    let port = params.get(2).and_then(Value::as_u64).ok_or(NodeError::InvalidData)? as u16;
    let index = params.get(3).and_then(Value::as_u64).ok_or(NodeError::InvalidData)?;
    let requester = peer_addr(host, port)?;

    let count = resolve::propagate_resolve_request(state, req_id, requester, index);
    write_json(conn, &json!(count))
}

fn get_balance(state: &NodeState, conn: &mut TcpStream) -> Result<()> {
    let balance = state.with_ledger(|ledger| ledger.history.wallet().balance());
    write_json(conn, &json!(balance))
}

fn benchmark_initialize(state: &NodeState, params: &Value, conn: &mut TcpStream) -> Result<()> {
    let node_ids = params.get(0).and_then(Value::as_array).ok_or(NodeError::InvalidData)?;
    let value = params.get(1).and_then(Value::as_u64).ok_or(NodeError::InvalidData)?;

    if !state.benchmark.release_once() {
        return write_json(conn, &json!(false));
    }

    let node_ids: Vec<String> = node_ids
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();

    state.with_ledger(|ledger| {
        let seed_uuid = Uuid::new_v4();
        let mut outputs: HashMap<String, Vec<Coin>> = HashMap::new();
        for node_id in &node_ids {
            let coin_uuid = Uuid::new_v5(&BENCHMARK_NAMESPACE, node_id.as_bytes());
            let coin = Coin::with_uuid(coin_uuid, seed_uuid, value);
            ledger.history.add_coin(coin.clone());
            outputs.entry(node_id.clone()).or_default().push(coin);
        }
        let output_value = value * node_ids.len() as u64;
        let seed_tx = Transaction {
            uuid: seed_uuid,
            timestamp: chrono::Utc::now(),
            sender: SYSTEM_SENDER.to_string(),
            inputs: Vec::new(),
            outputs,
            input_value: 0,
            output_value,
            reward_value: 0,
        };
        ledger.history.add_transaction(seed_tx.clone());
        if let Some(genesis) = ledger.chain.blocks_mut().first_mut() {
            genesis.transactions.push(seed_tx);
        }
    });

    info!("benchmark_initialize seeded {} node(s) with {} each", node_ids.len(), value);
    write_json(conn, &json!(true))
}

fn wait_test(conn: &mut TcpStream) -> Result<()> {
    write_json(conn, &json!("waiting"))
}

fn response_test(conn: &mut TcpStream) -> Result<()> {
    write_json(conn, &json!("response"))
}

/// Drains one [`TaskItem`] by dispatching it, writing an error frame on
/// failure, then unconditionally closing the connection (§4.2/§7: the
/// worker owns the connection for the task's lifetime).
pub fn handle_task(state: &NodeState, item: TaskItem) {
    let TaskItem { action, params, mut conn } = item;
    if let Err(e) = dispatch(state, &action, &params, &mut conn) {
        let _ = write_json(&mut conn, &json!(format!("Error: {e}")));
    }
    let _ = conn.shutdown(std::net::Shutdown::Both);
}
