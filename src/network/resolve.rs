use std::net::SocketAddr;

use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Block, ChainStore, History, Transaction, verify_and_accept_transaction};
use crate::error::{NodeError, Result};
use crate::node::NodeState;

use super::framing::{MultipleConnectionHandler, SingleConnectionHandler};

/// Window size used when pulling a peer's chain page by page (§4.9).
const PAGE_SIZE: i64 = 10;

/// Pulls a peer's whole chain through `get_chain_paginated`, reassembling
/// the newest-first windows back into ascending index order.
fn pull_peer_chain(peer: SocketAddr) -> Result<Vec<Block>> {
    let mut handler = SingleConnectionHandler::connect(peer, false)?;
    let mut windows: Vec<Vec<Block>> = Vec::new();

    loop {
        let response = handler.send_with_response(&json!({
            "action": "get_chain_paginated",
            "params": [PAGE_SIZE],
        }))?;
        let status = response.get("status").and_then(Value::as_str).unwrap_or("");
        if status == "ERROR" {
            return Err(NodeError::InvalidData);
        }
        let section: Vec<Block> = serde_json::from_value(
            response.get("section").cloned().unwrap_or(Value::Array(Vec::new())),
        )?;
        windows.push(section);
        if status == "FINISHED" {
            break;
        }
        handler.send_wout_response(&json!({"params": {"message": "ACK"}}))?;
    }

    let mut full = Vec::new();
    for window in windows.into_iter().rev() {
        full.extend(window);
    }
    Ok(full)
}

/// Checks block linkage, proof-of-work, and every ordinary transaction's
/// value equation/ownership against a freshly rebuilt history (§4.8/§4.9).
/// Returns the rebuilt history on success.
fn validate_chain(blocks: &[Block], node_id: Uuid, difficulty: u32) -> Result<History> {
    if blocks.first().map(Block::hash).transpose()? != Some(Block::genesis().hash()?) {
        return Err(NodeError::HashMismatch);
    }

    let mut history = History::new(node_id);
    let mut previous = &blocks[0];

    for (position, block) in blocks.iter().enumerate() {
        if position > 0 {
            if block.previous_hash != previous.hash()? {
                return Err(NodeError::HashMismatch);
            }
            if !ChainStore::valid_proof(
                previous.proof,
                block.proof,
                &block.previous_hash,
                block.transactions_excluding_reward(),
                difficulty,
            )? {
                return Err(NodeError::BadProof);
            }
        }

        for tx in &block.transactions {
            replay_transaction(&mut history, tx)?;
        }
        previous = block;
    }

    Ok(history)
}

/// Applies an already-validated block's transaction into a history being
/// rebuilt from genesis. Reuses the ordinary acceptance pipeline so a
/// replayed chain is held to exactly the rules a live transaction is.
fn replay_transaction(history: &mut History, tx: &Transaction) -> Result<()> {
    if tx.is_reward() {
        // Reward transactions mint new value with no matching input coin
        // recorded in history; record them directly rather than running
        // them through ownership checks meant for ordinary spends.
        if history.transaction_exists(&tx.uuid) {
            return Err(NodeError::VerificationFailed);
        }
        for coin in tx.all_outputs() {
            history.add_coin(coin.clone());
        }
        history.add_transaction(tx.clone());
        return Ok(());
    }
    verify_and_accept_transaction(history, tx.clone())
}

/// The core of §4.9: pull `peer`'s chain, validate it end to end, and
/// adopt it if it is both valid and strictly longer than ours. Pending
/// pool transactions that no longer check out against the new history are
/// dropped rather than carried forward.
pub fn resolve_with_peer(state: &NodeState, peer: SocketAddr) -> Result<bool> {
    let candidate = pull_peer_chain(peer)?;

    let (current_len, node_id, difficulty) =
        state.with_ledger(|l| (l.chain.len(), l.history.node_id(), state.config.difficulty));

    if candidate.len() <= current_len {
        return Ok(false);
    }

    let new_history = validate_chain(&candidate, node_id, difficulty)?;

    state.with_ledger(|ledger| {
        let pending = ledger.chain.current_transactions().to_vec();
        let mut history = new_history;
        let surviving: Vec<Transaction> = pending
            .into_iter()
            .filter(|tx| verify_and_accept_transaction(&mut history, tx.clone()).is_ok())
            .collect();

        ledger.chain.replace_blocks(candidate);
        ledger.history.replace_history(history);
        ledger.chain.clear_current_transactions();
        for tx in surviving {
            ledger.chain.new_transaction(tx);
        }
    });

    info!("adopted longer chain ({} blocks) from {peer}", state.with_ledger(|l| l.chain.len()));
    Ok(true)
}

/// Tries every known peer and keeps whichever resolution actually
/// replaced the chain last (§4.10, the explicit `resolve_conflicts` RPC
/// with no target peer). Returns `true` if any peer's chain was adopted.
fn resolve_against_known_peers(state: &NodeState) -> bool {
    let mut replaced = false;
    for peer in state.peers.get_nodes() {
        match resolve_with_peer(state, peer) {
            Ok(true) => replaced = true,
            Ok(false) => {}
            Err(e) => warn!("resolve against {peer} failed: {e}"),
        }
    }
    replaced
}

/// The active RPC (§4.10): resolve locally against every known peer, then
/// ask each of those peers to do the same against *their* peers, flooding
/// a single request id through the network so no peer repeats the work
/// twice. Returns the total count of nodes (this one included) that ended
/// up adopting a new chain.
pub fn active_resolve_conflicts(state: &NodeState) -> u64 {
    let req_id = Uuid::new_v4();
    state.resolve_requests.lock().insert(req_id);

    let mut count = if resolve_against_known_peers(state) { 1 } else { 0 };

    let my_host = state.config.bind_addr.ip().to_string();
    let my_port = state.config.bind_addr.port();
    let my_index = state.with_ledger(|l| l.chain.last_block_index());

    let handler = MultipleConnectionHandler::new(state.peers.get_nodes());
    let responses = handler.send_with_response(&json!({
        "action": "resolve_conflicts_internal",
        "params": [req_id.to_string(), my_host, my_port, my_index],
    }));
    for response in responses.into_iter().flatten() {
        count += response.as_u64().unwrap_or(0);
    }
    count
}

/// The passive half of §4.10, reached via the `resolve_conflicts_internal`
/// RPC: a peer just told us it may have a longer chain. Resolve against
/// it, then flood the same request id onward to our own peers (excluding
/// the requester) so the check propagates without looping forever.
pub fn propagate_resolve_request(
    state: &NodeState,
    req_id: Uuid,
    requester: SocketAddr,
    _requester_index: u64,
) -> u64 {
    {
        let mut seen = state.resolve_requests.lock();
        if !seen.insert(req_id) {
            return 0;
        }
    }

    let mut count = match resolve_with_peer(state, requester) {
        Ok(true) => 1,
        Ok(false) => 0,
        Err(e) => {
            warn!("resolve against requester {requester} failed: {e}");
            0
        }
    };

    let my_host = state.config.bind_addr.ip().to_string();
    let my_port = state.config.bind_addr.port();
    let my_index = state.with_ledger(|l| l.chain.last_block_index());

    let downstream: Vec<SocketAddr> = state
        .peers
        .get_nodes()
        .into_iter()
        .filter(|addr| *addr != requester)
        .collect();
    let handler = MultipleConnectionHandler::new(downstream);
    let responses = handler.send_with_response(&json!({
        "action": "resolve_conflicts_internal",
        "params": [req_id.to_string(), my_host, my_port, my_index],
    }));
    for response in responses.into_iter().flatten() {
        count += response.as_u64().unwrap_or(0);
    }
    count
}
