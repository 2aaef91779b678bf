use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::domain::{ChainStore, RewardTransactionBuilder};
use crate::network::resolve;
use crate::node::NodeState;

/// How long to sleep between proof-of-work attempts when the queues are
/// empty and no proof has been found yet, so the loop yields instead of
/// spinning the core at 100% on a zero-difficulty test network.
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// The mining loop (§4.7). Runs on a dedicated thread for the lifetime of
/// the process when `config.is_miner` is set. In benchmark mode it waits
/// on [`crate::node::BenchmarkLatch`] before starting the first round.
pub fn run_miner(state: Arc<NodeState>) {
    if state.config.benchmark_mode {
        info!("miner waiting for benchmark_initialize");
        state.benchmark.wait();
    }

    loop {
        mine_one_block(&state);
    }
}

fn mine_one_block(state: &NodeState) {
    let node_id = state.config.node_id;
    state.with_ledger(|ledger| ledger.reward_builder = RewardTransactionBuilder::new(node_id));

    let (last_proof, last_hash, difficulty) = state.with_ledger(|ledger| {
        (
            ledger.chain.last_block().proof,
            ledger.chain.last_block().hash().unwrap_or_default(),
            state.config.difficulty,
        )
    });

    let mut proof: u64 = rand::rng().random();

    loop {
        // Already folded into the reward and the pool at submission time
        // by `handlers::submit_verified`; the miner only needs to forward
        // them on to peers.
        let forwardable: Vec<_> = state.queues.drain_trans().into_iter().map(|item| item.tx).collect();
        if !forwardable.is_empty() {
            let handler = crate::network::MultipleConnectionHandler::new(state.peers.get_nodes());
            handler.send_wout_response(&serde_json::json!({
                "action": "receive_transactions",
                "params": [forwardable],
            }));
        }

        let blocks = state.queues.drain_blocks();
        if !blocks.is_empty() {
            let mut adopted_fork = false;
            for item in blocks {
                if try_append_peer_block(state, &item.block) {
                    continue;
                }
                let last_index = state.with_ledger(|l| l.chain.last_block_index());
                if item.block.index > last_index + 1 {
                    match resolve::resolve_with_peer(state, item.origin) {
                        Ok(true) => adopted_fork = true,
                        Ok(false) => {}
                        Err(e) => warn!("could not resolve against {}: {e}", item.origin),
                    }
                }
                // Stale, equal, or already-seen blocks are dropped silently
                // (§4.7 step 3) rather than triggering a resolve walk.
            }
            if adopted_fork {
                // The chain under us changed; forward the new tip (§4.7
                // step 3 / scenario 4) then restart this round against it
                // rather than keep mining on a stale parent.
                let new_tip = state.with_ledger(|l| l.chain.last_block().clone());
                broadcast_block(state, &new_tip);
                return;
            }
        }

        let current_last = state.with_ledger(|l| l.chain.last_block().proof);
        if current_last != last_proof {
            // A block was appended (ours or a peer's) while we were
            // working; the parent we were mining against is stale.
            return;
        }

        let transactions = state.with_ledger(|l| l.chain.current_transactions().to_vec());
        let excluding_reward: Vec<_> = if transactions.is_empty() {
            Vec::new()
        } else {
            transactions[1..].to_vec()
        };

        match ChainStore::valid_proof(last_proof, proof, &last_hash, &excluding_reward, difficulty) {
            Ok(true) => break,
            Ok(false) => proof = proof.wrapping_add(1),
            Err(e) => {
                warn!("proof-of-work digest failed: {e}");
                proof = proof.wrapping_add(1);
            }
        }

        if difficulty == 0 {
            thread::sleep(IDLE_BACKOFF);
        }
    }

    let reward_tx = state.with_ledger(|ledger| ledger.reward_builder.build());
    let mined = state.with_ledger(|ledger| {
        ledger.chain.update_reward(reward_tx);
        let block = ledger.chain.new_block(proof, last_hash, chrono::Utc::now());
        ledger.chain.increment_version_number();
        block
    });

    info!("mined block {} with {} transaction(s)", mined.index, mined.transactions.len());
    broadcast_block(state, &mined);
}

/// Appends a peer-supplied block if it chains onto our current tip and
/// its proof/transactions check out; returns `false` (without mutating
/// anything) if it doesn't fit, which should trigger fork resolution.
/// Transactions are replayed against a scratch copy of history first so a
/// mid-block verification failure never leaves a partial mutation behind
/// (§4.8: "If any check fails, do not mutate state").
fn try_append_peer_block(state: &NodeState, block: &crate::domain::Block) -> bool {
    state.with_ledger(|ledger| {
        let expected_index = ledger.chain.last_block_index() + 1;
        if block.index != expected_index {
            return false;
        }
        let expected_previous = match ledger.chain.last_block().hash() {
            Ok(h) => h,
            Err(_) => return false,
        };
        if block.previous_hash != expected_previous {
            return false;
        }
        let valid = ChainStore::valid_proof(
            ledger.chain.last_block().proof,
            block.proof,
            &block.previous_hash,
            block.transactions_excluding_reward(),
            state.config.difficulty,
        )
        .unwrap_or(false);
        if !valid {
            return false;
        }

        let mut scratch = ledger.history.get_copy();
        for tx in &block.transactions {
            let result = if tx.is_reward() {
                if scratch.transaction_exists(&tx.uuid) {
                    Err(crate::error::NodeError::DuplicateBlock)
                } else {
                    for coin in tx.all_outputs() {
                        scratch.add_coin(coin.clone());
                    }
                    scratch.add_transaction(tx.clone());
                    Ok(())
                }
            } else {
                crate::domain::verify_and_accept_transaction(&mut scratch, tx.clone())
            };
            if result.is_err() {
                return false;
            }
        }

        ledger.history.replace_history(scratch);
        ledger.chain.add_block(block.clone());
        ledger.chain.clear_current_transactions();
        true
    })
}

fn broadcast_block(state: &NodeState, block: &crate::domain::Block) {
    let host = state.config.bind_addr.ip().to_string();
    let port = state.config.bind_addr.port();
    let handler = crate::network::MultipleConnectionHandler::new(state.peers.get_nodes());
    handler.send_wout_response(&serde_json::json!({
        "action": "receive_block",
        "params": [block, host, port],
    }));
}
