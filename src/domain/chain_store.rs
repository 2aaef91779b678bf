use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::block::Block;
use super::canonical::canonical_json;
use super::transaction::Transaction;
use crate::error::Result;

/// Ordered chain of blocks, the pool of transactions waiting for the next
/// mined block (slot 0 reserved for the in-progress reward), and a
/// monotonic version counter used to invalidate in-flight pagination
/// (§4.5). Operations here are not individually thread-safe; callers hold
/// the ledger lock for the duration of any mutation (§5).
#[derive(Debug, Clone)]
pub struct ChainStore {
    blocks: Vec<Block>,
    current_transactions: Vec<Transaction>,
    version_number: u64,
}

impl ChainStore {
    pub fn new() -> Self {
        ChainStore {
            blocks: vec![Block::genesis()],
            current_transactions: Vec::new(),
            version_number: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut Vec<Block> {
        &mut self.blocks
    }

    /// Replaces the chain wholesale (fork resolution, §4.9) and bumps the
    /// version number so in-flight pagination readers restart.
    pub fn replace_blocks(&mut self, blocks: Vec<Block>) {
        self.blocks = blocks;
        self.increment_version_number();
    }

    pub fn current_transactions(&self) -> &[Transaction] {
        &self.current_transactions
    }

    pub fn last_block(&self) -> &Block {
        self.blocks.last().expect("chain always has at least the genesis block")
    }

    pub fn last_block_index(&self) -> u64 {
        self.last_block().index
    }

    /// 1-indexed, matching `Block::index`.
    pub fn get_block(&self, index: u64) -> Option<&Block> {
        if index == 0 {
            return None;
        }
        self.blocks.get((index - 1) as usize)
    }

    /// Builds a block from the current pending transactions, clears the
    /// pool, and appends it to the chain.
    pub fn new_block(&mut self, proof: u64, previous_hash: String, timestamp: DateTime<Utc>) -> Block {
        let index = self.blocks.len() as u64 + 1;
        let transactions = std::mem::take(&mut self.current_transactions);
        let block = Block::new(index, timestamp, transactions, proof, previous_hash);
        self.blocks.push(block.clone());
        block
    }

    /// Appends an externally constructed block (e.g. from a peer) without
    /// touching the pending-transaction pool.
    pub fn add_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Appends `tx` to the pool, returning the index the next mined block
    /// will have.
    pub fn new_transaction(&mut self, tx: Transaction) -> u64 {
        self.current_transactions.push(tx);
        self.last_block_index() + 1
    }

    /// Installs (or overwrites) the in-progress reward transaction at pool
    /// slot 0.
    pub fn update_reward(&mut self, reward_tx: Transaction) {
        if self.current_transactions.is_empty() {
            self.current_transactions.push(reward_tx);
        } else {
            self.current_transactions[0] = reward_tx;
        }
    }

    pub fn clear_current_transactions(&mut self) {
        self.current_transactions.clear();
    }

    pub fn get_version_number(&self) -> u64 {
        self.version_number
    }

    pub fn increment_version_number(&mut self) {
        self.version_number += 1;
    }

    /// The proof-of-work rule (§4.4): serialize
    /// `{last_proof}{proof}{last_hash}{current_transactions}` (transactions
    /// given here must already exclude the reward), SHA-256 it, and require
    /// `difficulty` leading hex zeros.
    pub fn valid_proof(
        last_proof: u64,
        proof: u64,
        last_hash: &str,
        current_transactions: &[Transaction],
        difficulty: u32,
    ) -> Result<bool> {
        let guess_body = format!(
            "{}{}{}{}",
            last_proof,
            proof,
            last_hash,
            canonical_json(&current_transactions)?
        );
        let mut hasher = Sha256::new();
        hasher.update(guess_body.as_bytes());
        let digest = hex::encode(hasher.finalize());
        let prefix_len = difficulty as usize;
        Ok(digest.len() >= prefix_len && digest[..prefix_len.min(digest.len())].chars().all(|c| c == '0'))
    }
}

impl Default for ChainStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_only_chain_has_index_one() {
        let store = ChainStore::new();
        assert_eq!(store.last_block_index(), 1);
        assert_eq!(store.get_block(1).unwrap().index, 1);
        assert!(store.get_block(2).is_none());
        assert!(store.get_block(0).is_none());
    }

    #[test]
    fn new_block_clears_pool_and_advances_index() {
        let mut store = ChainStore::new();
        store.current_transactions.push(sample_tx());
        let block = store.new_block(42, "abc".into(), Utc::now());
        assert_eq!(block.index, 2);
        assert!(store.current_transactions().is_empty());
        assert_eq!(store.last_block_index(), 2);
    }

    #[test]
    fn difficulty_zero_accepts_any_proof() {
        assert!(ChainStore::valid_proof(0, 0, "x", &[], 0).unwrap());
    }

    fn sample_tx() -> Transaction {
        Transaction::new(
            "alice".to_string(),
            vec![],
            std::collections::HashMap::new(),
        )
    }
}
