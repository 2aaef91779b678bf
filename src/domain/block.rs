use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::canonical::content_hash;
use super::transaction::Transaction;
use crate::error::Result;

pub const GENESIS_PREVIOUS_HASH: &str = "1";
pub const GENESIS_PROOF: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    /// `transactions[0]` is always the block's reward transaction;
    /// `transactions[1:]` are ordinary (§3).
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

impl Block {
    pub fn new(
        index: u64,
        timestamp: DateTime<Utc>,
        transactions: Vec<Transaction>,
        proof: u64,
        previous_hash: String,
    ) -> Self {
        Block {
            index,
            timestamp,
            transactions,
            proof,
            previous_hash,
        }
    }

    pub fn genesis() -> Self {
        Block {
            index: 1,
            timestamp: DateTime::parse_from_rfc3339("0001-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            transactions: Vec::new(),
            proof: GENESIS_PROOF,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
        }
    }

    /// Canonical content hash, stable under re-serialization.
    pub fn hash(&self) -> Result<String> {
        content_hash(self)
    }

    pub fn reward_transaction(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    pub fn transactions_excluding_reward(&self) -> &[Transaction] {
        if self.transactions.is_empty() {
            &[]
        } else {
            &self.transactions[1..]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_has_fixed_fields() {
        let g = Block::genesis();
        assert_eq!(g.index, 1);
        assert_eq!(g.previous_hash, "1");
        assert_eq!(g.proof, 100);
        assert_eq!(g.timestamp.to_rfc3339(), "0001-01-01T00:00:00+00:00");
    }

    #[test]
    fn hash_is_stable_under_reserialization() {
        let g = Block::genesis();
        let json = serde_json::to_string(&g).unwrap();
        let round_tripped: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(g.hash().unwrap(), round_tripped.hash().unwrap());
    }
}
