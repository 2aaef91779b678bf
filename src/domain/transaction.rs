use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::coin::{Coin, RewardCoin};
use super::history::History;
use crate::config::REWARD_COIN_VALUE;
use crate::error::{NodeError, Result};

/// Reserved recipient key: outputs keyed by `SYSTEM` are block-reward sink
/// coins and contribute to `reward_value`, never `output_value`.
pub const SYSTEM_SENDER: &str = "SYSTEM";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub uuid: Uuid,
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub inputs: Vec<Coin>,
    pub outputs: HashMap<String, Vec<Coin>>,
    pub input_value: u64,
    pub output_value: u64,
    pub reward_value: u64,
}

impl Transaction {
    pub fn new(sender: String, inputs: Vec<Coin>, outputs: HashMap<String, Vec<Coin>>) -> Self {
        let input_value: u64 = inputs.iter().map(|c| c.value).sum();
        let mut output_value = 0u64;
        let mut reward_value = 0u64;
        for (recipient, coins) in &outputs {
            let sum: u64 = coins.iter().map(|c| c.value).sum();
            if recipient == SYSTEM_SENDER {
                reward_value += sum;
            } else {
                output_value += sum;
            }
        }
        Transaction {
            uuid: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender,
            inputs,
            outputs,
            input_value,
            output_value,
            reward_value,
        }
    }

    pub fn is_reward(&self) -> bool {
        self.sender == SYSTEM_SENDER
    }

    /// Every coin this transaction minted, across all recipients.
    pub fn all_outputs(&self) -> impl Iterator<Item = &Coin> {
        self.outputs.values().flatten()
    }

    /// Checks the value equation and structural invariants (§3):
    /// `input_value == output_value + reward_value` for ordinary
    /// transactions, `input_value + REWARD_COIN_VALUE == output_value +
    /// reward_value` for reward transactions; every output coin's
    /// `transaction_id` equals this transaction's uuid; every input coin
    /// was owned by `sender` in the transaction that minted it.
    pub fn verify(&self, history: &History) -> Result<()> {
        let value_equation_holds = if self.is_reward() {
            self.input_value + REWARD_COIN_VALUE == self.output_value + self.reward_value
        } else {
            self.input_value == self.output_value + self.reward_value
        };
        if !value_equation_holds {
            return Err(NodeError::VerificationFailed);
        }

        for coin in self.all_outputs() {
            if coin.transaction_id != self.uuid {
                return Err(NodeError::VerificationFailed);
            }
        }

        for coin in &self.inputs {
            if !self.check_coin(history, &self.sender, coin) {
                return Err(NodeError::VerificationFailed);
            }
        }

        Ok(())
    }

    /// True iff `coin` was minted to `owner` by the transaction recorded
    /// under `coin.transaction_id` in `history`.
    fn check_coin(&self, history: &History, owner: &str, coin: &Coin) -> bool {
        match history.get_transaction(&coin.transaction_id) {
            Some(origin) => origin
                .outputs
                .get(owner)
                .is_some_and(|coins| coins.iter().any(|c| c.uuid == coin.uuid && c.value == coin.value)),
            None => false,
        }
    }
}

/// The in-progress reward transaction under construction while a block is
/// being mined. Kept as a distinct mutable type (per the spec's design
/// notes) rather than mutating a committed `Transaction` in place: the
/// committed form is only produced once, at `build()`, right before the
/// block is finalized.
#[derive(Debug, Clone)]
pub struct RewardTransactionBuilder {
    miner: Uuid,
    inputs: Vec<Coin>,
    reward_coin: RewardCoin,
}

impl RewardTransactionBuilder {
    pub fn new(miner: Uuid) -> Self {
        RewardTransactionBuilder {
            miner,
            inputs: Vec::new(),
            reward_coin: RewardCoin::new(Uuid::nil(), REWARD_COIN_VALUE),
        }
    }

    /// Folds reward-sink (`SYSTEM`-keyed) output coins from a newly
    /// accepted transaction into this reward, growing its value.
    pub fn add_new_inputs(&mut self, coins: &[Coin]) {
        for coin in coins {
            self.reward_coin.add_value(coin.value);
            self.inputs.push(coin.clone());
        }
    }

    pub fn reset(&mut self, miner: Uuid) {
        self.miner = miner;
        self.inputs.clear();
        self.reward_coin = RewardCoin::new(Uuid::nil(), REWARD_COIN_VALUE);
    }

    pub fn inputs(&self) -> &[Coin] {
        &self.inputs
    }

    pub fn reward_value(&self) -> u64 {
        self.reward_coin.value()
    }

    /// Produces the immutable, committed reward `Transaction`.
    pub fn build(&self) -> Transaction {
        let uuid = Uuid::new_v4();
        let mut reward_coin = self.reward_coin.clone();
        reward_coin.set_transaction_id(uuid);
        let mut outputs = HashMap::new();
        outputs.insert(self.miner.to_string(), vec![reward_coin.into_coin()]);

        let input_value: u64 = self.inputs.iter().map(|c| c.value).sum();
        let output_value = input_value + REWARD_COIN_VALUE;

        Transaction {
            uuid,
            timestamp: Utc::now(),
            sender: SYSTEM_SENDER.to_string(),
            inputs: self.inputs.clone(),
            outputs,
            input_value,
            output_value,
            reward_value: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ordinary(sender: Uuid, recipient: Uuid) -> Transaction {
        let tx_uuid = Uuid::new_v4();
        let mut outputs = HashMap::new();
        outputs.insert(recipient.to_string(), vec![Coin::new(tx_uuid, 1)]);
        outputs.insert(SYSTEM_SENDER.to_string(), vec![Coin::new(tx_uuid, 0)]);
        Transaction {
            uuid: tx_uuid,
            timestamp: Utc::now(),
            sender: sender.to_string(),
            inputs: vec![],
            outputs,
            input_value: 1,
            output_value: 1,
            reward_value: 0,
        }
    }

    #[test]
    fn value_equation_rejects_imbalance() {
        let history = History::new(Uuid::new_v4());
        let mut tx = sample_ordinary(Uuid::new_v4(), Uuid::new_v4());
        tx.output_value = 2;
        assert!(tx.verify(&history).is_err());
    }

    #[test]
    fn reward_builder_accumulates_and_builds() {
        let miner = Uuid::new_v4();
        let mut builder = RewardTransactionBuilder::new(miner);
        let tx_id = Uuid::new_v4();
        builder.add_new_inputs(&[Coin::new(tx_id, 3), Coin::new(tx_id, 2)]);
        assert_eq!(builder.reward_value(), REWARD_COIN_VALUE + 5);

        let committed = builder.build();
        assert_eq!(committed.input_value, 5);
        assert_eq!(committed.output_value, 5 + REWARD_COIN_VALUE);
        assert_eq!(committed.reward_value, 0);
        assert!(committed.is_reward());
    }
}
