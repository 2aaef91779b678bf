use std::collections::HashMap;

use uuid::Uuid;

use super::coin::Coin;
use super::transaction::Transaction;
use super::wallet::Wallet;
use crate::error::{NodeError, Result};

/// Canonical view of every coin and transaction this node has ever
/// accepted, plus its own spendable coin set. Historically a process-wide
/// singleton (`History()` in the original); here it is owned, node-scoped
/// state reached through [`crate::node::NodeState`] and guarded by the
/// ledger's single lock (§5) rather than a module-level global.
#[derive(Debug, Clone)]
pub struct History {
    node_id: Uuid,
    coins: HashMap<Uuid, Coin>,
    transactions: HashMap<Uuid, Transaction>,
    wallet: Wallet,
}

impl History {
    pub fn new(node_id: Uuid) -> Self {
        History {
            node_id,
            coins: HashMap::new(),
            transactions: HashMap::new(),
            wallet: Wallet::new(),
        }
    }

    pub fn node_id(&self) -> Uuid {
        self.node_id
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn wallet_mut(&mut self) -> &mut Wallet {
        &mut self.wallet
    }

    pub fn get_coin(&self, uuid: &Uuid) -> Option<&Coin> {
        self.coins.get(uuid)
    }

    pub fn get_transaction(&self, uuid: &Uuid) -> Option<&Transaction> {
        self.transactions.get(uuid)
    }

    pub fn add_coin(&mut self, coin: Coin) {
        self.coins.insert(coin.uuid, coin);
    }

    pub fn remove_coin(&mut self, uuid: &Uuid) -> Option<Coin> {
        self.coins.remove(uuid)
    }

    /// Records `tx` and applies its wallet-side effects: outputs addressed
    /// to this node are added to the wallet; if this node is the sender,
    /// its spent inputs are removed from the wallet.
    pub fn add_transaction(&mut self, tx: Transaction) {
        let self_id = self.node_id.to_string();
        for (recipient, coins) in &tx.outputs {
            if recipient == &self_id {
                for coin in coins {
                    self.wallet.add_coin(coin.clone());
                }
            }
        }
        if tx.sender == self_id {
            for coin in &tx.inputs {
                self.wallet.remove_coin(&coin.uuid);
            }
        }
        self.transactions.insert(tx.uuid, tx);
    }

    /// Inverse of [`History::add_transaction`], used during fork rollback.
    pub fn remove_transaction(&mut self, uuid: &Uuid) -> Option<Transaction> {
        let tx = self.transactions.remove(uuid)?;
        let self_id = self.node_id.to_string();
        if tx.sender == self_id {
            for coin in &tx.inputs {
                self.wallet.add_coin(coin.clone());
            }
        }
        for (recipient, coins) in &tx.outputs {
            if recipient == &self_id {
                for coin in coins {
                    self.wallet.remove_coin(&coin.uuid);
                }
            }
        }
        Some(tx)
    }

    pub fn transaction_exists(&self, uuid: &Uuid) -> bool {
        self.transactions.contains_key(uuid)
    }

    /// Deep, self-consistent snapshot for speculative fork rollback (§4.9).
    pub fn get_copy(&self) -> History {
        self.clone()
    }

    /// Commits a previously prepared snapshot atomically.
    pub fn replace_history(&mut self, snapshot: History) {
        *self = snapshot;
    }

    /// Clears all state; used by benchmark mode and tests.
    pub fn reset(&mut self) {
        self.coins.clear();
        self.transactions.clear();
        self.wallet = Wallet::new();
    }
}

/// The shared verification + commit pipeline behind both `new_transaction`
/// (§4.6) and ordinary block verification (§4.8):
///
/// 1. no prior transaction with the same uuid;
/// 2. every input coin is present in history with a matching
///    `(value, transaction_id)`;
/// 3. no output coin already exists in history;
/// 4. `tx.verify(history)` (value equation + ownership + output provenance).
///
/// On success, input coins are removed from history, output coins are
/// added, and the transaction is recorded.
pub fn verify_and_accept_transaction(history: &mut History, tx: Transaction) -> Result<()> {
    if history.transaction_exists(&tx.uuid) {
        return Err(NodeError::VerificationFailed);
    }

    for coin in &tx.inputs {
        match history.get_coin(&coin.uuid) {
            Some(existing)
                if existing.value == coin.value && existing.transaction_id == coin.transaction_id => {}
            _ => return Err(NodeError::VerificationFailed),
        }
    }

    for coin in tx.all_outputs() {
        if history.get_coin(&coin.uuid).is_some() {
            return Err(NodeError::VerificationFailed);
        }
    }

    tx.verify(history)?;

    for coin in &tx.inputs {
        history.remove_coin(&coin.uuid);
    }
    let new_coins: Vec<Coin> = tx.all_outputs().cloned().collect();
    for coin in new_coins {
        history.add_coin(coin);
    }
    history.add_transaction(tx);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    /// Seeds `history` with a coin of `value` owned by `owner`, minted by a
    /// fabricated prior transaction, so later spends of it pass ownership
    /// checks. Returns the spendable coin.
    fn seed_owned_coin(history: &mut History, owner: Uuid, value: u64) -> Coin {
        let mint_tx_uuid = Uuid::new_v4();
        let coin = Coin::new(mint_tx_uuid, value);
        let mut outputs = Map::new();
        outputs.insert(owner.to_string(), vec![coin.clone()]);
        let mint_tx = Transaction {
            uuid: mint_tx_uuid,
            timestamp: chrono::Utc::now(),
            sender: super::super::transaction::SYSTEM_SENDER.to_string(),
            inputs: vec![],
            outputs,
            input_value: 0,
            output_value: value,
            reward_value: 0,
        };
        history.add_coin(coin.clone());
        history.add_transaction(mint_tx);
        coin
    }

    fn ordinary_transaction(spendable: &Coin, sender: Uuid, recipient: Uuid, value: u64) -> Transaction {
        let tx_uuid = Uuid::new_v4();
        let mut outputs = Map::new();
        outputs.insert(recipient.to_string(), vec![Coin::new(tx_uuid, value)]);
        outputs.insert(super::super::transaction::SYSTEM_SENDER.to_string(), vec![Coin::new(tx_uuid, 0)]);
        Transaction {
            uuid: tx_uuid,
            timestamp: chrono::Utc::now(),
            sender: sender.to_string(),
            inputs: vec![spendable.clone()],
            outputs,
            input_value: value,
            output_value: value,
            reward_value: 0,
        }
    }

    #[test]
    fn accept_transaction_moves_coins_and_updates_wallet() {
        let me = Uuid::new_v4();
        let mut history = History::new(me);
        let spendable = seed_owned_coin(&mut history, me, 4);
        let tx = ordinary_transaction(&spendable, me, Uuid::new_v4(), 4);

        verify_and_accept_transaction(&mut history, tx.clone()).unwrap();

        assert!(history.get_coin(&spendable.uuid).is_none());
        assert!(history.transaction_exists(&tx.uuid));
    }

    #[test]
    fn duplicate_uuid_rejected() {
        let me = Uuid::new_v4();
        let mut history = History::new(me);
        let spendable = seed_owned_coin(&mut history, me, 4);
        let tx = ordinary_transaction(&spendable, me, Uuid::new_v4(), 4);
        verify_and_accept_transaction(&mut history, tx.clone()).unwrap();

        let other_spendable = seed_owned_coin(&mut history, me, 1);
        let mut tx2 = ordinary_transaction(&other_spendable, me, Uuid::new_v4(), 1);
        tx2.uuid = tx.uuid;
        assert!(verify_and_accept_transaction(&mut history, tx2).is_err());
    }
}
