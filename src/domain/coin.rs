use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An indivisible unit of currency. `transaction_id` always points at the
/// transaction whose `outputs` minted it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coin {
    pub uuid: Uuid,
    pub transaction_id: Uuid,
    pub value: u64,
}

impl Coin {
    pub fn new(transaction_id: Uuid, value: u64) -> Self {
        Coin {
            uuid: Uuid::new_v4(),
            transaction_id,
            value,
        }
    }

    /// Used by callers (e.g. `benchmark_initialize`) that need a
    /// deterministic coin id rather than a fresh random one.
    pub fn with_uuid(uuid: Uuid, transaction_id: Uuid, value: u64) -> Self {
        Coin {
            uuid,
            transaction_id,
            value,
        }
    }
}

impl PartialOrd for Coin {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Coin {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

/// The reward coin minted for a block's miner. Unlike an ordinary `Coin`
/// its value is mutated in place while the block is being mined, as
/// reward-sink outputs from newly folded-in transactions are added to it
/// (§4.7). It is promoted to a plain, immutable `Coin` the moment the
/// block is committed.
#[derive(Debug, Clone)]
pub struct RewardCoin {
    inner: Coin,
}

impl RewardCoin {
    pub fn new(transaction_id: Uuid, value: u64) -> Self {
        RewardCoin {
            inner: Coin::new(transaction_id, value),
        }
    }

    pub fn value(&self) -> u64 {
        self.inner.value
    }

    pub fn add_value(&mut self, delta: u64) {
        self.inner.value += delta;
    }

    pub fn set_transaction_id(&mut self, transaction_id: Uuid) {
        self.inner.transaction_id = transaction_id;
    }

    pub fn into_coin(self) -> Coin {
        self.inner
    }

    pub fn as_coin(&self) -> &Coin {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coins_order_by_value() {
        let tx = Uuid::new_v4();
        let a = Coin::new(tx, 3);
        let b = Coin::new(tx, 7);
        assert!(a < b);
    }

    #[test]
    fn reward_coin_accumulates() {
        let mut rc = RewardCoin::new(Uuid::new_v4(), 5);
        rc.add_value(2);
        rc.add_value(1);
        assert_eq!(rc.value(), 8);
    }
}
