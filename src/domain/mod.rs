pub mod block;
pub mod canonical;
pub mod chain_store;
pub mod coin;
pub mod history;
pub mod transaction;
pub mod wallet;

pub use block::Block;
pub use canonical::{canonical_json, content_hash};
pub use chain_store::ChainStore;
pub use coin::{Coin, RewardCoin};
pub use history::{History, verify_and_accept_transaction};
pub use transaction::{RewardTransactionBuilder, Transaction, SYSTEM_SENDER};
pub use wallet::Wallet;
