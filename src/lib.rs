pub mod config;
pub mod domain;
pub mod error;
pub mod miner;
pub mod network;
pub mod node;

pub use config::Config;
pub use error::{NodeError, Result};
pub use node::NodeState;
