pub mod benchmark;
pub mod context;
pub mod peers;
pub mod queues;

pub use benchmark::BenchmarkLatch;
pub use context::{Ledger, NodeState};
pub use peers::Nodes;
pub use queues::{BlockItem, Queues, TaskItem, TransItem};
