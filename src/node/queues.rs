use std::net::{SocketAddr, TcpStream};

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde_json::Value;

use crate::domain::{Block, Transaction};

/// One decoded request waiting for a worker: the action name, its
/// params, and the connection to reply on.
pub struct TaskItem {
    pub action: String,
    pub params: Value,
    pub conn: TcpStream,
}

/// A verified transaction waiting to be folded into the in-progress
/// reward and forwarded to peers.
pub struct TransItem {
    pub tx: Transaction,
}

/// A block received from a peer, tagged with the address it came from so
/// fork resolution knows who to ask for more history.
pub struct BlockItem {
    pub origin: SocketAddr,
    pub block: Block,
}

/// The three unbounded FIFO queues shared between the acceptor, the
/// worker pool, and the miner (§5). `crossbeam_channel`'s MPMC channel is
/// used because `tasks` has one producer and many consumers (the worker
/// pool) -- `std::sync::mpsc` only supports a single consumer.
pub struct Queues {
    tasks_tx: Sender<TaskItem>,
    tasks_rx: Receiver<TaskItem>,
    trans_tx: Sender<TransItem>,
    trans_rx: Receiver<TransItem>,
    blocks_tx: Sender<BlockItem>,
    blocks_rx: Receiver<BlockItem>,
}

impl Queues {
    pub fn new() -> Self {
        let (tasks_tx, tasks_rx) = unbounded();
        let (trans_tx, trans_rx) = unbounded();
        let (blocks_tx, blocks_rx) = unbounded();
        Queues {
            tasks_tx,
            tasks_rx,
            trans_tx,
            trans_rx,
            blocks_tx,
            blocks_rx,
        }
    }

    pub fn push_task(&self, item: TaskItem) {
        let _ = self.tasks_tx.send(item);
    }

    pub fn task_receiver(&self) -> Receiver<TaskItem> {
        self.tasks_rx.clone()
    }

    pub fn push_trans(&self, tx: Transaction) {
        let _ = self.trans_tx.send(TransItem { tx });
    }

    /// Drains everything currently buffered without blocking.
    pub fn drain_trans(&self) -> Vec<TransItem> {
        self.trans_rx.try_iter().collect()
    }

    pub fn push_block(&self, origin: SocketAddr, block: Block) {
        let _ = self.blocks_tx.send(BlockItem { origin, block });
    }

    pub fn drain_blocks(&self) -> Vec<BlockItem> {
        self.blocks_rx.try_iter().collect()
    }
}

impl Default for Queues {
    fn default() -> Self {
        Self::new()
    }
}
