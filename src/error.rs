use thiserror::Error;

/// The error type shared across the chain store, history/wallet, the peer
/// RPC layer and the miner. Handlers convert these into the short wire
/// strings of §7 at the RPC boundary; everywhere else the crate propagates
/// `Result<T>` with `?`.
#[derive(Error, Debug)]
pub enum NodeError {
    // -- Recoverable, surfaced on the wire verbatim (see §7) --------------
    #[error("Bad request")]
    BadRequest,

    #[error("invalid data")]
    InvalidData,

    #[error("Not enough coins")]
    NotEnoughCoins,

    #[error("Block does not exist")]
    BlockDoesNotExist,

    #[error("Transaction verification failed")]
    VerificationFailed,

    #[error("duplicate block")]
    DuplicateBlock,

    #[error("bad proof")]
    BadProof,

    #[error("hash mismatch")]
    HashMismatch,

    #[error("fork resolution abandoned: {0}")]
    ResolveAbandoned(String),

    // -- Connection-layer failures -----------------------------------------
    #[error("connection refused: {0}")]
    ConnectionRefused(std::net::SocketAddr),

    #[error("peer closed connection")]
    ConnectionClosed,

    // -- Wrapped lower-level errors -----------------------------------------
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid peer address: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("invalid uuid: {0}")]
    UuidParse(#[from] uuid::Error),
}

pub type Result<T> = std::result::Result<T, NodeError>;
