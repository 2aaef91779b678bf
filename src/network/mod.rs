pub mod dispatch;
pub mod framing;
pub mod handlers;
pub mod resolve;

pub use dispatch::run_node_server;
pub use framing::{MultipleConnectionHandler, SingleConnectionHandler, encode_frame, read_frame};
