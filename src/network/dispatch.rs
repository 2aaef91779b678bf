use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

use tracing::{error, info, warn};

use crate::error::{NodeError, Result};
use crate::node::{NodeState, TaskItem};

use super::framing::read_frame;
use super::handlers::handle_task;

/// Binds the node's listening socket, spawns the fixed worker pool, and
/// accepts connections serially, handing each off to the task queue
/// (§4.1/§4.2). Blocks the calling thread for the life of the process.
pub fn run_node_server(state: Arc<NodeState>) -> Result<()> {
    let listener = TcpListener::bind(state.config.bind_addr).map_err(NodeError::Io)?;
    info!("listening on {}", state.config.bind_addr);

    for _ in 0..state.config.worker_pool_size {
        spawn_worker(state.clone());
    }

    for incoming in listener.incoming() {
        let mut conn = match incoming {
            Ok(conn) => conn,
            Err(e) => {
                warn!("failed to accept connection: {e}");
                continue;
            }
        };

        let request = match read_frame(&mut std::io::BufReader::new(&mut conn)) {
            Ok(request) => request,
            Err(e) => {
                warn!("dropping connection with malformed request: {e}");
                continue;
            }
        };

        let action = request.get("action").and_then(|v| v.as_str()).map(str::to_string);
        let params = request.get("params").cloned().unwrap_or(serde_json::Value::Array(Vec::new()));

        match action {
            Some(action) => state.queues.push_task(TaskItem { action, params, conn }),
            None => warn!("dropping request with no action field"),
        }
    }

    Ok(())
}

/// One worker thread: pulls tasks off the shared queue forever, each one
/// dispatched and closed before the next is taken (§4.2).
fn spawn_worker(state: Arc<NodeState>) {
    let receiver = state.queues.task_receiver();
    thread::spawn(move || {
        for item in receiver.iter() {
            handle_task(&state, item);
        }
        error!("worker thread exiting: task queue closed");
    });
}
