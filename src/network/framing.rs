use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{NodeError, Result};

/// Every message on the wire is `<ascii-decimal byte-length>"~"<utf-8
/// JSON>` (§6). `PEER_TIMEOUT` is the "generous read/write timeout" asked
/// for by the open question in §9 (no specific value was prescribed).
const PEER_TIMEOUT: Duration = Duration::from_secs(5);

pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(value)?;
    let mut framed = format!("{}~", body.len()).into_bytes();
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Reads one `<size>"~"<json>` frame from `reader`, looping until the
/// full body has been consumed (§4.1 tolerates short reads).
pub fn read_frame<R: BufRead>(reader: &mut R) -> Result<Value> {
    let mut size_buf = Vec::new();
    let read = reader
        .read_until(b'~', &mut size_buf)
        .map_err(NodeError::Io)?;
    if read == 0 {
        return Err(NodeError::ConnectionClosed);
    }
    if size_buf.last() == Some(&b'~') {
        size_buf.pop();
    }
    let size: usize = std::str::from_utf8(&size_buf)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or(NodeError::InvalidData)?;

    let mut body = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = reader.read(&mut body[filled..]).map_err(NodeError::Io)?;
        if n == 0 {
            return Err(NodeError::ConnectionClosed);
        }
        filled += n;
    }
    Ok(serde_json::from_slice(&body)?)
}

fn configure_stream(stream: &TcpStream) -> Result<()> {
    stream.set_read_timeout(Some(PEER_TIMEOUT))?;
    stream.set_write_timeout(Some(PEER_TIMEOUT))?;
    Ok(())
}

/// A single outbound peer connection. Holds the stream open across
/// multiple request/response round-trips when `close` is `false`, which
/// `get_chain_paginated`'s ACK/STOP exchange and `resolve_conflicts`
/// (§4.9) rely on.
pub struct SingleConnectionHandler {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    close: bool,
}

impl SingleConnectionHandler {
    pub fn connect(addr: SocketAddr, close: bool) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, PEER_TIMEOUT)
            .map_err(|_| NodeError::ConnectionRefused(addr))?;
        configure_stream(&stream)?;
        let writer = stream.try_clone().map_err(NodeError::Io)?;
        Ok(SingleConnectionHandler {
            reader: BufReader::new(stream),
            writer,
            close,
        })
    }

    pub fn from_stream(stream: TcpStream, close: bool) -> Result<Self> {
        configure_stream(&stream)?;
        let writer = stream.try_clone().map_err(NodeError::Io)?;
        Ok(SingleConnectionHandler {
            reader: BufReader::new(stream),
            writer,
            close,
        })
    }

    pub fn send_with_response<T: Serialize>(&mut self, msg: &T) -> Result<Value> {
        let frame = encode_frame(msg)?;
        self.writer.write_all(&frame).map_err(NodeError::Io)?;
        let response = read_frame(&mut self.reader);
        if self.close {
            let _ = self.writer.shutdown(std::net::Shutdown::Both);
        }
        response
    }

    pub fn send_wout_response<T: Serialize>(&mut self, msg: &T) -> Result<()> {
        let frame = encode_frame(msg)?;
        self.writer.write_all(&frame).map_err(NodeError::Io)?;
        if self.close {
            let _ = self.writer.shutdown(std::net::Shutdown::Both);
        }
        Ok(())
    }

    pub fn read_response(&mut self) -> Result<Value> {
        read_frame(&mut self.reader)
    }
}

/// Fans a request out to every peer in order. Peers that refuse the
/// connection are skipped and logged, never fatal (§4.1).
pub struct MultipleConnectionHandler {
    peers: Vec<SocketAddr>,
}

impl MultipleConnectionHandler {
    pub fn new(peers: Vec<SocketAddr>) -> Self {
        MultipleConnectionHandler { peers }
    }

    pub fn send_with_response<T: Serialize>(&self, msg: &T) -> Vec<Option<Value>> {
        self.peers
            .iter()
            .map(|addr| {
                match SingleConnectionHandler::connect(*addr, true) {
                    Ok(mut handler) => match handler.send_with_response(msg) {
                        Ok(v) => Some(v),
                        Err(e) => {
                            warn!("peer {addr} errored during request: {e}");
                            None
                        }
                    },
                    Err(e) => {
                        debug!("peer {addr} unreachable: {e}");
                        None
                    }
                }
            })
            .collect()
    }

    pub fn send_wout_response<T: Serialize>(&self, msg: &T) {
        for addr in &self.peers {
            match SingleConnectionHandler::connect(*addr, true) {
                Ok(mut handler) => {
                    if let Err(e) = handler.send_wout_response(msg) {
                        warn!("peer {addr} errored during fire-and-forget send: {e}");
                    }
                }
                Err(e) => debug!("peer {addr} unreachable: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn frame_round_trips() {
        let value = serde_json::json!({"action": "get_chain", "params": []});
        let encoded = encode_frame(&value).unwrap();
        let mut cursor = Cursor::new(encoded);
        let decoded = read_frame(&mut cursor).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn single_connection_handler_round_trips_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            let request = read_frame(&mut reader).unwrap();
            assert_eq!(request["action"], "ping");
            let frame = encode_frame(&serde_json::json!({"pong": true})).unwrap();
            writer.write_all(&frame).unwrap();
        });

        let mut client = SingleConnectionHandler::connect(addr, true).unwrap();
        let response = client
            .send_with_response(&serde_json::json!({"action": "ping"}))
            .unwrap();
        assert_eq!(response["pong"], true);
        server.join().unwrap();
    }

    #[test]
    fn connection_refused_is_not_fatal() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let handler = MultipleConnectionHandler::new(vec![addr]);
        let responses = handler.send_with_response(&serde_json::json!({"action": "ping"}));
        assert_eq!(responses, vec![None]);
    }
}
