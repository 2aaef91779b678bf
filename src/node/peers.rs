use std::collections::HashSet;
use std::net::SocketAddr;

use parking_lot::RwLock;

/// The set of peers this node knows about. Append-only for the life of the
/// process (§1 non-goals: no node departure support beyond best-effort
/// `unregister_nodes`).
#[derive(Debug, Default)]
pub struct Nodes {
    inner: RwLock<HashSet<SocketAddr>>,
}

impl Nodes {
    pub fn new() -> Self {
        Nodes::default()
    }

    pub fn add_node(&self, addr: SocketAddr) -> bool {
        self.inner.write().insert(addr)
    }

    /// Returns the subset of `addrs` that were newly added (i.e. not
    /// already known), used by `register_nodes` to decide which peers get
    /// the reciprocal announcement (§4.5).
    pub fn add_nodes(&self, addrs: &[SocketAddr]) -> Vec<SocketAddr> {
        let mut guard = self.inner.write();
        addrs
            .iter()
            .copied()
            .filter(|addr| guard.insert(*addr))
            .collect()
    }

    pub fn evict_node(&self, addr: &SocketAddr) -> bool {
        self.inner.write().remove(addr)
    }

    pub fn evict_nodes(&self, addrs: &[SocketAddr]) {
        let mut guard = self.inner.write();
        for addr in addrs {
            guard.remove(addr);
        }
    }

    pub fn node_is_known(&self, addr: &SocketAddr) -> bool {
        self.inner.read().contains(addr)
    }

    pub fn get_nodes(&self) -> Vec<SocketAddr> {
        self.inner.read().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn add_nodes_reports_only_new_ones() {
        let nodes = Nodes::new();
        nodes.add_node(addr(1));
        let newly_added = nodes.add_nodes(&[addr(1), addr(2), addr(3)]);
        assert_eq!(newly_added, vec![addr(2), addr(3)]);
        assert_eq!(nodes.len(), 3);
    }

    #[test]
    fn evict_removes_known_node() {
        let nodes = Nodes::new();
        nodes.add_node(addr(5));
        assert!(nodes.evict_node(&addr(5)));
        assert!(!nodes.node_is_known(&addr(5)));
    }
}
