//! Auth Table: tracks which client addresses have successfully AUTHed.

use std::net::SocketAddr;

use dashmap::DashMap;

/// Concurrency-safe map from a client's remote address to whether it has
/// authenticated on this connection.
///
/// Keyed by `SocketAddr` rather than a process-wide singleton map so a
/// reconnect from a stale ephemeral port can never read another client's
/// flag; each `Client` holds an `Arc` to the same table and clears its own
/// entry on close.
#[derive(Default)]
pub struct AuthTable {
    entries: DashMap<SocketAddr, bool>,
}

impl AuthTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self, addr: SocketAddr) -> bool {
        self.entries.get(&addr).map(|v| *v).unwrap_or(false)
    }

    pub fn set_authenticated(&self, addr: SocketAddr, authenticated: bool) {
        self.entries.insert(addr, authenticated);
    }

    /// Drops the entry entirely; called when a connection closes.
    pub fn clear(&self, addr: SocketAddr) {
        self.entries.remove(&addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn defaults_to_unauthenticated() {
        let table = AuthTable::new();
        assert!(!table.is_authenticated(addr(1)));
    }

    #[test]
    fn records_and_clears() {
        let table = AuthTable::new();
        table.set_authenticated(addr(1), true);
        assert!(table.is_authenticated(addr(1)));

        table.clear(addr(1));
        assert!(!table.is_authenticated(addr(1)));
    }

    #[test]
    fn addresses_are_independent() {
        let table = AuthTable::new();
        table.set_authenticated(addr(1), true);
        assert!(!table.is_authenticated(addr(2)));
    }
}
