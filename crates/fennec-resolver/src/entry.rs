//! Pooled connection entries.

use crate::client::BoxedConn;
use crate::upstream::Upstream;
use std::fmt;
use std::time::Duration;

/// One upstream connection plus its health counters.
///
/// An entry is exclusively owned: by the pool while idle, or by the single
/// caller that checked it out while an exchange is in flight. Closing an
/// entry consumes it; a closed entry can never be re-pooled.
pub struct ConnEntry {
    conn: BoxedConn,
    upstream: Upstream,
    total_rtt: Duration,
    exchanges: u64,
    errors: u64,
}

impl ConnEntry {
    /// Wraps a freshly dialed connection.
    pub fn new(conn: BoxedConn, upstream: Upstream) -> Self {
        Self {
            conn,
            upstream,
            total_rtt: Duration::ZERO,
            exchanges: 0,
            errors: 0,
        }
    }

    /// Returns the upstream this connection belongs to.
    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    /// Returns the upstream's dial address.
    pub fn address(&self) -> String {
        self.upstream.address()
    }

    /// Returns the connection for an exchange.
    pub fn conn_mut(&mut self) -> &mut BoxedConn {
        &mut self.conn
    }

    /// Records one successful exchange and its round-trip time.
    pub fn add_exchange(&mut self, rtt: Duration) {
        self.total_rtt += rtt;
        self.exchanges += 1;
    }

    /// Records one failed exchange.
    pub fn add_error(&mut self) {
        self.errors += 1;
    }

    /// Returns how many exchanges this entry has served.
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    /// Returns how many errors this entry has seen.
    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Mean round-trip time across this entry's exchanges. An untried entry
    /// reports zero.
    pub fn mean_rtt(&self) -> Duration {
        self.total_rtt / u32::try_from(self.exchanges.max(1)).unwrap_or(u32::MAX)
    }

    /// Total accumulated round-trip time.
    pub fn total_rtt(&self) -> Duration {
        self.total_rtt
    }
}

impl fmt::Debug for ConnEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnEntry")
            .field("upstream", &self.upstream)
            .field("total_rtt", &self.total_rtt)
            .field("exchanges", &self.exchanges)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ConnEntry {
        let (conn, _peer) = tokio::io::duplex(64);
        ConnEntry::new(Box::new(conn), Upstream::new("dns.example"))
    }

    #[tokio::test]
    async fn counters_accumulate() {
        let mut entry = entry();
        assert_eq!(entry.exchanges(), 0);
        assert_eq!(entry.mean_rtt(), Duration::ZERO);

        entry.add_exchange(Duration::from_millis(10));
        entry.add_exchange(Duration::from_millis(30));
        entry.add_error();

        assert_eq!(entry.exchanges(), 2);
        assert_eq!(entry.errors(), 1);
        assert_eq!(entry.mean_rtt(), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn address_comes_from_upstream() {
        let entry = entry();
        assert_eq!(entry.address(), "dns.example:853");
    }
}
