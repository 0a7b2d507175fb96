//! The warm-connection pool.
//!
//! Connections are bucketed per upstream address, bounded by
//! `max_per_host`, and vended LIFO so the most recently used connection —
//! the one most likely to still be warm — goes back out first.
//!
//! The pool also accumulates per-address exchange statistics that outlive
//! individual connections; they drive upstream selection when every bucket
//! is empty and a caller must dial.

use crate::client::Transport;
use crate::entry::ConnEntry;
use crate::upstream::Upstream;
use crate::{ResolverError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, trace};

/// What `get` produced: a warm connection, or an upstream the caller must
/// dial.
pub enum Checkout {
    /// A pooled connection, now exclusively owned by the caller.
    Hit(ConnEntry),

    /// No pooled connection; dial this upstream.
    Miss(Upstream),
}

/// What `add` did with a returned entry.
pub enum AddOutcome {
    /// The entry is back in the pool.
    Pooled,

    /// The bucket was full; ownership returns to the caller, which closes
    /// the entry.
    Rejected(ConnEntry),
}

/// Cumulative per-address exchange statistics. These survive connection
/// churn so selection weight means something after entries are closed.
#[derive(Debug, Clone, Copy, Default)]
struct UpstreamStats {
    total_rtt: Duration,
    exchanges: u64,
    errors: u64,
}

impl UpstreamStats {
    /// Selection weight: mean round-trip time, zero when untried.
    fn mean_rtt(&self) -> Duration {
        self.total_rtt / u32::try_from(self.exchanges.max(1)).unwrap_or(u32::MAX)
    }
}

#[derive(Default)]
struct PoolInner {
    buckets: HashMap<String, Vec<ConnEntry>>,
    upstreams: Vec<Upstream>,
    stats: HashMap<String, UpstreamStats>,
}

/// A bounded pool of warm upstream connections.
pub struct ConnPool {
    inner: Mutex<PoolInner>,
    max_per_host: usize,
}

impl ConnPool {
    /// Creates an empty pool with the given per-upstream bound.
    pub fn new(max_per_host: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            max_per_host: max_per_host.max(1),
        }
    }

    /// Returns the per-upstream capacity.
    pub fn max_per_host(&self) -> usize {
        self.max_per_host
    }

    /// Registers an upstream. A second upstream with the same dial address
    /// is ignored.
    pub fn add_upstream(&self, upstream: Upstream) {
        let mut inner = self.inner.lock();
        let address = upstream.address();
        if inner.upstreams.iter().any(|u| u.address() == address) {
            return;
        }
        debug!(address, name = %upstream.name, "registered upstream");
        inner.upstreams.push(upstream);
    }

    /// Returns the registered upstreams in insertion order.
    pub fn upstreams(&self) -> Vec<Upstream> {
        self.inner.lock().upstreams.clone()
    }

    /// Dials a fresh connection to `upstream`. Does not insert the entry
    /// into the pool; the caller owns it.
    pub async fn new_connection(
        &self,
        upstream: &Upstream,
        transport: &dyn Transport,
    ) -> Result<ConnEntry> {
        let address = upstream.address();
        fennec_metrics::record_new_connection_attempt(&address);

        // The dial happens outside the pool lock.
        let conn = transport
            .dial(&address)
            .await
            .map_err(|source| ResolverError::DialFailed {
                address: address.clone(),
                source,
            })?;

        Ok(ConnEntry::new(conn, upstream.clone()))
    }

    /// Checks a connection out of the pool, or picks the upstream to dial.
    ///
    /// Hit policy: among non-empty buckets, the address with the lowest mean
    /// RTT; within the bucket, the most recently returned entry. Miss
    /// policy: the upstream with the lowest weight (mean RTT, untried = 0),
    /// ties broken by fewest errors, then insertion order.
    pub fn get(&self) -> Result<Checkout> {
        let mut inner = self.inner.lock();
        if inner.upstreams.is_empty() {
            return Err(ResolverError::NoUpstreams);
        }

        let warm = inner
            .buckets
            .iter()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(address, _)| {
                let rtt = inner.stats.get(address).copied().unwrap_or_default().mean_rtt();
                (address.clone(), rtt)
            })
            .min_by_key(|(_, rtt)| *rtt)
            .map(|(address, _)| address);

        if let Some(address) = warm {
            // Bucket is known non-empty; pop the warmest entry.
            if let Some(entry) = inner.buckets.get_mut(&address).and_then(Vec::pop) {
                trace!(address, "pool hit");
                return Ok(Checkout::Hit(entry));
            }
        }

        let chosen = inner
            .upstreams
            .iter()
            .enumerate()
            .min_by_key(|(idx, upstream)| {
                let stats = inner
                    .stats
                    .get(&upstream.address())
                    .copied()
                    .unwrap_or_default();
                (stats.mean_rtt(), stats.errors, *idx)
            })
            .map(|(_, upstream)| upstream.clone())
            .ok_or(ResolverError::NoUpstreams)?;

        trace!(address = chosen.address(), "pool miss, caller must dial");
        Ok(Checkout::Miss(chosen))
    }

    /// Returns a checked-out entry to its bucket.
    ///
    /// A full bucket rejects the entry and hands it back for the caller to
    /// close; an unregistered address is a programming error — the entry is
    /// closed here and an error returned.
    pub fn add(&self, entry: ConnEntry) -> Result<AddOutcome> {
        let address = entry.address();
        let mut inner = self.inner.lock();

        if !inner.upstreams.iter().any(|u| u.address() == address) {
            drop(inner);
            error!(address, "refusing to pool connection for unknown upstream");
            self.close_connection(entry);
            return Err(ResolverError::UnknownUpstream { address });
        }

        let bucket = inner.buckets.entry(address.clone()).or_default();
        if bucket.len() >= self.max_per_host {
            trace!(address, "bucket full, rejecting returned connection");
            return Ok(AddOutcome::Rejected(entry));
        }

        bucket.push(entry);
        Ok(AddOutcome::Pooled)
    }

    /// Closes and discards a connection, noting the failure against its
    /// upstream.
    pub fn close_connection(&self, entry: ConnEntry) {
        let address = entry.address();
        let mut inner = self.inner.lock();
        inner.stats.entry(address).or_default().errors += 1;
        // Dropping the entry closes the underlying stream.
        drop(entry);
    }

    /// Folds one successful exchange into the upstream's cumulative
    /// statistics.
    pub fn note_exchange(&self, address: &str, rtt: Duration) {
        let mut inner = self.inner.lock();
        let stats = inner.stats.entry(address.to_string()).or_default();
        stats.total_rtt += rtt;
        stats.exchanges += 1;
    }

    /// Total pooled connections across all upstreams.
    pub fn size(&self) -> usize {
        self.inner.lock().buckets.values().map(Vec::len).sum()
    }

    /// Pooled connections for one address.
    pub fn size_for(&self, address: &str) -> usize {
        self.inner
            .lock()
            .buckets
            .get(address)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn upstream(name: &str) -> Upstream {
        Upstream::new(name)
    }

    fn entry_for(upstream: &Upstream) -> ConnEntry {
        let (conn, _peer) = tokio::io::duplex(64);
        ConnEntry::new(Box::new(conn), upstream.clone())
    }

    fn pool_with(upstreams: &[Upstream], max_per_host: usize) -> ConnPool {
        let pool = ConnPool::new(max_per_host);
        for u in upstreams {
            pool.add_upstream(u.clone());
        }
        pool
    }

    #[tokio::test]
    async fn empty_pool_misses_with_an_upstream() {
        let u1 = upstream("one.test");
        let pool = pool_with(&[u1.clone()], 3);

        match pool.get().unwrap() {
            Checkout::Miss(chosen) => assert_eq!(chosen, u1),
            Checkout::Hit(_) => panic!("expected a miss from an empty pool"),
        }
    }

    #[test]
    fn no_upstreams_is_an_error() {
        let pool = ConnPool::new(3);
        assert!(matches!(pool.get(), Err(ResolverError::NoUpstreams)));
    }

    #[tokio::test]
    async fn add_and_get_round_trip() {
        let u1 = upstream("one.test");
        let pool = pool_with(&[u1.clone()], 3);

        assert!(matches!(
            pool.add(entry_for(&u1)).unwrap(),
            AddOutcome::Pooled
        ));
        assert_eq!(pool.size_for("one.test:853"), 1);

        match pool.get().unwrap() {
            Checkout::Hit(entry) => assert_eq!(entry.address(), "one.test:853"),
            Checkout::Miss(_) => panic!("expected a hit"),
        }
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test]
    async fn bucket_never_exceeds_max_per_host() {
        let u1 = upstream("one.test");
        let pool = pool_with(&[u1.clone()], 2);

        assert!(matches!(
            pool.add(entry_for(&u1)).unwrap(),
            AddOutcome::Pooled
        ));
        assert!(matches!(
            pool.add(entry_for(&u1)).unwrap(),
            AddOutcome::Pooled
        ));
        match pool.add(entry_for(&u1)).unwrap() {
            AddOutcome::Rejected(entry) => pool.close_connection(entry),
            AddOutcome::Pooled => panic!("third add should be rejected"),
        }

        assert_eq!(pool.size_for("one.test:853"), 2);
    }

    #[tokio::test]
    async fn unknown_upstream_is_rejected_and_closed() {
        let pool = pool_with(&[upstream("one.test")], 3);
        let stranger = upstream("stranger.test");

        let result = pool.add(entry_for(&stranger));
        assert!(matches!(
            result,
            Err(ResolverError::UnknownUpstream { .. })
        ));
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test]
    async fn duplicate_upstreams_are_ignored() {
        let pool = pool_with(&[upstream("one.test"), upstream("one.test")], 3);
        assert_eq!(pool.upstreams().len(), 1);
    }

    #[tokio::test]
    async fn miss_prefers_untried_then_fewest_errors_then_order() {
        let u1 = upstream("one.test");
        let u2 = upstream("two.test");
        let u3 = upstream("three.test");
        let pool = pool_with(&[u1.clone(), u2.clone(), u3.clone()], 3);

        // one.test has history, the others are untried: insertion order
        // breaks the tie between two.test and three.test.
        pool.note_exchange("one.test:853", Duration::from_millis(10));
        match pool.get().unwrap() {
            Checkout::Miss(chosen) => assert_eq!(chosen, u2),
            Checkout::Hit(_) => panic!("expected a miss"),
        }

        // Give two.test an error at weight zero; three.test is now cleanest.
        pool.close_connection(entry_for(&u2));
        match pool.get().unwrap() {
            Checkout::Miss(chosen) => assert_eq!(chosen, u3),
            Checkout::Hit(_) => panic!("expected a miss"),
        }
    }

    #[tokio::test]
    async fn hit_prefers_lowest_mean_rtt_bucket_and_lifo_entry() {
        let u1 = upstream("one.test");
        let u2 = upstream("two.test");
        let pool = pool_with(&[u1.clone(), u2.clone()], 3);

        pool.note_exchange("one.test:853", Duration::from_millis(50));
        pool.note_exchange("two.test:853", Duration::from_millis(5));

        let mut first = entry_for(&u1);
        first.add_exchange(Duration::from_millis(50));
        pool.add(first).unwrap();

        let mut second = entry_for(&u2);
        second.add_exchange(Duration::from_millis(5));
        pool.add(second).unwrap();

        match pool.get().unwrap() {
            Checkout::Hit(entry) => assert_eq!(entry.address(), "two.test:853"),
            Checkout::Miss(_) => panic!("expected a hit"),
        }
    }

    #[tokio::test]
    async fn concurrent_checkouts_never_share_an_entry() {
        let u1 = upstream("one.test");
        let pool = Arc::new(pool_with(&[u1.clone()], 8));
        for _ in 0..8 {
            pool.add(entry_for(&u1)).unwrap();
        }

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                match pool.get().unwrap() {
                    Checkout::Hit(entry) => entry,
                    Checkout::Miss(_) => panic!("pool should have been warm"),
                }
            }));
        }

        let mut entries = Vec::new();
        for task in tasks {
            entries.push(task.await.unwrap());
        }

        // Eight checkouts drained eight distinct entries.
        assert_eq!(entries.len(), 8);
        assert_eq!(pool.size(), 0);

        for entry in entries {
            pool.add(entry).unwrap();
        }
        assert_eq!(pool.size_for("one.test:853"), 8);
    }
}
