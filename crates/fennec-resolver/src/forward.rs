//! The forwarding retry loop.
//!
//! A recursive query is one RD=1 question sent to an upstream over a pooled
//! DoT connection, retried across upstreams until an attempt succeeds or the
//! configured attempts are exhausted.

use crate::client::Transport;
use crate::entry::ConnEntry;
use crate::pool::{AddOutcome, Checkout, ConnPool};
use crate::upstream::Upstream;
use crate::{ResolverError, Result};
use fennec_proto::{Message, Name, Question, RecordType};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Forwards queries to upstream resolvers with retries and connection
/// reuse.
pub struct Forwarder {
    pool: Arc<ConnPool>,
    transport: Arc<dyn Transport>,
    retries: u32,
}

impl Forwarder {
    /// Creates a forwarder over the given pool and transport.
    ///
    /// `retries` is the number of additional attempts after the first; every
    /// query gets `retries + 1` exchange attempts in total.
    pub fn new(pool: Arc<ConnPool>, transport: Arc<dyn Transport>, retries: u32) -> Self {
        Self {
            pool,
            transport,
            retries,
        }
    }

    /// Returns the connection pool.
    pub fn pool(&self) -> &Arc<ConnPool> {
        &self.pool
    }

    /// Registers an upstream with the pool.
    pub fn add_upstream(&self, upstream: Upstream) {
        self.pool.add_upstream(upstream);
    }

    /// Produces a connection: a warm one from the pool, or a fresh dial to
    /// the upstream the pool selected.
    pub async fn get_connection(&self) -> Result<ConnEntry> {
        match self.pool.get()? {
            Checkout::Hit(entry) => {
                let address = entry.address();
                fennec_metrics::record_reused_connection(&address);
                debug!(address, "using pooled connection");
                Ok(entry)
            }
            Checkout::Miss(upstream) => {
                info!(address = upstream.address(), "creating new connection");
                self.pool.new_connection(&upstream, self.transport.as_ref()).await
            }
        }
    }

    /// Runs one exchange attempt. On success the caller receives the entry
    /// back for pooling; on failure the connection is closed and never
    /// reused.
    async fn attempt_exchange(&self, msg: &Message) -> Result<(ConnEntry, Message)> {
        let mut entry = self.get_connection().await?;
        let address = entry.address();

        let started = Instant::now();
        let outcome = self.transport.exchange(msg, entry.conn_mut()).await;
        fennec_metrics::observe_exchange_timer(&address, started.elapsed());

        match outcome {
            Ok((reply, rtt)) => {
                entry.add_exchange(rtt);
                self.pool.note_exchange(&address, rtt);
                Ok((entry, reply))
            }
            Err(source) => {
                entry.add_error();
                self.pool.close_connection(entry);
                fennec_metrics::record_upstream_error(&address);
                debug!(
                    address,
                    domain = %msg.question().map(|q| q.qname.to_string()).unwrap_or_default(),
                    error = %source,
                    "exchange failed, connection closed"
                );
                Err(ResolverError::ExchangeFailed { address, source })
            }
        }
    }

    /// Resolves `(name, qtype)` through an upstream, returning the reply and
    /// the address that answered.
    pub async fn recursive_query(&self, name: &str, qtype: RecordType) -> Result<(Message, String)> {
        fennec_metrics::record_recursive_query();

        let qname = Name::from_str(name)?;
        let msg = Message::query(Question::new(qname, qtype));

        let mut last_err: Option<ResolverError> = None;
        for attempt in 0..=self.retries {
            match self.attempt_exchange(&msg).await {
                Ok((entry, reply)) => {
                    let address = entry.address();
                    match self.pool.add(entry) {
                        Ok(AddOutcome::Pooled) => {}
                        Ok(AddOutcome::Rejected(entry)) => self.pool.close_connection(entry),
                        Err(e) => {
                            error!(error = %e, "could not return connection to pool, continuing without it");
                        }
                    }
                    return Ok((reply, address));
                }
                Err(e) => {
                    warn!(
                        attempt,
                        retries = self.retries,
                        error = %e,
                        "exchange attempt failed"
                    );
                    last_err = Some(e);
                }
            }
        }

        let last = last_err.unwrap_or(ResolverError::NoUpstreams);
        error!(
            domain = name,
            rrtype = %qtype,
            error = %last,
            "failed to complete any exchanges with upstreams"
        );
        Err(ResolverError::NoUpstreamsReachable(Box::new(last)))
    }

    /// Eagerly fills each upstream's bucket so first queries skip the TLS
    /// handshake. Failures are logged and ignored; warming never blocks
    /// startup.
    pub async fn warm_connections(&self) {
        for upstream in self.pool.upstreams() {
            let address = upstream.address();
            for _ in 0..self.pool.max_per_host() {
                match self.pool.new_connection(&upstream, self.transport.as_ref()).await {
                    Ok(entry) => match self.pool.add(entry) {
                        Ok(AddOutcome::Pooled) => {}
                        Ok(AddOutcome::Rejected(entry)) => {
                            self.pool.close_connection(entry);
                            break;
                        }
                        Err(e) => {
                            warn!(address, error = %e, "could not pool warmed connection");
                            break;
                        }
                    },
                    Err(e) => {
                        warn!(address, error = %e, "connection warming failed for upstream");
                        break;
                    }
                }
            }
            debug!(address, pooled = self.pool.size_for(&address), "warmed upstream");
        }
    }
}
