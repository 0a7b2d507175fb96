//! The query pipeline.
//!
//! One inbound query flows through admission control (a counting semaphore
//! bounding in-flight work), the lookup cache, the hosted cache, and
//! finally the forwarding retry loop. The reply preserves the client's
//! question and id, advertises recursion, and is never authoritative.

use crate::handler::{QueryContext, QueryHandler};
use crate::query_log::{SOURCE_SERVFAIL, log_query};
use async_trait::async_trait;
use fennec_cache::{CachedResponse, RecordCache};
use fennec_proto::{Message, RecordType, ResponseCode};
use fennec_resolver::{Forwarder, Result as ResolverResult, Upstream};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Answer source reported for cache hits.
const SOURCE_CACHE: &str = "cache";

/// The resolver's query pipeline, shared by every listener.
pub struct QueryPipeline {
    /// Responses learned from upstreams; TTL-bounded and reaped.
    lookup: Arc<RecordCache>,

    /// Records loaded from zone files; never expires.
    hosted: Arc<RecordCache>,

    /// The forwarding engine.
    forwarder: Arc<Forwarder>,

    /// Bounds in-flight queries.
    permits: Arc<Semaphore>,
}

impl QueryPipeline {
    /// Creates the pipeline with a concurrency bound.
    pub fn new(
        lookup: Arc<RecordCache>,
        hosted: Arc<RecordCache>,
        forwarder: Arc<Forwarder>,
        concurrent_queries: usize,
    ) -> Self {
        debug!(concurrency = concurrent_queries, "creating query pipeline");
        Self {
            lookup,
            hosted,
            forwarder,
            permits: Arc::new(Semaphore::new(concurrent_queries.max(1))),
        }
    }

    /// Returns the lookup cache.
    pub fn lookup_cache(&self) -> &Arc<RecordCache> {
        &self.lookup
    }

    /// Returns the hosted cache.
    pub fn hosted_cache(&self) -> &Arc<RecordCache> {
        &self.hosted
    }

    /// Returns the forwarder.
    pub fn forwarder(&self) -> &Arc<Forwarder> {
        &self.forwarder
    }

    /// Registers an upstream with the underlying pool.
    pub fn add_upstream(&self, upstream: Upstream) {
        self.forwarder.add_upstream(upstream);
    }

    /// Retrieves the response for `(name, qtype)`: lookup cache, then hosted
    /// cache, then a recursive query whose result is cached.
    ///
    /// Returns the response and its source: `"cache"` or the answering
    /// upstream's address.
    pub async fn retrieve_records(
        &self,
        name: &str,
        qtype: RecordType,
    ) -> ResolverResult<(CachedResponse, String)> {
        if let Some(found) = self.lookup.get(name, qtype) {
            fennec_metrics::record_cache_hit();
            return Ok((found, SOURCE_CACHE.to_string()));
        }

        if let Some(found) = self.hosted.get(name, qtype) {
            fennec_metrics::record_hosted_cache_hit();
            return Ok((found, SOURCE_CACHE.to_string()));
        }

        let (reply, address) = self.forwarder.recursive_query(name, qtype).await?;
        let response = CachedResponse::new(name, qtype, reply);
        self.lookup.add(response.clone());
        Ok((response, address))
    }

    /// Builds the SERVFAIL reply for a query, with bookkeeping.
    fn servfail(query: &Message, started: Instant) -> Message {
        fennec_metrics::record_local_servfail();

        let mut reply = Message::response_from(query);
        reply.set_rcode(ResponseCode::ServFail);
        reply.header.set_recursion_available(true);

        let duration = started.elapsed();
        fennec_metrics::observe_query_timer(duration);
        log_query(SOURCE_SERVFAIL, duration, &reply);
        reply
    }
}

#[async_trait]
impl QueryHandler for QueryPipeline {
    async fn handle(&self, query: Message, context: QueryContext) -> Message {
        fennec_metrics::record_query();
        let started = Instant::now();

        let Some(question) = query.question().cloned() else {
            let mut reply = Message::response_from(&query);
            reply.set_rcode(ResponseCode::FormErr);
            return reply;
        };

        // Admission: the query sits in the queue gauge until a permit frees
        // up. Acquisition only fails if the semaphore is closed, which is a
        // server-shutdown condition the client sees as SERVFAIL.
        fennec_metrics::inc_queued_queries();
        let permit = self.permits.acquire().await;
        fennec_metrics::dec_queued_queries();
        let _permit = match permit {
            Ok(permit) => permit,
            Err(e) => {
                error!(
                    client = %context.client,
                    error = %e,
                    "could not acquire query permit, answering servfail"
                );
                return Self::servfail(&query, started);
            }
        };

        let name = question.qname.to_string();
        match self.retrieve_records(&name, question.qtype).await {
            Ok((response, source)) => {
                let mut reply = response.message.clone();
                reply.set_reply(&query);
                reply.header.set_recursion_available(true);
                reply.header.set_authoritative(false);

                let duration = started.elapsed();
                fennec_metrics::observe_query_timer(duration);
                log_query(&source, duration, &reply);
                reply
            }
            Err(e) => {
                fennec_metrics::record_resolver_error();
                warn!(
                    client = %context.client,
                    domain = %name,
                    error = %e,
                    "could not retrieve records, answering servfail"
                );
                Self::servfail(&query, started)
            }
        }
    }
}
