//! # fennec-metrics
//!
//! Metric recording and observability plumbing for the fennec resolver.
//!
//! All counters, histograms, and gauges go through the `metrics` facade so
//! call sites stay one line; the Prometheus exporter in [`prometheus`]
//! renders them for the admin API. Names match the resolver's operational
//! vocabulary: query totals, cache hits, upstream health, and timing.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

pub mod prometheus;
pub mod tracing_setup;

/// Counter: every DNS query received.
pub const TOTAL_DNS_QUERIES: &str = "total_dns_queries";

/// Counter: lookup cache hits.
pub const CACHE_HITS: &str = "cache_hits";

/// Counter: hosted (zone file) cache hits.
pub const HOSTED_CACHE_HITS: &str = "hosted_cache_hits";

/// Counter: recursive queries dispatched upstream.
pub const RECURSIVE_QUERIES: &str = "recursive_queries";

/// Counter: SERVFAIL responses generated locally.
pub const LOCAL_SERVFAILS: &str = "local_servfails";

/// Counter: errors inside the resolution path.
pub const RESOLVER_ERRORS: &str = "resolver_errors";

/// Counter (by address): failed exchanges with an upstream.
pub const UPSTREAM_ERRORS: &str = "upstream_errors";

/// Counter (by address): pooled connections handed back out.
pub const REUSED_CONNECTIONS: &str = "reused_connections";

/// Counter (by address): fresh dials to an upstream.
pub const NEW_CONNECTION_ATTEMPTS: &str = "new_connection_attempts";

/// Histogram (by address): TLS dial duration in seconds.
pub const TLS_TIMER: &str = "tls_timer";

/// Histogram (by address): one exchange round trip in seconds.
pub const EXCHANGE_TIMER: &str = "exchange_timer";

/// Histogram: whole-query duration in seconds.
pub const QUERY_TIMER: &str = "query_timer";

/// Gauge: queries waiting on the concurrency semaphore.
pub const QUEUED_QUERIES: &str = "queued_queries";

/// Records a received query.
pub fn record_query() {
    counter!(TOTAL_DNS_QUERIES).increment(1);
}

/// Records a lookup cache hit.
pub fn record_cache_hit() {
    counter!(CACHE_HITS).increment(1);
}

/// Records a hosted cache hit.
pub fn record_hosted_cache_hit() {
    counter!(HOSTED_CACHE_HITS).increment(1);
}

/// Records a recursive query dispatch.
pub fn record_recursive_query() {
    counter!(RECURSIVE_QUERIES).increment(1);
}

/// Records a locally generated SERVFAIL.
pub fn record_local_servfail() {
    counter!(LOCAL_SERVFAILS).increment(1);
}

/// Records a resolution path error.
pub fn record_resolver_error() {
    counter!(RESOLVER_ERRORS).increment(1);
}

/// Records a failed exchange with the given upstream.
pub fn record_upstream_error(address: &str) {
    counter!(UPSTREAM_ERRORS, "address" => address.to_string()).increment(1);
}

/// Records a pooled connection reuse.
pub fn record_reused_connection(address: &str) {
    counter!(REUSED_CONNECTIONS, "address" => address.to_string()).increment(1);
}

/// Records a fresh dial attempt.
pub fn record_new_connection_attempt(address: &str) {
    counter!(NEW_CONNECTION_ATTEMPTS, "address" => address.to_string()).increment(1);
}

/// Observes the TLS dial duration for an upstream.
pub fn observe_tls_timer(address: &str, duration: Duration) {
    histogram!(TLS_TIMER, "address" => address.to_string()).record(duration.as_secs_f64());
}

/// Observes one exchange round trip for an upstream.
pub fn observe_exchange_timer(address: &str, duration: Duration) {
    histogram!(EXCHANGE_TIMER, "address" => address.to_string()).record(duration.as_secs_f64());
}

/// Observes the duration of a whole query.
pub fn observe_query_timer(duration: Duration) {
    histogram!(QUERY_TIMER).record(duration.as_secs_f64());
}

/// Bumps the queued-queries gauge.
pub fn inc_queued_queries() {
    gauge!(QUEUED_QUERIES).increment(1.0);
}

/// Drops the queued-queries gauge.
pub fn dec_queued_queries() {
    gauge!(QUEUED_QUERIES).decrement(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_a_noop() {
        // The facade drops everything until a recorder is installed; these
        // must not panic in that state.
        record_query();
        record_upstream_error("1.1.1.1:853");
        observe_query_timer(Duration::from_millis(5));
        inc_queued_queries();
        dec_queued_queries();
    }
}
