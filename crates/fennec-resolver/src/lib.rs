//! # fennec-resolver
//!
//! The resolution engine: upstream identities, the warm-connection pool,
//! the DNS-over-TLS transport, and the forwarding retry loop.
//!
//! Recursion is always delegated: queries go to configured upstream
//! resolvers with RD set, over TLS on port 853. Connections are pooled per
//! upstream and handed out with exclusive ownership — an entry is either
//! resident in the pool or held by exactly one caller, never both.

use std::io;
use thiserror::Error;

pub mod client;
pub mod entry;
pub mod forward;
pub mod pool;
pub mod upstream;

pub use client::{BoxedConn, Conn, DotTransport, Transport};
pub use entry::ConnEntry;
pub use forward::Forwarder;
pub use pool::{AddOutcome, Checkout, ConnPool};
pub use upstream::Upstream;

/// Resolver error.
#[derive(Error, Debug)]
pub enum ResolverError {
    /// A transport connection could not be established.
    #[error("could not connect to upstream [{address}]: {source}")]
    DialFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    /// An exchange failed after the connection was established.
    #[error("exchange with upstream [{address}] failed: {source}")]
    ExchangeFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The pool has no upstreams to choose from.
    #[error("no upstreams configured")]
    NoUpstreams,

    /// An entry was returned for an address the pool does not know.
    #[error("upstream [{address}] is not registered with the pool")]
    UnknownUpstream { address: String },

    /// Every attempt in the retry loop failed.
    #[error("failed to complete any exchanges with upstreams: {0}")]
    NoUpstreamsReachable(#[source] Box<ResolverError>),

    /// A query could not even be constructed.
    #[error("wire format error: {0}")]
    Proto(#[from] fennec_proto::Error),
}

/// Result type for resolver operations.
pub type Result<T> = std::result::Result<T, ResolverError>;
