//! # fennec-server
//!
//! The serving side of the resolver: DNS listeners (UDP, TCP, TCP-TLS),
//! the query pipeline that ties caches and the forwarder together, the
//! structured per-query log, and the HTTP admin API.

use std::io;
use thiserror::Error;

pub mod api;
pub mod dot;
pub mod handler;
pub mod pipeline;
pub mod query_log;
pub mod tcp;
pub mod udp;

pub use api::{AdminApi, AdminState};
pub use dot::DotServer;
pub use handler::{QueryContext, QueryHandler};
pub use pipeline::QueryPipeline;
pub use tcp::TcpServer;
pub use udp::UdpServer;

/// Server error.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS error: {0}")]
    Tls(String),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Protocol a query arrived over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Plain UDP.
    Udp,
    /// Plain TCP.
    Tcp,
    /// TCP with TLS.
    Dot,
}

impl Protocol {
    /// Returns the protocol's short name for logs and metrics.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Dot => "tcp-tls",
        }
    }
}
