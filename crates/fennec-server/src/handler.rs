//! Query handler interface.

use super::Protocol;
use async_trait::async_trait;
use fennec_proto::{Message, ResponseCode};
use std::net::SocketAddr;
use std::time::Instant;

/// Context for one inbound DNS query.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Client address.
    pub client: SocketAddr,

    /// Protocol the query arrived over.
    pub protocol: Protocol,

    /// When the query was received.
    pub received_at: Instant,
}

impl QueryContext {
    /// Creates a new query context.
    pub fn new(client: SocketAddr, protocol: Protocol) -> Self {
        Self {
            client,
            protocol,
            received_at: Instant::now(),
        }
    }

    /// Returns the maximum reply size for this protocol.
    pub fn max_response_size(&self) -> usize {
        match self.protocol {
            Protocol::Udp => 512,
            _ => 65_535,
        }
    }
}

/// Query handler trait: one call per inbound query, producing the reply to
/// write back.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Handles a DNS query.
    async fn handle(&self, query: Message, context: QueryContext) -> Message;
}

/// Handler that answers REFUSED to everything. Useful in listener tests.
pub struct RefusedHandler;

#[async_trait]
impl QueryHandler for RefusedHandler {
    async fn handle(&self, query: Message, _context: QueryContext) -> Message {
        let mut response = Message::response_from(&query);
        response.set_rcode(ResponseCode::Refused);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_size_depends_on_protocol() {
        let udp = QueryContext::new("127.0.0.1:12345".parse().unwrap(), Protocol::Udp);
        assert_eq!(udp.max_response_size(), 512);

        let tcp = QueryContext::new("127.0.0.1:12345".parse().unwrap(), Protocol::Tcp);
        assert_eq!(tcp.max_response_size(), 65_535);
    }

    #[tokio::test]
    async fn refused_handler_refuses() {
        use fennec_proto::{Name, Question};
        use std::str::FromStr;

        let query = Message::query(Question::a(Name::from_str("example.com").unwrap()));
        let ctx = QueryContext::new("127.0.0.1:1".parse().unwrap(), Protocol::Udp);

        let reply = RefusedHandler.handle(query.clone(), ctx).await;
        assert_eq!(reply.id(), query.id());
        assert_eq!(reply.rcode(), ResponseCode::Refused);
    }
}
