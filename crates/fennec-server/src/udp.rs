//! UDP listener.

use super::handler::{QueryContext, QueryHandler};
use super::{Protocol, Result};
use bytes::Bytes;
use fennec_proto::Message;
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, trace};

/// UDP DNS listener.
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    handler: Arc<dyn QueryHandler>,
    local_addr: SocketAddr,
}

impl UdpServer {
    /// Binds a UDP listener on the given address.
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn QueryHandler>) -> Result<Self> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, None)?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;
        let local_addr = socket.local_addr()?;

        info!(addr = %local_addr, "udp listener bound");

        Ok(Self {
            socket: Arc::new(socket),
            handler,
            local_addr,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts and handles queries until the task is dropped.
    pub async fn run(&self) -> Result<()> {
        let mut buf = vec![0u8; 65_535];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => {
                    let data = Bytes::copy_from_slice(&buf[..len]);
                    let socket = self.socket.clone();
                    let handler = self.handler.clone();

                    tokio::spawn(async move {
                        if let Err(e) = process_query(socket, handler, data, src).await {
                            debug!(error = %e, client = %src, "error processing udp query");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "error receiving udp packet");
                }
            }
        }
    }
}

async fn process_query(
    socket: Arc<UdpSocket>,
    handler: Arc<dyn QueryHandler>,
    data: Bytes,
    src: SocketAddr,
) -> Result<()> {
    let query = match Message::parse(&data) {
        Ok(msg) => msg,
        Err(e) => {
            // Malformed packets are dropped silently.
            trace!(error = %e, client = %src, "failed to parse udp query");
            return Ok(());
        }
    };

    let ctx = QueryContext::new(src, Protocol::Udp);
    let max_size = ctx.max_response_size();

    let mut reply = handler.handle(query, ctx).await;
    if reply.wire_len() > max_size {
        reply.truncate_to(max_size);
    }

    socket.send_to(&reply.to_wire(), src).await?;
    Ok(())
}
