//! TCP listener.
//!
//! DNS over TCP frames every message with a 2-byte big-endian length. A
//! connection serves queries until the client closes it or it idles out.

use super::handler::{QueryContext, QueryHandler};
use super::{Protocol, Result};
use fennec_proto::Message;
use socket2::{Domain, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, trace};

/// How long an idle client connection is kept open.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP DNS listener.
pub struct TcpServer {
    listener: TcpListener,
    handler: Arc<dyn QueryHandler>,
    local_addr: SocketAddr,
    idle_timeout: Duration,
}

impl TcpServer {
    /// Binds a TCP listener on the given address.
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn QueryHandler>) -> Result<Self> {
        let listener = bind_tcp_listener(addr)?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "tcp listener bound");

        Ok(Self {
            listener,
            handler,
            local_addr,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the task is dropped.
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = self.handler.clone();
                    let idle_timeout = self.idle_timeout;

                    tokio::spawn(async move {
                        if let Err(e) =
                            serve_stream(stream, peer, handler, Protocol::Tcp, idle_timeout).await
                        {
                            debug!(error = %e, client = %peer, "tcp connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "error accepting tcp connection");
                }
            }
        }
    }
}

/// Creates a listening socket with reuse options set, ready for tokio.
pub(crate) fn bind_tcp_listener(addr: SocketAddr) -> Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener)?)
}

/// Serves length-prefixed DNS queries on one stream until EOF or idle
/// timeout. Shared by the TCP and TCP-TLS listeners.
pub(crate) async fn serve_stream<S>(
    mut stream: S,
    peer: SocketAddr,
    handler: Arc<dyn QueryHandler>,
    protocol: Protocol,
    idle_timeout: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    trace!(client = %peer, protocol = protocol.name(), "new stream connection");

    loop {
        let frame = match timeout(idle_timeout, read_frame(&mut stream)).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    trace!(client = %peer, "connection closed by client");
                    return Ok(());
                }
                return Err(e.into());
            }
            Err(_) => {
                trace!(client = %peer, "connection idle timeout");
                return Ok(());
            }
        };

        let query = match Message::parse(&frame) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, client = %peer, "failed to parse stream query");
                continue;
            }
        };

        let ctx = QueryContext::new(peer, protocol);
        let reply = handler.handle(query, ctx).await;
        write_frame(&mut stream, &reply.to_wire()).await?;
    }
}

/// Reads one length-prefixed DNS message.
pub(crate) async fn read_frame<S>(stream: &mut S) -> io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;

    if len == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "zero-length dns frame",
        ));
    }

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(body)
}

/// Writes one length-prefixed DNS message.
pub(crate) async fn write_frame<S>(stream: &mut S, data: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&(data.len() as u16).to_be_bytes()).await?;
    stream.write_all(data).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RefusedHandler;
    use fennec_proto::{Name, Question, ResponseCode};
    use std::str::FromStr;

    #[tokio::test]
    async fn answers_queries_over_one_connection() {
        let server = TcpServer::bind("127.0.0.1:0".parse().unwrap(), Arc::new(RefusedHandler))
            .await
            .unwrap();
        let addr = server.local_addr();
        tokio::spawn(async move { server.run().await });

        let mut client = TcpStream::connect(addr).await.unwrap();

        for _ in 0..2 {
            let query = Message::query(Question::a(Name::from_str("example.com").unwrap()));
            write_frame(&mut client, &query.to_wire()).await.unwrap();

            let frame = read_frame(&mut client).await.unwrap();
            let reply = Message::parse(&frame).unwrap();
            assert_eq!(reply.id(), query.id());
            assert_eq!(reply.rcode(), ResponseCode::Refused);
        }
    }

    #[tokio::test]
    async fn zero_length_frames_are_an_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0u8, 0]).await.unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
