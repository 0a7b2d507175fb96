//! The DNS-over-TLS transport.
//!
//! [`Transport`] is the seam between the resolution engine and the network:
//! the real [`DotTransport`] dials TCP + TLS and speaks 2-byte
//! length-prefixed DNS per RFC 7858, while tests inject fakes built on
//! in-memory streams.

use crate::Result;
use async_trait::async_trait;
use fennec_proto::Message;
use rustls::ClientConfig;
use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpSocket;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// Marker trait for connection streams the transport can drive.
pub trait Conn: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Conn for T {}

/// An owned, type-erased connection stream.
pub type BoxedConn = Box<dyn Conn>;

/// Maximum DNS message size over a stream transport.
const MAX_MESSAGE_SIZE: usize = 65_535;

/// The transport seam: dial a connection, run one exchange over it.
///
/// Injectable so the pipeline can be exercised against a fake; the
/// production implementation is [`DotTransport`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a connection to `address` (`host:port`).
    async fn dial(&self, address: &str) -> io::Result<BoxedConn>;

    /// Writes one query and reads one reply, returning the reply and the
    /// round-trip time.
    async fn exchange(&self, msg: &Message, conn: &mut BoxedConn)
    -> io::Result<(Message, Duration)>;
}

/// DNS-over-TLS transport settings.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Bound on each dial and each exchange.
    pub timeout: Duration,

    /// Accept any upstream certificate.
    pub skip_verification: bool,

    /// Ask the kernel for TCP Fast Open on the connect socket.
    pub use_tfo: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            skip_verification: false,
            use_tfo: false,
        }
    }
}

/// The production DNS-over-TLS transport.
pub struct DotTransport {
    connector: tokio_rustls::TlsConnector,
    config: DotConfig,
}

impl DotTransport {
    /// Builds the transport. Requires a process-wide rustls crypto provider
    /// to be installed.
    pub fn new(config: DotConfig) -> Result<Self> {
        let tls = if config.skip_verification {
            let provider = rustls::crypto::CryptoProvider::get_default()
                .cloned()
                .unwrap_or_else(|| Arc::new(rustls::crypto::ring::default_provider()));
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
                .with_no_client_auth()
        } else {
            let roots = rustls::RootCertStore::from_iter(
                webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
            );
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        };

        Ok(Self {
            connector: tokio_rustls::TlsConnector::from(Arc::new(tls)),
            config,
        })
    }

    /// Splits `host:port` into its parts, defaulting the port to 853.
    fn split_address(address: &str) -> (String, u16) {
        match address.rfind(':') {
            Some(idx) if address[idx + 1..].chars().all(|c| c.is_ascii_digit()) => {
                let port = address[idx + 1..].parse().unwrap_or(crate::upstream::DOT_PORT);
                (address[..idx].to_string(), port)
            }
            _ => (address.to_string(), crate::upstream::DOT_PORT),
        }
    }

    async fn connect_tcp(&self, address: &str) -> io::Result<tokio::net::TcpStream> {
        let mut addrs = tokio::net::lookup_host(address).await?;
        let addr = addrs.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses for [{}]", address),
            )
        })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        if self.config.use_tfo {
            set_tcp_fastopen_connect(&socket, address);
        }

        let stream = timeout(self.config.timeout, socket.connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timeout"))??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

#[async_trait]
impl Transport for DotTransport {
    async fn dial(&self, address: &str) -> io::Result<BoxedConn> {
        let started = Instant::now();
        let (host, _port) = Self::split_address(address);

        let stream = self.connect_tcp(address).await?;

        let server_name = ServerName::try_from(host.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let tls_stream = timeout(self.config.timeout, self.connector.connect(server_name, stream))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "tls handshake timeout"))??;

        fennec_metrics::observe_tls_timer(address, started.elapsed());
        debug!(address, elapsed = ?started.elapsed(), "dialed upstream over tls");
        Ok(Box::new(tls_stream))
    }

    async fn exchange(
        &self,
        msg: &Message,
        conn: &mut BoxedConn,
    ) -> io::Result<(Message, Duration)> {
        let started = Instant::now();
        let reply = timeout(self.config.timeout, exchange_framed(msg, conn))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "exchange timeout"))??;

        if reply.id() != msg.id() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "response id does not match query",
            ));
        }

        let rtt = started.elapsed();
        trace!(id = msg.id(), ?rtt, "exchange complete");
        Ok((reply, rtt))
    }
}

/// One length-prefixed write followed by one length-prefixed read.
async fn exchange_framed(msg: &Message, conn: &mut BoxedConn) -> io::Result<Message> {
    let wire = msg.to_wire();
    if wire.len() > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "query exceeds maximum message size",
        ));
    }

    conn.write_all(&(wire.len() as u16).to_be_bytes()).await?;
    conn.write_all(&wire).await?;
    conn.flush().await?;

    let mut len_buf = [0u8; 2];
    conn.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "empty reply frame",
        ));
    }

    let mut body = vec![0u8; len];
    conn.read_exact(&mut body).await?;

    Message::parse(&body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Enables TCP Fast Open on the connect socket. Kernel support varies, so a
/// failure only logs.
#[cfg(target_os = "linux")]
fn set_tcp_fastopen_connect(socket: &TcpSocket, address: &str) {
    use std::os::fd::AsRawFd;

    let enabled: libc::c_int = 1;
    // Safety: the fd is owned by `socket` and stays open for the call; the
    // option value is a plain int.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_TCP,
            libc::TCP_FASTOPEN_CONNECT,
            &enabled as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        warn!(
            address,
            error = %io::Error::last_os_error(),
            "could not enable tcp fast open, continuing without it"
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn set_tcp_fastopen_connect(_socket: &TcpSocket, address: &str) {
    warn!(address, "tcp fast open is not supported on this platform");
}

/// Certificate verifier that accepts everything. Only reachable through
/// `skip_upstream_verification`.
#[derive(Debug)]
struct NoVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fennec_proto::{Name, Question, ResourceRecord};
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn install_crypto_provider() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    #[test]
    fn splits_addresses() {
        assert_eq!(
            DotTransport::split_address("dns.example:8853"),
            ("dns.example".to_string(), 8853)
        );
        assert_eq!(
            DotTransport::split_address("dns.example"),
            ("dns.example".to_string(), 853)
        );
    }

    #[test]
    fn builds_with_and_without_verification() {
        install_crypto_provider();
        assert!(DotTransport::new(DotConfig::default()).is_ok());
        assert!(
            DotTransport::new(DotConfig {
                skip_verification: true,
                ..DotConfig::default()
            })
            .is_ok()
        );
    }

    #[tokio::test]
    async fn exchange_speaks_length_prefixed_dns() {
        install_crypto_provider();
        let transport = DotTransport::new(DotConfig::default()).unwrap();

        let (client, mut server) = tokio::io::duplex(4096);
        let mut conn: BoxedConn = Box::new(client);

        let query = Message::query(Question::a(Name::from_str("example.com").unwrap()));
        let query_id = query.id();

        // Scripted upstream: read one frame, answer it.
        let upstream = tokio::spawn(async move {
            let mut len_buf = [0u8; 2];
            server.read_exact(&mut len_buf).await.unwrap();
            let mut body = vec![0u8; u16::from_be_bytes(len_buf) as usize];
            server.read_exact(&mut body).await.unwrap();

            let received = Message::parse(&body).unwrap();
            let mut reply = Message::response_from(&received);
            reply.add_answer(ResourceRecord::a(
                Name::from_str("example.com").unwrap(),
                30,
                Ipv4Addr::new(5, 6, 7, 8),
            ));

            let wire = reply.to_wire();
            server
                .write_all(&(wire.len() as u16).to_be_bytes())
                .await
                .unwrap();
            server.write_all(&wire).await.unwrap();
        });

        let (reply, rtt) = transport.exchange(&query, &mut conn).await.unwrap();
        upstream.await.unwrap();

        assert_eq!(reply.id(), query_id);
        assert_eq!(reply.answers().len(), 1);
        assert!(rtt > Duration::ZERO);
    }

    #[tokio::test]
    async fn exchange_rejects_mismatched_ids() {
        install_crypto_provider();
        let transport = DotTransport::new(DotConfig::default()).unwrap();

        let (client, mut server) = tokio::io::duplex(4096);
        let mut conn: BoxedConn = Box::new(client);

        let query = Message::query(Question::a(Name::from_str("example.com").unwrap()));

        let upstream = tokio::spawn(async move {
            let mut len_buf = [0u8; 2];
            server.read_exact(&mut len_buf).await.unwrap();
            let mut body = vec![0u8; u16::from_be_bytes(len_buf) as usize];
            server.read_exact(&mut body).await.unwrap();

            let received = Message::parse(&body).unwrap();
            let mut reply = Message::response_from(&received);
            reply.set_id(received.id().wrapping_add(1));

            let wire = reply.to_wire();
            server
                .write_all(&(wire.len() as u16).to_be_bytes())
                .await
                .unwrap();
            server.write_all(&wire).await.unwrap();
        });

        let err = transport.exchange(&query, &mut conn).await.unwrap_err();
        upstream.await.unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
