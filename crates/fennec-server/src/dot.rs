//! TCP-TLS listener.
//!
//! The tcp-tls listen mode wraps the TCP frame protocol in TLS using
//! certificate material from the configuration. Missing or unparsable
//! material is a fatal startup error.

use super::handler::QueryHandler;
use super::tcp::{DEFAULT_IDLE_TIMEOUT, bind_tcp_listener, serve_stream};
use super::{Protocol, Result, ServerError};
use rustls::ServerConfig;
use rustls::pki_types::CertificateDer;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

/// TLS DNS listener.
pub struct DotServer {
    listener: TcpListener,
    tls_acceptor: TlsAcceptor,
    handler: Arc<dyn QueryHandler>,
    local_addr: SocketAddr,
    idle_timeout: Duration,
}

impl DotServer {
    /// Loads the listener's TLS configuration from PEM files.
    pub fn load_tls_config<P: AsRef<Path>>(cert_path: P, key_path: P) -> Result<Arc<ServerConfig>> {
        let cert_file = File::open(cert_path.as_ref())
            .map_err(|e| ServerError::Tls(format!("could not open certificate file: {}", e)))?;
        let mut cert_reader = BufReader::new(cert_file);
        let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ServerError::Tls(format!("could not parse certificates: {}", e)))?;

        if certs.is_empty() {
            return Err(ServerError::Tls("no certificates found in file".into()));
        }

        let key_file = File::open(key_path.as_ref())
            .map_err(|e| ServerError::Tls(format!("could not open key file: {}", e)))?;
        let mut key_reader = BufReader::new(key_file);
        let key = rustls_pemfile::private_key(&mut key_reader)
            .map_err(|e| ServerError::Tls(format!("could not parse private key: {}", e)))?
            .ok_or_else(|| ServerError::Tls("no private key found in file".into()))?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::Tls(format!("could not build tls config: {}", e)))?;

        Ok(Arc::new(config))
    }

    /// Binds a TLS listener on the given address.
    pub async fn bind(
        addr: SocketAddr,
        tls_config: Arc<ServerConfig>,
        handler: Arc<dyn QueryHandler>,
    ) -> Result<Self> {
        let listener = bind_tcp_listener(addr)?;
        let local_addr = listener.local_addr()?;
        let tls_acceptor = TlsAcceptor::from(tls_config);

        info!(addr = %local_addr, "tcp-tls listener bound");

        Ok(Self {
            listener,
            tls_acceptor,
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
                    let tls_acceptor = self.tls_acceptor.clone();
                    let handler = self.handler.clone();
                    let idle_timeout = self.idle_timeout;

                    tokio::spawn(async move {
                        match tls_acceptor.accept(stream).await {
                            Ok(tls_stream) => {
                                if let Err(e) = serve_stream(
                                    tls_stream,
                                    peer,
                                    handler,
                                    Protocol::Dot,
                                    idle_timeout,
                                )
                                .await
                                {
                                    debug!(error = %e, client = %peer, "tcp-tls connection error");
                                }
                            }
                            Err(e) => {
                                debug!(error = %e, client = %peer, "tls handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "error accepting tcp-tls connection");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RefusedHandler;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn install_crypto_provider() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    fn generate_test_cert() -> (NamedTempFile, NamedTempFile) {
        use rcgen::{CertifiedKey, generate_simple_self_signed};

        let subject_alt_names = vec!["localhost".to_string(), "127.0.0.1".to_string()];
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(subject_alt_names).unwrap();

        let mut cert_file = NamedTempFile::new().unwrap();
        cert_file.write_all(cert.pem().as_bytes()).unwrap();

        let mut key_file = NamedTempFile::new().unwrap();
        key_file
            .write_all(key_pair.serialize_pem().as_bytes())
            .unwrap();

        (cert_file, key_file)
    }

    #[tokio::test]
    async fn binds_with_generated_cert() {
        install_crypto_provider();
        let (cert_file, key_file) = generate_test_cert();
        let tls_config = DotServer::load_tls_config(cert_file.path(), key_file.path()).unwrap();

        let server = DotServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            tls_config,
            Arc::new(RefusedHandler),
        )
        .await
        .unwrap();

        assert!(server.local_addr().port() > 0);
    }

    #[test]
    fn missing_cert_files_are_fatal() {
        let result = DotServer::load_tls_config("/nonexistent/cert.pem", "/nonexistent/key.pem");
        assert!(matches!(result, Err(ServerError::Tls(_))));
    }
}
