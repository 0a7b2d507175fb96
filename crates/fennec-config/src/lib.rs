//! # fennec-config
//!
//! JSON configuration for the fennec resolver.
//!
//! The configuration is a single strict JSON document: unknown fields are
//! rejected so typos fail at startup instead of silently doing nothing. It
//! is loaded once, validated, and then passed by value (or `Arc`) into the
//! components that need it; nothing reads configuration at request time.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Default connection pool size per upstream.
pub const DEFAULT_MAX_CONNS_PER_HOST: usize = 3;

/// Default upstream exchange timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Protocol the DNS listener speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ListenProtocol {
    /// Plain UDP (the default).
    #[default]
    #[serde(rename = "udp")]
    Udp,

    /// Plain TCP.
    #[serde(rename = "tcp")]
    Tcp,

    /// TCP with TLS; requires certificate material in [`TlsConfig`].
    #[serde(rename = "tcp-tls")]
    TcpTls,
}

/// TLS material for the TCP-TLS listener.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsConfig {
    /// Path to the PEM certificate chain.
    pub cert_file: Option<PathBuf>,

    /// Path to the PEM private key.
    pub key_file: Option<PathBuf>,
}

/// A log sink's settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Whether this log is emitted at all.
    pub enabled: bool,

    /// Log level filter (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

/// The full resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Zone files whose records are served from the hosted cache.
    pub zone_files: Vec<PathBuf>,

    /// Port the DNS listener binds.
    pub dns_port: u16,

    /// Port the admin HTTP API binds.
    pub http_port: u16,

    /// Legacy upstream list; used only when `upstreams` is empty.
    pub resolvers: Vec<String>,

    /// Upstream resolver names. A bare name dials `name:853`.
    pub upstreams: Vec<String>,

    /// Maximum pooled connections per upstream (0 means the default of 3).
    pub max_conns_per_host: usize,

    /// Extra exchange attempts after the first failure.
    pub upstream_retries: u32,

    /// In-flight query bound (0 means the number of hardware threads).
    pub concurrent_queries: usize,

    /// Dial and exchange timeout in milliseconds (0 means 5000).
    pub timeout_ms: u64,

    /// Listener protocol.
    pub listen_protocol: ListenProtocol,

    /// Skip certificate verification of upstream resolvers.
    pub skip_upstream_verification: bool,

    /// Enable TCP Fast Open on upstream dials.
    pub use_tfo: bool,

    /// Listener TLS material.
    pub tls_config: TlsConfig,

    /// Server log settings.
    pub server_log: LogConfig,

    /// Per-query log settings.
    pub query_log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zone_files: Vec::new(),
            dns_port: 53,
            http_port: 8080,
            resolvers: Vec::new(),
            upstreams: Vec::new(),
            max_conns_per_host: DEFAULT_MAX_CONNS_PER_HOST,
            upstream_retries: 0,
            concurrent_queries: 0,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            listen_protocol: ListenProtocol::default(),
            skip_upstream_verification: false,
            use_tfo: false,
            tls_config: TlsConfig::default(),
            server_log: LogConfig::default(),
            query_log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Loads and validates configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.listen_protocol == ListenProtocol::TcpTls {
            if self.tls_config.cert_file.is_none() {
                return Err(ConfigError::InvalidValue {
                    field: "tls_config.cert_file".to_string(),
                    message: "required when listen_protocol is tcp-tls".to_string(),
                });
            }
            if self.tls_config.key_file.is_none() {
                return Err(ConfigError::InvalidValue {
                    field: "tls_config.key_file".to_string(),
                    message: "required when listen_protocol is tcp-tls".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Upstream names to use, honoring the legacy `resolvers` field when
    /// `upstreams` is not set.
    pub fn upstream_names(&self) -> &[String] {
        if self.upstreams.is_empty() {
            &self.resolvers
        } else {
            &self.upstreams
        }
    }

    /// Effective per-upstream pool capacity.
    pub fn max_conns_per_host(&self) -> usize {
        if self.max_conns_per_host == 0 {
            DEFAULT_MAX_CONNS_PER_HOST
        } else {
            self.max_conns_per_host
        }
    }

    /// Effective dial/exchange timeout.
    pub fn timeout(&self) -> Duration {
        let ms = if self.timeout_ms == 0 {
            DEFAULT_TIMEOUT_MS
        } else {
            self.timeout_ms
        };
        Duration::from_millis(ms)
    }

    /// Effective in-flight query bound.
    pub fn concurrency(&self) -> usize {
        if self.concurrent_queries == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.concurrent_queries
        }
    }
}
