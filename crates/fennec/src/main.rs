//! fennec — a caching DNS-over-TLS forwarding resolver.
//!
//! Startup wires the pieces together in dependency order: configuration,
//! logging, metrics, caches, the connection pool and transport, zone files,
//! connection warming, the admin API, and finally the DNS listener. The
//! process runs until a signal arrives or the admin API asks for shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use fennec_cache::{DEFAULT_SWEEP_INTERVAL, RecordCache};
use fennec_config::{Config, ListenProtocol};
use fennec_metrics::tracing_setup::{LogConfig, LogFormat, init_tracing, parse_level};
use fennec_resolver::{ConnPool, DotTransport, Forwarder, Upstream};
use fennec_resolver::client::DotConfig;
use fennec_server::{AdminApi, AdminState, DotServer, QueryHandler, QueryPipeline, TcpServer, UdpServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// fennec — caching recursive DNS resolver over DNS-over-TLS upstreams.
#[derive(Parser, Debug)]
#[command(name = "fennec")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Location of the fennec configuration file.
    #[arg(long = "conf", value_name = "FILE")]
    conf: PathBuf,

    /// Write a CPU profile to this file.
    #[arg(long = "cpuprofile", value_name = "FILE")]
    cpuprofile: Option<PathBuf>,
}

fn init_logging(config: &Config) {
    // A disabled server log still surfaces errors.
    let level = if config.server_log.enabled {
        parse_level(&config.server_log.level)
    } else {
        tracing::Level::ERROR
    };

    let log_config = LogConfig {
        level,
        format: LogFormat::Text,
        query_log: config.query_log.enabled,
    };
    init_tracing(&log_config);
}

/// Builds the resolution engine: pool, transport, forwarder.
fn build_forwarder(config: &Config) -> Result<Arc<Forwarder>> {
    let pool = Arc::new(ConnPool::new(config.max_conns_per_host()));
    let transport = Arc::new(
        DotTransport::new(DotConfig {
            timeout: config.timeout(),
            skip_verification: config.skip_upstream_verification,
            use_tfo: config.use_tfo,
        })
        .context("could not build DoT transport")?,
    );

    let forwarder = Arc::new(Forwarder::new(pool, transport, config.upstream_retries));
    for name in config.upstream_names() {
        forwarder.add_upstream(Upstream::new(name.clone()));
    }
    Ok(forwarder)
}

/// Loads every configured zone file into the hosted cache. Any failure is
/// fatal at startup.
fn load_zones(config: &Config, hosted: &RecordCache) -> Result<()> {
    for file in &config.zone_files {
        let responses = fennec_zone::load_zone_file(file)
            .with_context(|| format!("could not load zone file [{}]", file.display()))?;
        let count = responses.len();
        for response in responses {
            hosted.add(response);
        }
        info!(file = %file.display(), records = count, "hosted zone records loaded");
    }
    Ok(())
}

/// Runs the configured DNS listener. Never returns unless the listener
/// fails.
async fn run_listener(
    config: &Config,
    handler: Arc<dyn QueryHandler>,
) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], config.dns_port).into();

    match config.listen_protocol {
        ListenProtocol::Udp => {
            let server = UdpServer::bind(addr, handler)
                .await
                .context("could not bind udp listener")?;
            server.run().await?;
        }
        ListenProtocol::Tcp => {
            let server = TcpServer::bind(addr, handler)
                .await
                .context("could not bind tcp listener")?;
            server.run().await?;
        }
        ListenProtocol::TcpTls => {
            let cert = config
                .tls_config
                .cert_file
                .as_ref()
                .context("tcp-tls requires tls_config.cert_file")?;
            let key = config
                .tls_config
                .key_file
                .as_ref()
                .context("tcp-tls requires tls_config.key_file")?;
            let tls_config = DotServer::load_tls_config(cert, key)
                .context("could not load listener tls material")?;
            let server = DotServer::bind(addr, tls_config, handler)
                .await
                .context("could not bind tcp-tls listener")?;
            server.run().await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.conf)
        .with_context(|| format!("could not open configuration [{}]", cli.conf.display()))?;

    init_logging(&config);
    info!(conf = %cli.conf.display(), "configuration loaded");

    if cli.cpuprofile.is_some() {
        warn!("cpu profiling is not compiled into this build, ignoring --cpuprofile");
    }

    // rustls needs a process-wide crypto provider before any TLS config is
    // built. A second install (tests, embedding) is harmless.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let prometheus = fennec_metrics::prometheus::install_recorder()
        .map_err(|e| anyhow::anyhow!("could not install metrics recorder: {}", e))?;

    // Caches: the lookup cache reaps expired entries; the hosted cache keeps
    // zone records forever.
    let lookup = Arc::new(RecordCache::new(DEFAULT_SWEEP_INTERVAL));
    lookup.start_reaper();
    let hosted = Arc::new(RecordCache::hosted());

    let forwarder = build_forwarder(&config)?;
    load_zones(&config, &hosted)?;

    info!(
        upstreams = config.upstream_names().len(),
        max_conns_per_host = config.max_conns_per_host(),
        "warming upstream connections"
    );
    forwarder.warm_connections().await;

    let pipeline: Arc<dyn QueryHandler> = Arc::new(QueryPipeline::new(
        lookup.clone(),
        hosted.clone(),
        forwarder,
        config.concurrency(),
    ));

    // Shutdown fans out from signals and the admin API.
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

    let admin = AdminApi::new(AdminState {
        config: Arc::new(config.clone()),
        prometheus,
        shutdown: shutdown_tx.clone(),
    });
    let http_addr: SocketAddr = ([0, 0, 0, 0], config.http_port).into();
    tokio::spawn(async move {
        if let Err(e) = admin.serve(http_addr).await {
            error!(error = %e, "admin api failed");
        }
    });

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("could not register SIGTERM handler")?;

    info!(
        port = config.dns_port,
        protocol = ?config.listen_protocol,
        "fennec started"
    );

    tokio::select! {
        result = run_listener(&config, pipeline) => {
            result?;
        }
        _ = signal::ctrl_c() => {
            info!("received interrupt, shutting down");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
        _ = shutdown_rx.recv() => {
            info!("shutdown requested via admin api");
        }
    }

    lookup.stop();
    info!("fennec stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_requires_conf() {
        assert!(Cli::try_parse_from(["fennec"]).is_err());

        let cli = Cli::try_parse_from(["fennec", "--conf", "/etc/fennec.json"]).unwrap();
        assert_eq!(cli.conf, PathBuf::from("/etc/fennec.json"));
        assert!(cli.cpuprofile.is_none());

        let cli = Cli::try_parse_from([
            "fennec",
            "--conf",
            "/etc/fennec.json",
            "--cpuprofile",
            "/tmp/prof",
        ])
        .unwrap();
        assert_eq!(cli.cpuprofile, Some(PathBuf::from("/tmp/prof")));
    }
}
