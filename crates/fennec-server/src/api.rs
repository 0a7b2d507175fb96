//! HTTP admin API.
//!
//! A small axum router on the configured HTTP port:
//!
//! - `GET /v1/config` — the running configuration as JSON
//! - `GET /v1/shutdown` — triggers graceful process shutdown
//! - `GET /metrics` — Prometheus exposition text
//!
//! Every response carries the `X-Clacks-Overhead` header.

use super::Result;
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use fennec_config::Config;
use fennec_metrics::prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// The overhead: names carried in packet headers, per GNU Terry Pratchett.
const CLACKS_HEADER: &str = "X-Clacks-Overhead";
const CLACKS_VALUE: &str = "GNU Terry Pratchett";

/// Shared state behind the admin routes.
#[derive(Clone)]
pub struct AdminState {
    /// The running configuration, served verbatim.
    pub config: Arc<Config>,

    /// Renders the Prometheus exposition.
    pub prometheus: PrometheusHandle,

    /// Signals process shutdown.
    pub shutdown: broadcast::Sender<()>,
}

/// The admin HTTP server.
pub struct AdminApi {
    state: AdminState,
}

impl AdminApi {
    /// Creates the admin API over the given state.
    pub fn new(state: AdminState) -> Self {
        Self { state }
    }

    /// Builds the router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/config", get(get_config))
            .route("/v1/shutdown", get(shutdown))
            .route("/metrics", get(metrics))
            .layer(middleware::from_fn(add_clacks_header))
            .with_state(self.state.clone())
    }

    /// Binds and serves the API until the task is dropped.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "admin api listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn add_clacks_header(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(CLACKS_HEADER, HeaderValue::from_static(CLACKS_VALUE));
    response
}

async fn get_config(State(state): State<AdminState>) -> Json<Config> {
    Json(state.config.as_ref().clone())
}

async fn shutdown(State(state): State<AdminState>) -> impl IntoResponse {
    info!("shutdown requested via admin api");
    // Nobody listening means we are already going down; nothing to do.
    let _ = state.shutdown.send(());
    Json(serde_json::json!({"message": "shutting down server"}))
}

async fn metrics(State(state): State<AdminState>) -> String {
    state.prometheus.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::{Request as HttpRequest, StatusCode};
    use once_cell::sync::Lazy;
    use tower::ServiceExt;

    // The Prometheus recorder is process-global; install it once for every
    // test in this module.
    static PROMETHEUS: Lazy<PrometheusHandle> =
        Lazy::new(|| fennec_metrics::prometheus::install_recorder().unwrap());

    fn api() -> (AdminApi, broadcast::Receiver<()>) {
        let (shutdown, rx) = broadcast::channel(1);
        let state = AdminState {
            config: Arc::new(Config::default()),
            prometheus: PROMETHEUS.clone(),
            shutdown,
        };
        (AdminApi::new(state), rx)
    }

    async fn request(api: &AdminApi, path: &str) -> Response {
        api.router()
            .oneshot(
                HttpRequest::builder()
                    .uri(path)
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn config_endpoint_returns_the_running_config() {
        let (api, _rx) = api();
        let response = request(&api, "/v1/config").await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: Config = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.dns_port, Config::default().dns_port);
    }

    #[tokio::test]
    async fn every_response_carries_the_clacks_header() {
        let (api, _rx) = api();
        for path in ["/v1/config", "/metrics", "/no-such-route"] {
            let response = request(&api, path).await;
            assert_eq!(
                response.headers().get(CLACKS_HEADER).unwrap(),
                CLACKS_VALUE,
                "missing header on {}",
                path
            );
        }
    }

    #[tokio::test]
    async fn shutdown_endpoint_signals_the_channel() {
        let (api, mut rx) = api();
        let response = request(&api, "/v1/shutdown").await;

        assert_eq!(response.status(), StatusCode::OK);
        rx.recv().await.unwrap();

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("shutting down"));
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_exposition_text() {
        let (api, _rx) = api();
        fennec_metrics::record_query();

        let response = request(&api, "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains(fennec_metrics::TOTAL_DNS_QUERIES));
    }
}
