//! Prometheus metrics exporter.
//!
//! The recorder is installed once at startup; the returned handle renders
//! the exposition text and is served by the admin API under `/metrics`.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub use metrics_exporter_prometheus::PrometheusHandle;

/// Installs the global Prometheus recorder and returns its rendering handle.
///
/// Fails if another recorder was installed first.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::debug!("prometheus recorder installed");
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_recorded_metrics() {
        // Recorder installation is process-global; tolerate another test (or
        // a previous run in the same binary) having installed one.
        let Ok(handle) = install_recorder() else {
            return;
        };

        crate::record_query();
        crate::record_upstream_error("upstream.test:853");

        let rendered = handle.render();
        assert!(rendered.contains(crate::TOTAL_DNS_QUERIES));
        assert!(rendered.contains("upstream.test:853"));
    }
}
