//! Prometheus metrics exposition
//!
//! Registers and exposes the service metrics:
//!
//! - `token_renewals_total` (counter): label `outcome`
//! - `renewal_duration_seconds` (histogram)
//! - `merchant_api_requests_total` (counter): label `status`
//! - `merchant_api_forced_renewals_total` (counter)
//! - `webhook_events_total` (counter): label `mapped`
//!
//! The counters and histograms themselves are emitted where the work
//! happens (guard renewals, wrapper calls, event dispatch); this module
//! only installs the recorder and shapes the histogram buckets.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `renewal_duration_seconds` gets explicit buckets so it renders as a
/// Prometheus histogram (with `_bucket` lines for `histogram_quantile()`
/// queries) rather than a summary. A renewal is one vendor round trip, so
/// the buckets span 50ms to the 10s client timeout.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full("renewal_duration_seconds".to_string()),
            &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}
