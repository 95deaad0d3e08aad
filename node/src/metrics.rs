//! # Prometheus Metrics
//!
//! Exposes ledger activity for the vault host. Scraped by Prometheus at the
//! `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] under
//! the `kipu` namespace so they do not collide with any default global
//! registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use kipu_protocol::Wei;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Deposits committed by the ledger (receive and fallback included).
    pub deposits_total: IntCounter,
    /// Withdrawals committed by the ledger.
    pub withdrawals_total: IntCounter,
    /// Calls the ledger refused, labelled by error name.
    pub rejected_calls_total: IntCounterVec,
    /// Current reserves in wei, saturated at `i64::MAX`.
    pub reserves_wei: IntGauge,
    /// Distinct accounts that have ever held a balance.
    pub accounts: IntGauge,
    /// Time spent holding the ledger lock per call.
    pub call_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("kipu".into()), None)
            .expect("failed to create prometheus registry");

        let deposits_total =
            IntCounter::new("deposits_total", "Total number of committed deposits")
                .expect("metric creation");
        registry
            .register(Box::new(deposits_total.clone()))
            .expect("metric registration");

        let withdrawals_total =
            IntCounter::new("withdrawals_total", "Total number of committed withdrawals")
                .expect("metric creation");
        registry
            .register(Box::new(withdrawals_total.clone()))
            .expect("metric registration");

        let rejected_calls_total = IntCounterVec::new(
            Opts::new(
                "rejected_calls_total",
                "Calls refused by the ledger, by error name",
            ),
            &["error"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(rejected_calls_total.clone()))
            .expect("metric registration");

        let reserves_wei = IntGauge::new("reserves_wei", "Value currently held by the vault")
            .expect("metric creation");
        registry
            .register(Box::new(reserves_wei.clone()))
            .expect("metric registration");

        let accounts = IntGauge::new("accounts", "Accounts with a ledger entry")
            .expect("metric creation");
        registry
            .register(Box::new(accounts.clone()))
            .expect("metric registration");

        let call_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "call_latency_seconds",
                "Time spent executing a call against the ledger",
            )
            .buckets(vec![
                0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(call_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            deposits_total,
            withdrawals_total,
            rejected_calls_total,
            reserves_wei,
            accounts,
            call_latency_seconds,
        }
    }

    /// Updates the gauges from a ledger snapshot.
    pub fn observe_ledger(&self, reserves: Wei, accounts: usize) {
        self.reserves_wei
            .set(i64::try_from(reserves).unwrap_or(i64::MAX));
        self.accounts
            .set(i64::try_from(accounts).unwrap_or(i64::MAX));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_output_carries_namespace() {
        let metrics = NodeMetrics::new();
        metrics.deposits_total.inc();
        metrics
            .rejected_calls_total
            .with_label_values(&["InvalidAmount"])
            .inc();

        let text = metrics.encode().unwrap();
        assert!(text.contains("kipu_deposits_total 1"));
        assert!(text.contains("kipu_rejected_calls_total{error=\"InvalidAmount\"} 1"));
    }

    #[test]
    fn reserves_gauge_saturates() {
        let metrics = NodeMetrics::new();
        metrics.observe_ledger(Wei::MAX, 3);
        assert_eq!(metrics.reserves_wei.get(), i64::MAX);
        assert_eq!(metrics.accounts.get(), 3);
    }
}
