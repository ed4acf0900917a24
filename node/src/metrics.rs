//! # Prometheus Metrics
//!
//! Operational metrics for the vault node, scraped at `/metrics` on the
//! metrics port. Everything lives in a dedicated [`prometheus::Registry`]
//! under the `multivault` namespace.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use multivault_protocol::config::PRICE_PRECISION;
use multivault_protocol::Amount;
use prometheus::core::Collector;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metric handles for the node. Prometheus handles are `Arc`s inside, so
/// cloning is cheap.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Successful deposits.
    pub deposits_total: IntCounter,
    /// Successful withdrawals.
    pub withdrawals_total: IntCounter,
    /// Vault calls that reverted, any entry point.
    pub reverted_calls_total: IntCounter,
    /// Vaults harvested by the keeper or the API.
    pub hard_works_total: IntCounter,
    /// Harvest batches that aborted on a vault failure.
    pub hard_work_failures_total: IntCounter,
    /// Native currency reimbursed to the harvester.
    pub compensation_paid_total: IntCounter,
    /// Vault TVL in USD, from the price oracle.
    pub tvl_usd: Gauge,
    /// Simulated chain height.
    pub block_height: IntGauge,
    /// Wall-clock latency of vault calls made by API handlers.
    pub vault_call_latency_seconds: Histogram,
}

fn register<C: Collector + Clone + 'static>(
    registry: &Registry,
    metric: C,
) -> Result<C, prometheus::Error> {
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("multivault".into()), None)?;

        let deposits_total = register(
            &registry,
            IntCounter::new("deposits_total", "Successful vault deposits")?,
        )?;
        let withdrawals_total = register(
            &registry,
            IntCounter::new("withdrawals_total", "Successful vault withdrawals")?,
        )?;
        let reverted_calls_total = register(
            &registry,
            IntCounter::new("reverted_calls_total", "Vault calls that reverted")?,
        )?;
        let hard_works_total = register(
            &registry,
            IntCounter::new("hard_works_total", "Vault harvests completed")?,
        )?;
        let hard_work_failures_total = register(
            &registry,
            IntCounter::new(
                "hard_work_failures_total",
                "Harvest batches aborted by a failing vault",
            )?,
        )?;
        let compensation_paid_total = register(
            &registry,
            IntCounter::new(
                "compensation_paid_total",
                "Native currency reimbursed to the harvester for gas",
            )?,
        )?;
        let tvl_usd = register(
            &registry,
            Gauge::new("tvl_usd", "Vault total value locked in USD")?,
        )?;
        let block_height = register(
            &registry,
            IntGauge::new("block_height", "Simulated chain height")?,
        )?;
        let vault_call_latency_seconds = register(
            &registry,
            Histogram::with_opts(
                HistogramOpts::new(
                    "vault_call_latency_seconds",
                    "Latency of vault calls made by API handlers",
                )
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
            )?,
        )?;

        Ok(Self {
            registry,
            deposits_total,
            withdrawals_total,
            reverted_calls_total,
            hard_works_total,
            hard_work_failures_total,
            compensation_paid_total,
            tvl_usd,
            block_height,
            vault_call_latency_seconds,
        })
    }

    /// Records a harvest's gas reimbursement. Saturates at `u64::MAX`.
    pub fn record_compensation(&self, amount: Amount) {
        self.compensation_paid_total
            .inc_by(u64::try_from(amount).unwrap_or(u64::MAX));
    }

    /// Sets the TVL gauge from an 18-decimal USD amount.
    pub fn set_tvl(&self, tvl: Amount) {
        let whole = (tvl / PRICE_PRECISION) as f64;
        let frac = (tvl % PRICE_PRECISION) as f64 / PRICE_PRECISION as f64;
        self.tvl_usd.set(whole + frac);
    }

    /// Encodes all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Renders `/metrics`. HTTP 500 if encoding fails.
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
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_output_is_namespaced() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.deposits_total.inc();
        metrics.set_tvl(1_250 * PRICE_PRECISION + PRICE_PRECISION / 2);

        let body = metrics.encode().unwrap();
        assert!(body.contains("multivault_deposits_total 1"));
        assert!(body.contains("multivault_tvl_usd 1250.5"));
    }

    #[test]
    fn oversized_compensation_saturates() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.record_compensation(u128::MAX);
        assert_eq!(metrics.compensation_paid_total.get(), u64::MAX);
    }
}
