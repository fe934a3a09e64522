use anyhow::Context;
use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::cow::OrderStatus;

/// Install the Prometheus exporter and register all application metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    // Pre-register counters so they appear even before the first increment.
    counter!("quote_requests_total").absolute(0);
    counter!("quote_failures_total").absolute(0);
    counter!("orders_submitted_total").absolute(0);
    counter!("orders_rejected_total").absolute(0);
    counter!("presignatures_queued_total").absolute(0);
    counter!("presignatures_executed_total").absolute(0);
    for status in [OrderStatus::Fulfilled, OrderStatus::Cancelled, OrderStatus::Expired] {
        counter!("orders_settled_total", "status" => status.to_string()).absolute(0);
    }

    Ok(handle)
}
