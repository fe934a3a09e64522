use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::cow::{OrderBook, OrderStatus, OrderUid};
use crate::flow::StatusUpdate;

/// Receiver of polled order statuses.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn record_status(&self, uid: &OrderUid, status: OrderStatus) -> StatusUpdate;
}

/// Poll the order book for `uid` until it reaches a terminal status.
///
/// Failed polls are logged and retried on the next tick. Returns the terminal
/// status, or `None` if the sink stopped tracking this uid first.
pub async fn run_order_status_poller(
    order_book: Arc<dyn OrderBook>,
    uid: OrderUid,
    poll_interval: Duration,
    sink: Arc<dyn StatusSink>,
) -> Option<OrderStatus> {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(
        order_uid = %uid,
        interval_ms = poll_interval.as_millis() as u64,
        "Order status poller started"
    );

    loop {
        ticker.tick().await;

        let order = match order_book.get_order(&uid).await {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(order_uid = %uid, error = %e, "Status poller: order lookup failed");
                continue;
            }
        };

        match sink.record_status(&uid, order.status).await {
            StatusUpdate::Terminal => {
                tracing::info!(order_uid = %uid, status = %order.status, "Status poller: order settled");
                return Some(order.status);
            }
            StatusUpdate::Ignored => {
                tracing::debug!(order_uid = %uid, "Status poller: order no longer tracked, stopping");
                return None;
            }
            StatusUpdate::Updated => {
                tracing::debug!(order_uid = %uid, status = %order.status, "Status poller: order pending");
            }
        }
    }
}
