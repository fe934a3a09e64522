use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cow::OrderStatus;
use crate::flow::DepositView;

/// Messages broadcast to all connected WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    #[serde(rename = "deposit_update")]
    DepositUpdate(DepositView),

    #[serde(rename = "order_status")]
    OrderStatus(OrderStatusEvent),
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusEvent {
    pub order_uid: String,
    pub status: OrderStatus,
    pub terminal: bool,
    pub observed_at: DateTime<Utc>,
}
