use alloy::primitives::TxHash;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::deposit::FlowAction;
use crate::chain::ChainError;
use crate::cow::OrderBookError;
use crate::models::AmountError;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("no quote available for this amount")]
    NoQuote,

    #[error("quote expired at {0}")]
    StaleQuote(DateTime<Utc>),

    #[error("no order has been submitted")]
    NoOrder,

    #[error("cannot {action} while the deposit is {stage}")]
    InvalidState {
        action: &'static str,
        stage: &'static str,
    },

    #[error("a {0} action is already in progress")]
    Busy(FlowAction),

    #[error("cooldown active until {0}")]
    CooldownActive(DateTime<Utc>),

    #[error("queued transaction expired at {0}")]
    QueuedTxExpired(DateTime<Utc>),

    #[error("delay module already has {0} pending transaction(s)")]
    QueueOccupied(u64),

    #[error("transaction {0} is not confirmed yet")]
    TxUnconfirmed(TxHash),

    #[error("order book error: {0}")]
    OrderBook(#[from] OrderBookError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("background task failed: {0}")]
    Task(String),
}
