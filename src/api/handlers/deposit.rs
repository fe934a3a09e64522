use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::chain::TxReceipt;
use crate::errors::AppError;
use crate::flow::{DepositView, QueuedTx, QuoteStatus};
use crate::models::QuoteView;
use crate::AppState;

use super::ApiResponse;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct AmountRequest {
    /// Sell amount in token units, e.g. "100" or "12.5".
    pub amount: String,
}

#[derive(Serialize)]
pub struct QuoteResponse {
    pub status: QuoteStatus,
    pub quote: Option<QuoteView>,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_uid: String,
    pub explorer_url: String,
    pub quote: QuoteView,
}

#[derive(Serialize)]
pub struct QueueResponse {
    pub tx_hash: String,
    pub queued_at: String,
    pub executable_at: String,
    pub expires_at: Option<String>,
}

impl From<QueuedTx> for QueueResponse {
    fn from(q: QueuedTx) -> Self {
        Self {
            tx_hash: q.tx_hash.to_string(),
            queued_at: q.queued_at.to_rfc3339(),
            executable_at: q.executable_at().to_rfc3339(),
            expires_at: q.expires_at().map(|t| t.to_rfc3339()),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/deposit: current deposit flow, re-checking any unconfirmed
/// relay transaction first
pub async fn status(State(state): State<AppState>) -> Json<ApiResponse<DepositView>> {
    Json(ApiResponse::ok(state.deposits.refresh().await))
}

/// POST /api/deposit/quote: quote for a sell amount (cached per amount)
pub async fn quote(
    State(state): State<AppState>,
    Json(body): Json<AmountRequest>,
) -> Result<Json<ApiResponse<QuoteResponse>>, AppError> {
    let lookup = state.deposits.quote(&body.amount).await?;
    let status = lookup.status();
    let quote = lookup.into_quote().map(|q| state.deposits.quote_view(&q));

    Ok(Json(ApiResponse::ok(QuoteResponse { status, quote })))
}

/// GET /api/deposit/order: the current order, if any
pub async fn current_order(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<OrderResponse>>, AppError> {
    let view = state.deposits.view().await;
    match (view.flow.order_uid, view.explorer_url, view.quote) {
        (Some(order_uid), Some(explorer_url), Some(quote)) => Ok(Json(ApiResponse::ok(OrderResponse {
            order_uid,
            explorer_url,
            quote,
        }))),
        _ => Err(AppError::NotFound("no order submitted".into())),
    }
}

/// POST /api/deposit/order: create a pre-sign order from the cached quote
pub async fn submit_order(
    State(state): State<AppState>,
    Json(body): Json<AmountRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, AppError> {
    let order = state.deposits.submit_order(&body.amount).await?;
    let settings = state.deposits.settings();

    Ok(Json(ApiResponse::ok(OrderResponse {
        order_uid: order.uid.to_string(),
        explorer_url: settings.explorer_link(&order.uid),
        quote: state.deposits.quote_view(&order.quote),
    })))
}

/// POST /api/deposit/queue: queue setPreSignature in the Delay module
pub async fn queue(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<QueueResponse>>, AppError> {
    let queued = state.deposits.queue_presignature().await?;
    Ok(Json(ApiResponse::ok(queued.into())))
}

/// POST /api/deposit/execute: execute the queued pre-signature
pub async fn execute(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<TxReceipt>>, AppError> {
    let receipt = state.deposits.execute_presignature().await?;
    Ok(Json(ApiResponse::ok(receipt)))
}

/// POST /api/deposit/reset: abandon the current deposit
pub async fn reset(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DepositView>>, AppError> {
    let view = state.deposits.reset().await?;
    Ok(Json(ApiResponse::ok(view)))
}
