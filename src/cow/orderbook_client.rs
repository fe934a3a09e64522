use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;

use super::types::{ApiErrorBody, Order, OrderCreation, OrderUid, QuoteRequest, QuoteResponse};

const ORDERBOOK_API_BASE: &str = "https://api.cow.fi/xdai";

#[derive(Debug, Error)]
pub enum OrderBookError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("order book rejected request ({status}): {error_type}: {description}")]
    Api {
        status: StatusCode,
        error_type: String,
        description: String,
    },

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// The three order-book calls the deposit flow depends on.
#[async_trait]
pub trait OrderBook: Send + Sync {
    async fn get_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, OrderBookError>;

    async fn send_order(&self, order: &OrderCreation) -> Result<OrderUid, OrderBookError>;

    async fn get_order(&self, uid: &OrderUid) -> Result<Order, OrderBookError>;
}

/// REST client for the CoW Protocol order book API.
#[derive(Debug, Clone)]
pub struct OrderBookClient {
    http: Client,
    base_url: String,
}

impl OrderBookClient {
    pub fn new(http: Client) -> Self {
        Self::with_base_url(http, ORDERBOOK_API_BASE)
    }

    pub fn with_base_url(http: Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Turn a non-2xx response into `OrderBookError::Api`, keeping the order
/// book's `errorType` when the body carries one.
async fn check_status(resp: Response) -> Result<Response, OrderBookError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let (error_type, description) = match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(err) => (err.error_type, err.description),
        Err(_) => ("Unknown".to_string(), body),
    };

    Err(OrderBookError::Api {
        status,
        error_type,
        description,
    })
}

#[async_trait]
impl OrderBook for OrderBookClient {
    /// Request a sell quote.
    async fn get_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, OrderBookError> {
        let url = format!("{}/api/v1/quote", self.base_url);
        let resp = self.http.post(&url).json(request).send().await?;
        let resp = check_status(resp).await?;

        let quote: QuoteResponse = resp.json().await?;
        tracing::debug!(
            quote_id = ?quote.id,
            sell_amount = %quote.quote.sell_amount,
            buy_amount = %quote.quote.buy_amount,
            "Order book quote received"
        );
        Ok(quote)
    }

    /// Submit an order; the order book answers with the new uid.
    async fn send_order(&self, order: &OrderCreation) -> Result<OrderUid, OrderBookError> {
        let url = format!("{}/api/v1/orders", self.base_url);
        let resp = self.http.post(&url).json(order).send().await?;
        let resp = check_status(resp).await?;

        let uid: OrderUid = resp.json().await?;
        if !uid.is_well_formed() {
            return Err(OrderBookError::Unexpected(format!(
                "order uid has {} bytes",
                uid.as_bytes().len()
            )));
        }
        Ok(uid)
    }

    /// Fetch a single order by uid.
    async fn get_order(&self, uid: &OrderUid) -> Result<Order, OrderBookError> {
        let url = format!("{}/api/v1/orders/{}", self.base_url, uid);
        let resp = self.http.get(&url).send().await?;
        let resp = check_status(resp).await?;

        let order: Order = resp.json().await?;
        Ok(order)
    }
}
