pub mod orderbook_client;
pub mod types;

pub use orderbook_client::{OrderBook, OrderBookClient, OrderBookError};
pub use types::{
    Order, OrderCreation, OrderKind, OrderQuote, OrderStatus, OrderUid, QuoteRequest,
    QuoteResponse, SigningScheme,
};
