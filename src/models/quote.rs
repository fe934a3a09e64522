use std::fmt;

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::amount::format_units;
use crate::chain::TokenInfo;
use crate::cow::{OrderQuote, QuoteResponse};

// ---------------------------------------------------------------------------
// QuoteKey: the inputs a quote depends on
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuoteKey {
    pub sell_token: Address,
    pub buy_token: Address,
    pub account: Address,
    /// Sell amount as entered, whitespace trimmed.
    pub amount: String,
}

impl QuoteKey {
    pub fn new(sell_token: Address, buy_token: Address, account: Address, amount: &str) -> Self {
        Self {
            sell_token,
            buy_token,
            account,
            amount: amount.trim().to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.amount.is_empty()
    }
}

impl fmt::Display for QuoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} for {}",
            self.amount, self.sell_token, self.buy_token, self.account
        )
    }
}

// ---------------------------------------------------------------------------
// Quote
// ---------------------------------------------------------------------------

/// A price quote from the order book. Immutable once received.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub id: Option<i64>,
    pub sell_amount: U256,
    pub buy_amount: U256,
    pub fee_amount: U256,
    /// Order validity (unix seconds) proposed by the order book.
    pub valid_to: u32,
    /// After this instant the quote must not be used to create an order.
    pub expires_at: DateTime<Utc>,
    /// Order parameters, passed back verbatim when the order is created.
    pub params: OrderQuote,
}

impl Quote {
    pub fn from_response(resp: QuoteResponse) -> Self {
        Self {
            id: resp.id,
            sell_amount: resp.quote.sell_amount,
            buy_amount: resp.quote.buy_amount,
            fee_amount: resp.quote.fee_amount,
            valid_to: resp.quote.valid_to,
            expires_at: resp.expiration,
            params: resp.quote,
        }
    }

    pub fn sell_token(&self) -> Address {
        self.params.sell_token
    }

    pub fn buy_token(&self) -> Address {
        self.params.buy_token
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// "Sell 100 EURe, get 95 sDAI"
    pub fn summary(&self, sell: &TokenInfo, buy: &TokenInfo) -> String {
        format!(
            "Sell {} {}, get {} {}",
            format_units(self.sell_amount, sell.decimals),
            sell.symbol,
            format_units(self.buy_amount, buy.decimals),
            buy.symbol,
        )
    }

    pub fn view(&self, sell: &TokenInfo, buy: &TokenInfo) -> QuoteView {
        QuoteView {
            id: self.id,
            sell_token: sell.symbol.clone(),
            buy_token: buy.symbol.clone(),
            sell_amount: format_units(self.sell_amount, sell.decimals),
            buy_amount: format_units(self.buy_amount, buy.decimals),
            fee_amount: format_units(self.fee_amount, sell.decimals),
            sell_amount_raw: self.sell_amount.to_string(),
            buy_amount_raw: self.buy_amount.to_string(),
            valid_to: self.valid_to,
            expires_at: self.expires_at,
            summary: self.summary(sell, buy),
        }
    }
}

/// JSON rendering of a quote for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteView {
    pub id: Option<i64>,
    pub sell_token: String,
    pub buy_token: String,
    pub sell_amount: String,
    pub buy_amount: String,
    pub fee_amount: String,
    pub sell_amount_raw: String,
    pub buy_amount_raw: String,
    pub valid_to: u32,
    pub expires_at: DateTime<Utc>,
    pub summary: String,
}
