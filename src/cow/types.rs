use std::fmt;

use alloy::primitives::{hex, Address, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of a CoW Protocol order uid: digest (32) + owner (20) + validTo (4).
pub const ORDER_UID_LEN: usize = 56;

// ---------------------------------------------------------------------------
// Decimal-string U256 (the order book encodes amounts as base-10 strings)
// ---------------------------------------------------------------------------

pub mod u256_dec {
    use alloy::primitives::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_str_radix(&raw, 10).map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Sell,
    Buy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningScheme {
    Eip712,
    EthSign,
    Eip1271,
    PreSign,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBalance {
    #[default]
    Erc20,
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    PresignaturePending,
    Open,
    Fulfilled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    /// Fulfilled, cancelled and expired orders never change status again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Fulfilled | OrderStatus::Cancelled | OrderStatus::Expired
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::PresignaturePending => "presignaturePending",
            OrderStatus::Open => "open",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Order uid
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderUid(pub Bytes);

impl OrderUid {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn is_well_formed(&self) -> bool {
        self.0.len() == ORDER_UID_LEN
    }
}

impl fmt::Display for OrderUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_prefixed(self.0.as_ref()))
    }
}

// ---------------------------------------------------------------------------
// Quote (POST /api/v1/quote)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub sell_token: Address,
    pub buy_token: Address,
    pub from: Address,
    pub receiver: Address,
    #[serde(with = "u256_dec")]
    pub sell_amount_before_fee: U256,
    pub kind: OrderKind,
}

/// Order parameters proposed by the order book for a quote request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuote {
    pub sell_token: Address,
    pub buy_token: Address,
    #[serde(default)]
    pub receiver: Option<Address>,
    #[serde(with = "u256_dec")]
    pub sell_amount: U256,
    #[serde(with = "u256_dec")]
    pub buy_amount: U256,
    pub valid_to: u32,
    pub app_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_data_hash: Option<String>,
    #[serde(with = "u256_dec")]
    pub fee_amount: U256,
    pub kind: OrderKind,
    #[serde(default)]
    pub partially_fillable: bool,
    #[serde(default)]
    pub sell_token_balance: TokenBalance,
    #[serde(default)]
    pub buy_token_balance: TokenBalance,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub quote: OrderQuote,
    #[serde(default)]
    pub from: Option<Address>,
    pub expiration: DateTime<Utc>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub verified: bool,
}

// ---------------------------------------------------------------------------
// Order creation (POST /api/v1/orders)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreation {
    pub sell_token: Address,
    pub buy_token: Address,
    pub receiver: Address,
    #[serde(with = "u256_dec")]
    pub sell_amount: U256,
    #[serde(with = "u256_dec")]
    pub buy_amount: U256,
    pub valid_to: u32,
    pub app_data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_data_hash: Option<String>,
    #[serde(with = "u256_dec")]
    pub fee_amount: U256,
    pub kind: OrderKind,
    pub partially_fillable: bool,
    pub sell_token_balance: TokenBalance,
    pub buy_token_balance: TokenBalance,
    pub signing_scheme: SigningScheme,
    pub signature: Bytes,
    pub from: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<i64>,
}

impl OrderCreation {
    /// Build a pre-sign order from a quote. The signature stays empty: the
    /// order is authorised later by an on-chain `setPreSignature` call.
    pub fn presign(quote: &OrderQuote, quote_id: Option<i64>, owner: Address) -> Self {
        Self {
            sell_token: quote.sell_token,
            buy_token: quote.buy_token,
            receiver: owner,
            sell_amount: quote.sell_amount,
            buy_amount: quote.buy_amount,
            valid_to: quote.valid_to,
            app_data: quote.app_data.clone(),
            app_data_hash: quote.app_data_hash.clone(),
            fee_amount: quote.fee_amount,
            kind: quote.kind,
            partially_fillable: quote.partially_fillable,
            sell_token_balance: quote.sell_token_balance,
            buy_token_balance: quote.buy_token_balance,
            signing_scheme: SigningScheme::PreSign,
            signature: Bytes::new(),
            from: owner,
            quote_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Order (GET /api/v1/orders/{uid})
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub uid: OrderUid,
    pub status: OrderStatus,
    #[serde(default)]
    pub owner: Option<Address>,
    #[serde(default)]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_to: Option<u32>,
    #[serde(default, with = "opt_u256_dec")]
    pub executed_sell_amount: Option<U256>,
    #[serde(default, with = "opt_u256_dec")]
    pub executed_buy_amount: Option<U256>,
}

mod opt_u256_dec {
    use alloy::primitives::U256;
    use serde::{de, Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<U256>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| U256::from_str_radix(&s, 10).map_err(de::Error::custom))
            .transpose()
    }
}

/// Error body returned by the order book on 4xx responses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub error_type: String,
    #[serde(default)]
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quote_response_parses_order_book_payload() {
        let payload = json!({
            "quote": {
                "sellToken": "0xcb444e90d8198415266c6a2724b7900fb12fc56e",
                "buyToken": "0xaf204776c7245bf4147c2612bf6e5972ee483701",
                "receiver": "0x1111111111111111111111111111111111111111",
                "sellAmount": "100000000000000000000",
                "buyAmount": "95000000000000000000",
                "validTo": 1735689600,
                "appData": "{}",
                "appDataHash": "0x44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a",
                "feeAmount": "0",
                "kind": "sell",
                "partiallyFillable": false,
                "sellTokenBalance": "erc20",
                "buyTokenBalance": "erc20",
                "signingScheme": "presign"
            },
            "from": "0x1111111111111111111111111111111111111111",
            "expiration": "2025-01-01T00:00:00Z",
            "id": 42,
            "verified": true
        });

        let resp: QuoteResponse = serde_json::from_value(payload).unwrap();
        assert_eq!(resp.id, Some(42));
        assert_eq!(resp.quote.kind, OrderKind::Sell);
        assert_eq!(
            resp.quote.sell_amount,
            U256::from_str_radix("100000000000000000000", 10).unwrap()
        );
        assert_eq!(resp.quote.fee_amount, U256::ZERO);
    }

    #[test]
    fn test_presign_order_creation_serializes_camel_case() {
        let quote = OrderQuote {
            sell_token: Address::repeat_byte(0xaa),
            buy_token: Address::repeat_byte(0xbb),
            receiver: None,
            sell_amount: U256::from(1000u64),
            buy_amount: U256::from(950u64),
            valid_to: 1_700_000_000,
            app_data: "{}".into(),
            app_data_hash: None,
            fee_amount: U256::from(3u64),
            kind: OrderKind::Sell,
            partially_fillable: false,
            sell_token_balance: TokenBalance::Erc20,
            buy_token_balance: TokenBalance::Erc20,
        };
        let owner = Address::repeat_byte(0x11);

        let order = OrderCreation::presign(&quote, Some(7), owner);
        let value = serde_json::to_value(&order).unwrap();

        assert_eq!(value["signingScheme"], "presign");
        assert_eq!(value["signature"], "0x");
        assert_eq!(value["sellAmount"], "1000");
        assert_eq!(value["feeAmount"], "3");
        assert_eq!(value["quoteId"], 7);
        assert_eq!(order.receiver, owner);
        assert!(value.get("appDataHash").is_none());
    }

    #[test]
    fn test_order_status_terminal_set() {
        assert!(!OrderStatus::PresignaturePending.is_terminal());
        assert!(!OrderStatus::Open.is_terminal());
        assert!(OrderStatus::Fulfilled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());

        let parsed: OrderStatus = serde_json::from_value(json!("presignaturePending")).unwrap();
        assert_eq!(parsed, OrderStatus::PresignaturePending);
    }
}
