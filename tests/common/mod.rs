#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{address, Address, Bytes, TxHash, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tokio::sync::broadcast;

use hootbank::api::ws_types::WsMessage;
use hootbank::chain::{ChainError, DelayModule, ModuleCall, TokenInfo, TokenReader, TxReceipt};
use hootbank::cow::types::ORDER_UID_LEN;
use hootbank::cow::{
    Order, OrderBook, OrderBookError, OrderCreation, OrderQuote, OrderStatus, OrderUid,
    QuoteRequest, QuoteResponse,
};
use hootbank::flow::{DepositService, DepositSettings};

pub const SAFE: Address = address!("5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a5a");
pub const SIGNER: Address = address!("5151515151515151515151515151515151515151");
pub const DELAY: Address = address!("dededededededededededededededededededede");
pub const SELL_TOKEN: Address = address!("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");
pub const BUY_TOKEN: Address = address!("dddddddddddddddddddddddddddddddddddddddd");

pub fn eure() -> TokenInfo {
    TokenInfo {
        address: SELL_TOKEN,
        symbol: "EURe".into(),
        decimals: 18,
    }
}

pub fn sdai() -> TokenInfo {
    TokenInfo {
        address: BUY_TOKEN,
        symbol: "sDAI".into(),
        decimals: 18,
    }
}

/// Whole tokens to 18-decimal base units.
pub fn units(whole: u64) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(18u8))
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

/// In-memory order book: quotes 95% of the sell amount, hands out uids
/// `[n; 56]` and reports a configurable status for every order.
pub struct MockOrderBook {
    pub quote_calls: AtomicUsize,
    pub order_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub fail_quotes: AtomicBool,
    pub reject_orders: AtomicBool,
    pub status: Mutex<OrderStatus>,
    pub quote_ttl: Mutex<chrono::Duration>,
    pub sent: Mutex<Vec<OrderCreation>>,
    next_uid: AtomicU8,
}

impl Default for MockOrderBook {
    fn default() -> Self {
        Self {
            quote_calls: AtomicUsize::new(0),
            order_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            fail_quotes: AtomicBool::new(false),
            reject_orders: AtomicBool::new(false),
            status: Mutex::new(OrderStatus::PresignaturePending),
            quote_ttl: Mutex::new(chrono::Duration::minutes(10)),
            sent: Mutex::new(Vec::new()),
            next_uid: AtomicU8::new(1),
        }
    }
}

impl MockOrderBook {
    pub fn set_status(&self, status: OrderStatus) {
        *self.status.lock().unwrap() = status;
    }
}

pub fn uid_of(byte: u8) -> OrderUid {
    OrderUid(Bytes::from(vec![byte; ORDER_UID_LEN]))
}

#[async_trait]
impl OrderBook for MockOrderBook {
    async fn get_quote(&self, request: &QuoteRequest) -> Result<QuoteResponse, OrderBookError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_quotes.load(Ordering::SeqCst) {
            return Err(OrderBookError::Api {
                status: StatusCode::BAD_REQUEST,
                error_type: "NoLiquidity".into(),
                description: "no route found".into(),
            });
        }

        let sell = request.sell_amount_before_fee;
        let expiration: DateTime<Utc> = Utc::now() + *self.quote_ttl.lock().unwrap();
        Ok(QuoteResponse {
            quote: OrderQuote {
                sell_token: request.sell_token,
                buy_token: request.buy_token,
                receiver: Some(request.receiver),
                sell_amount: sell,
                buy_amount: sell * U256::from(95u8) / U256::from(100u8),
                valid_to: 1_900_000_000,
                app_data: "{}".into(),
                app_data_hash: None,
                fee_amount: U256::ZERO,
                kind: request.kind,
                partially_fillable: false,
                sell_token_balance: Default::default(),
                buy_token_balance: Default::default(),
            },
            from: Some(request.from),
            expiration,
            id: Some(self.quote_calls.load(Ordering::SeqCst) as i64),
            verified: true,
        })
    }

    async fn send_order(&self, order: &OrderCreation) -> Result<OrderUid, OrderBookError> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_orders.load(Ordering::SeqCst) {
            return Err(OrderBookError::Api {
                status: StatusCode::BAD_REQUEST,
                error_type: "InsufficientBalance".into(),
                description: "order owner must have funds worth at least x in his account".into(),
            });
        }
        self.sent.lock().unwrap().push(order.clone());
        Ok(uid_of(self.next_uid.fetch_add(1, Ordering::SeqCst)))
    }

    async fn get_order(&self, uid: &OrderUid) -> Result<Order, OrderBookError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Order {
            uid: uid.clone(),
            status: *self.status.lock().unwrap(),
            owner: Some(SAFE),
            creation_date: None,
            valid_to: None,
            executed_sell_amount: None,
            executed_buy_amount: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// In-memory Delay module and token contracts.
///
/// Queued transactions are timestamped `queued_age_secs` in the past so
/// tests can place themselves before or after the cooldown.
pub struct MockChain {
    pub signer: Option<Address>,
    pub cooldown_secs: AtomicU64,
    pub expiration_secs: AtomicU64,
    pub queued_age_secs: AtomicU64,
    pub pending: AtomicU64,
    pub revert_next: AtomicBool,
    /// The next `wait_for_receipt` gives up with `Timeout` although the
    /// transaction is mined.
    pub timeout_next: AtomicBool,
    /// Broadcast transactions have no receipt yet.
    pub unmined: AtomicBool,
    pub queued: Mutex<Vec<ModuleCall>>,
    pub executed: Mutex<Vec<ModuleCall>>,
    pub reverting: Mutex<Vec<TxHash>>,
    pub next_tx: AtomicU8,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            signer: Some(SIGNER),
            cooldown_secs: AtomicU64::new(3600),
            expiration_secs: AtomicU64::new(0),
            queued_age_secs: AtomicU64::new(0),
            pending: AtomicU64::new(0),
            revert_next: AtomicBool::new(false),
            timeout_next: AtomicBool::new(false),
            unmined: AtomicBool::new(false),
            queued: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
            reverting: Mutex::new(Vec::new()),
            next_tx: AtomicU8::new(1),
        }
    }
}

impl MockChain {
    fn new_tx(&self) -> Result<TxHash, ChainError> {
        if self.signer.is_none() {
            return Err(ChainError::NoSigner);
        }
        let hash = B256::repeat_byte(self.next_tx.fetch_add(1, Ordering::SeqCst));
        if self.revert_next.swap(false, Ordering::SeqCst) {
            self.reverting.lock().unwrap().push(hash);
        }
        Ok(hash)
    }
}

#[async_trait]
impl DelayModule for MockChain {
    fn signer(&self) -> Option<Address> {
        self.signer
    }

    async fn is_module_enabled(&self, module: Address) -> Result<bool, ChainError> {
        Ok(module == SIGNER)
    }

    async fn tx_cooldown(&self) -> Result<u64, ChainError> {
        Ok(self.cooldown_secs.load(Ordering::SeqCst))
    }

    async fn tx_expiration(&self) -> Result<u64, ChainError> {
        Ok(self.expiration_secs.load(Ordering::SeqCst))
    }

    async fn pending_transactions(&self) -> Result<u64, ChainError> {
        Ok(self.pending.load(Ordering::SeqCst))
    }

    async fn last_queued_at(&self) -> Result<Option<i64>, ChainError> {
        let age = self.queued_age_secs.load(Ordering::SeqCst) as i64;
        Ok(Some(Utc::now().timestamp() - age))
    }

    async fn queue(&self, call: &ModuleCall) -> Result<TxHash, ChainError> {
        let hash = self.new_tx()?;
        self.queued.lock().unwrap().push(call.clone());
        Ok(hash)
    }

    async fn execute_next(&self, call: &ModuleCall) -> Result<TxHash, ChainError> {
        let hash = self.new_tx()?;
        self.executed.lock().unwrap().push(call.clone());
        Ok(hash)
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, ChainError> {
        if self.unmined.load(Ordering::SeqCst) {
            return Ok(None);
        }
        if self.reverting.lock().unwrap().contains(&tx_hash) {
            return Err(ChainError::Reverted(tx_hash));
        }
        Ok(Some(TxReceipt {
            tx_hash,
            block_number: Some(1),
        }))
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        if self.timeout_next.swap(false, Ordering::SeqCst) {
            return Err(ChainError::Timeout(tx_hash));
        }
        match self.receipt(tx_hash).await? {
            Some(receipt) => Ok(receipt),
            None => Err(ChainError::Timeout(tx_hash)),
        }
    }
}

#[async_trait]
impl TokenReader for MockChain {
    async fn token_info(&self, token: Address) -> Result<TokenInfo, ChainError> {
        if token == SELL_TOKEN {
            Ok(eure())
        } else if token == BUY_TOKEN {
            Ok(sdai())
        } else {
            Err(ChainError::Rpc(format!("unknown token {token}")))
        }
    }

    async fn balance_of(&self, token: Address, _owner: Address) -> Result<U256, ChainError> {
        if token == SELL_TOKEN {
            Ok(units(250))
        } else {
            Ok(units(1) / U256::from(2u8))
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct Harness {
    pub service: Arc<DepositService>,
    pub book: Arc<MockOrderBook>,
    pub chain: Arc<MockChain>,
    pub ws_tx: broadcast::Sender<WsMessage>,
}

pub fn settings() -> DepositSettings {
    DepositSettings {
        safe: SAFE,
        delay_module: DELAY,
        settlement: hootbank::chain::GPV2_SETTLEMENT,
        sell_token: eure(),
        buy_token: sdai(),
        poll_interval: Duration::from_millis(10),
        explorer_url: "https://explorer.cow.fi/gc".into(),
    }
}

pub fn harness_with(book: MockOrderBook, chain: MockChain) -> Harness {
    let book = Arc::new(book);
    let chain = Arc::new(chain);
    let (ws_tx, _) = broadcast::channel::<WsMessage>(64);
    let service = Arc::new(DepositService::new(
        book.clone(),
        chain.clone(),
        chain.clone(),
        settings(),
        ws_tx.clone(),
    ));
    Harness {
        service,
        book,
        chain,
        ws_tx,
    }
}

pub fn harness() -> Harness {
    harness_with(MockOrderBook::default(), MockChain::default())
}
