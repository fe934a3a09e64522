use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use super::deposit::{DepositFlow, FlowAction, FlowView, QueuedTx, StatusUpdate, SubmittedOrder};
use super::error::FlowError;
use super::quote_cache::{QuoteCache, QuoteLookup};
use crate::api::ws_types::{OrderStatusEvent, WsMessage};
use crate::chain::{ChainError, DelayModule, ModuleCall, TokenInfo, TokenReader, TxReceipt};
use crate::cow::{OrderBook, OrderCreation, OrderKind, OrderStatus, OrderUid, QuoteRequest};
use crate::models::{format_units, parse_units, Quote, QuoteKey, QuoteView};
use crate::services::order_status_poller::{run_order_status_poller, StatusSink};

/// Delay periods read from chain are capped here so timestamp arithmetic
/// cannot overflow.
const MAX_DELAY_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Static parameters of the deposit flow.
#[derive(Debug, Clone)]
pub struct DepositSettings {
    pub safe: Address,
    pub delay_module: Address,
    pub settlement: Address,
    pub sell_token: TokenInfo,
    pub buy_token: TokenInfo,
    pub poll_interval: Duration,
    /// Order explorer base, e.g. `https://explorer.cow.fi/gc`.
    pub explorer_url: String,
}

impl DepositSettings {
    pub fn explorer_link(&self, uid: &OrderUid) -> String {
        format!("{}/orders/{}", self.explorer_url.trim_end_matches('/'), uid)
    }
}

/// Drives a single deposit: quoting, order submission, the Delay module
/// relay and order status polling.
///
/// Every state change is pushed to WebSocket subscribers as a
/// `deposit_update` message.
pub struct DepositService {
    order_book: Arc<dyn OrderBook>,
    delay: Arc<dyn DelayModule>,
    tokens: Arc<dyn TokenReader>,
    settings: DepositSettings,
    quotes: QuoteCache,
    flow: Mutex<DepositFlow>,
    poller: StdMutex<Option<JoinHandle<()>>>,
    updates: broadcast::Sender<WsMessage>,
}

impl DepositService {
    pub fn new(
        order_book: Arc<dyn OrderBook>,
        delay: Arc<dyn DelayModule>,
        tokens: Arc<dyn TokenReader>,
        settings: DepositSettings,
        updates: broadcast::Sender<WsMessage>,
    ) -> Self {
        Self {
            order_book,
            delay,
            tokens,
            settings,
            quotes: QuoteCache::new(),
            flow: Mutex::new(DepositFlow::new()),
            poller: StdMutex::new(None),
            updates,
        }
    }

    pub fn settings(&self) -> &DepositSettings {
        &self.settings
    }

    fn quote_key(&self, amount: &str) -> QuoteKey {
        QuoteKey::new(
            self.settings.sell_token.address,
            self.settings.buy_token.address,
            self.settings.safe,
            amount,
        )
    }

    /// Parse a human amount in sell-token units. An invalid amount also
    /// drops whatever quote was cached for the previous one.
    fn parse_amount(&self, key: &QuoteKey) -> Result<Option<U256>, FlowError> {
        parse_units(&key.amount, self.settings.sell_token.decimals).map_err(|e| {
            self.quotes.clear();
            FlowError::InvalidAmount(e)
        })
    }

    // -----------------------------------------------------------------------
    // Quote
    // -----------------------------------------------------------------------

    /// Look up the quote for `amount`, requesting it at most once per amount.
    pub async fn quote(&self, amount: &str) -> Result<QuoteLookup, FlowError> {
        let key = self.quote_key(amount);
        let Some(sell_amount) = self.parse_amount(&key)? else {
            self.quotes.clear();
            return Ok(QuoteLookup::Empty);
        };

        let request = QuoteRequest {
            sell_token: self.settings.sell_token.address,
            buy_token: self.settings.buy_token.address,
            from: self.settings.safe,
            receiver: self.settings.safe,
            sell_amount_before_fee: sell_amount,
            kind: OrderKind::Sell,
        };
        let request = &request;
        let order_book = &self.order_book;

        let lookup = self
            .quotes
            .resolve(key, Utc::now(), move || async move {
                counter!("quote_requests_total").increment(1);
                let result = order_book.get_quote(request).await.map(Quote::from_response);
                if result.is_err() {
                    counter!("quote_failures_total").increment(1);
                }
                result
            })
            .await;

        Ok(lookup)
    }

    pub fn quote_view(&self, quote: &Quote) -> QuoteView {
        quote.view(&self.settings.sell_token, &self.settings.buy_token)
    }

    // -----------------------------------------------------------------------
    // Order submission
    // -----------------------------------------------------------------------

    /// Create a pre-sign order from the cached quote for `amount`.
    ///
    /// Runs to completion even if the caller goes away, so the action lock
    /// is always released.
    pub async fn submit_order(self: &Arc<Self>, amount: &str) -> Result<SubmittedOrder, FlowError> {
        let key = self.quote_key(amount);
        if self.parse_amount(&key)?.is_none() {
            return Err(FlowError::NoQuote);
        }
        let quote = self.quotes.peek(&key).ok_or(FlowError::NoQuote)?;

        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_submit(quote).await })
            .await
            .map_err(|e| FlowError::Task(e.to_string()))?
    }

    async fn run_submit(self: Arc<Self>, quote: Quote) -> Result<SubmittedOrder, FlowError> {
        {
            let mut flow = self.flow.lock().await;
            flow.begin(FlowAction::SubmitOrder)?;
            match flow.check_submit(&quote, Utc::now()) {
                Ok(None) => {}
                Ok(Some(existing)) => {
                    flow.end(FlowAction::SubmitOrder);
                    tracing::debug!(order_uid = %existing.uid, "Quote already used, returning existing order");
                    return Ok(existing);
                }
                Err(e) => {
                    flow.end(FlowAction::SubmitOrder);
                    return Err(e);
                }
            }
        }

        let creation = OrderCreation::presign(&quote.params, quote.id, self.settings.safe);
        let result = self.order_book.send_order(&creation).await;

        let mut flow = self.flow.lock().await;
        flow.end(FlowAction::SubmitOrder);

        let uid = match result {
            Ok(uid) => uid,
            Err(e) => {
                counter!("orders_rejected_total").increment(1);
                tracing::warn!(error = %e, quote_id = ?quote.id, "Order submission failed");
                self.publish(&flow);
                return Err(e.into());
            }
        };

        let order = SubmittedOrder {
            call: ModuleCall::presign(self.settings.settlement, &uid),
            uid: uid.clone(),
            quote,
            submitted_at: Utc::now(),
        };
        flow.order_submitted(order.clone());
        counter!("orders_submitted_total").increment(1);
        tracing::info!(
            order_uid = %uid,
            flow_id = %flow.id(),
            sell_amount = %order.quote.sell_amount,
            buy_amount = %order.quote.buy_amount,
            "Pre-sign order submitted"
        );
        self.publish(&flow);
        drop(flow);

        self.start_poller(uid);
        Ok(order)
    }

    // -----------------------------------------------------------------------
    // Timelock relay
    // -----------------------------------------------------------------------

    /// Queue `setPreSignature` in the Delay module and wait for inclusion.
    ///
    /// A queue transaction left unconfirmed by an earlier call is resolved
    /// first; if it has since been mined it is returned as the result.
    pub async fn queue_presignature(self: &Arc<Self>) -> Result<QueuedTx, FlowError> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_queue().await })
            .await
            .map_err(|e| FlowError::Task(e.to_string()))?
    }

    async fn run_queue(self: Arc<Self>) -> Result<QueuedTx, FlowError> {
        self.flow.lock().await.begin(FlowAction::Queue)?;

        let result = match self.reconcile().await {
            Ok(Some(Confirmed::Queue(queued))) => Ok(queued),
            Ok(_) => self.queue_order().await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Queueing pre-signature failed");
        }
        let mut flow = self.flow.lock().await;
        flow.end(FlowAction::Queue);
        self.publish(&flow);
        result
    }

    async fn queue_order(&self) -> Result<QueuedTx, FlowError> {
        let order = self.flow.lock().await.check_queue()?;

        let pending = self.delay.pending_transactions().await?;
        if pending > 0 {
            return Err(FlowError::QueueOccupied(pending));
        }
        let cooldown = self.delay.tx_cooldown().await?;
        let expiration = self.delay.tx_expiration().await?;

        let tx_hash = self.delay.queue(&order.call).await?;
        {
            let mut flow = self.flow.lock().await;
            flow.queue_sent(&order.uid, tx_hash);
            self.publish(&flow);
        }

        match self.delay.wait_for_receipt(tx_hash).await {
            Ok(receipt) => {
                tracing::debug!(tx_hash = %tx_hash, block = ?receipt.block_number, "Queue transaction mined");
            }
            Err(e) => {
                self.unconfirmed(&order.uid, FlowAction::Queue, &e).await;
                return Err(e.into());
            }
        }

        let queued = self.queued_tx(tx_hash, cooldown, expiration).await;
        self.queue_confirmed(&order.uid, queued).await;
        Ok(queued)
    }

    async fn queued_tx(&self, tx_hash: TxHash, cooldown: u64, expiration: u64) -> QueuedTx {
        let queued_at = match self.delay.last_queued_at().await {
            Ok(Some(ts)) => DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now),
            Ok(None) => Utc::now(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read queue time from module, using local clock");
                Utc::now()
            }
        };

        QueuedTx {
            tx_hash,
            queued_at,
            cooldown: secs_to_duration(cooldown),
            expiration: (expiration > 0).then(|| secs_to_duration(expiration)),
        }
    }

    async fn queue_confirmed(&self, uid: &OrderUid, queued: QueuedTx) {
        let mut flow = self.flow.lock().await;
        flow.queue_confirmed(uid, queued);
        counter!("presignatures_queued_total").increment(1);
        tracing::info!(
            order_uid = %uid,
            tx_hash = %queued.tx_hash,
            executable_at = %queued.executable_at(),
            "Pre-signature queued"
        );
        self.publish(&flow);
    }

    /// Execute the queued pre-signature once its cooldown has passed.
    ///
    /// An execute transaction left unconfirmed by an earlier call is resolved
    /// first; if it has since been mined its receipt is returned.
    pub async fn execute_presignature(self: &Arc<Self>) -> Result<TxReceipt, FlowError> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_execute().await })
            .await
            .map_err(|e| FlowError::Task(e.to_string()))?
    }

    async fn run_execute(self: Arc<Self>) -> Result<TxReceipt, FlowError> {
        self.flow.lock().await.begin(FlowAction::Execute)?;

        let result = match self.reconcile().await {
            Ok(Some(Confirmed::Execute(receipt))) => Ok(receipt),
            Ok(_) => self.execute_order().await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Executing pre-signature failed");
        }
        let mut flow = self.flow.lock().await;
        flow.end(FlowAction::Execute);
        self.publish(&flow);
        result
    }

    async fn execute_order(&self) -> Result<TxReceipt, FlowError> {
        let order = self.flow.lock().await.check_execute(Utc::now())?;

        let tx_hash = self.delay.execute_next(&order.call).await?;
        {
            let mut flow = self.flow.lock().await;
            flow.execute_sent(&order.uid, tx_hash);
            self.publish(&flow);
        }

        match self.delay.wait_for_receipt(tx_hash).await {
            Ok(receipt) => {
                self.execute_confirmed(&order.uid, receipt).await;
                Ok(receipt)
            }
            Err(e) => {
                self.unconfirmed(&order.uid, FlowAction::Execute, &e).await;
                Err(e.into())
            }
        }
    }

    async fn execute_confirmed(&self, uid: &OrderUid, receipt: TxReceipt) {
        let mut flow = self.flow.lock().await;
        flow.executed(uid, receipt.tx_hash);
        counter!("presignatures_executed_total").increment(1);
        tracing::info!(order_uid = %uid, tx_hash = %receipt.tx_hash, "Pre-signature executed");
        self.publish(&flow);
    }

    /// Record a broadcast transaction that did not confirm.
    ///
    /// A revert returns the flow to its prior state. Any other failure means
    /// the outcome is unknown, so the transaction stays pending until its
    /// receipt is read again.
    async fn unconfirmed(&self, uid: &OrderUid, action: FlowAction, error: &ChainError) {
        let mut flow = self.flow.lock().await;
        match error {
            ChainError::Reverted(_) => {
                match action {
                    FlowAction::Queue => flow.queue_failed(uid),
                    FlowAction::Execute => flow.execute_failed(uid),
                    FlowAction::SubmitOrder => {}
                }
                tracing::warn!(order_uid = %uid, %action, error = %error, "Transaction reverted");
            }
            _ => {
                tracing::warn!(
                    order_uid = %uid,
                    %action,
                    error = %error,
                    "Transaction broadcast but not confirmed, receipt will be re-read"
                );
            }
        }
        self.publish(&flow);
    }

    /// Resolve a transaction a previous action broadcast but never saw
    /// confirmed. Must be called with the action lock held.
    ///
    /// Returns what was confirmed, `None` when there was nothing pending or
    /// the pending transaction reverted, and `TxUnconfirmed` while it is
    /// still not mined.
    async fn reconcile(&self) -> Result<Option<Confirmed>, FlowError> {
        let Some((uid, action, tx_hash)) = self.flow.lock().await.unconfirmed_tx() else {
            return Ok(None);
        };

        let receipt = match self.delay.receipt(tx_hash).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => return Err(FlowError::TxUnconfirmed(tx_hash)),
            Err(e @ ChainError::Reverted(_)) => {
                self.unconfirmed(&uid, action, &e).await;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match action {
            FlowAction::Execute => {
                self.execute_confirmed(&uid, receipt).await;
                Ok(Some(Confirmed::Execute(receipt)))
            }
            _ => {
                let (cooldown, expiration) =
                    tokio::try_join!(self.delay.tx_cooldown(), self.delay.tx_expiration())?;
                let queued = self.queued_tx(tx_hash, cooldown, expiration).await;
                self.queue_confirmed(&uid, queued).await;
                Ok(Some(Confirmed::Queue(queued)))
            }
        }
    }

    /// Re-read the receipt of an unconfirmed transaction, if any, and return
    /// the resulting view. Skipped while another action is in flight.
    pub async fn refresh(self: &Arc<Self>) -> DepositView {
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let action = {
                let mut flow = this.flow.lock().await;
                let pending = flow.unconfirmed_tx().map(|(_, action, _)| action);
                match pending {
                    Some(action) if flow.begin(action).is_ok() => Some(action),
                    _ => None,
                }
            };
            let Some(action) = action else { return };

            if let Err(e) = this.reconcile().await {
                tracing::debug!(error = %e, "Pending transaction still unresolved");
            }
            let mut flow = this.flow.lock().await;
            flow.end(action);
            this.publish(&flow);
        });
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Refreshing deposit flow failed");
        }
        self.view().await
    }

    // -----------------------------------------------------------------------
    // Reset / status
    // -----------------------------------------------------------------------

    /// Abandon the current deposit and stop polling its order.
    pub async fn reset(&self) -> Result<DepositView, FlowError> {
        let mut flow = self.flow.lock().await;
        let abandoned = flow.order().map(|o| o.uid.clone());
        flow.reset()?;
        self.stop_poller();
        self.quotes.clear();

        tracing::info!(abandoned_order = ?abandoned.map(|u| u.to_string()), flow_id = %flow.id(), "Deposit flow reset");
        self.publish(&flow);
        Ok(self.render(&flow, Utc::now()))
    }

    pub async fn view(&self) -> DepositView {
        let flow = self.flow.lock().await;
        self.render(&flow, Utc::now())
    }

    fn render(&self, flow: &DepositFlow, now: DateTime<Utc>) -> DepositView {
        let order = flow.order();
        DepositView {
            flow: flow.view(now),
            quote: order.map(|o| self.quote_view(&o.quote)),
            explorer_url: order.map(|o| self.settings.explorer_link(&o.uid)),
        }
    }

    fn publish(&self, flow: &DepositFlow) {
        // No subscribers is fine
        let _ = self
            .updates
            .send(WsMessage::DepositUpdate(self.render(flow, Utc::now())));
    }

    fn start_poller(self: &Arc<Self>, uid: OrderUid) {
        let sink: Arc<dyn StatusSink> = self.clone();
        let order_book = Arc::clone(&self.order_book);
        let interval = self.settings.poll_interval;

        let handle = tokio::spawn(async move {
            run_order_status_poller(order_book, uid, interval, sink).await;
        });

        let mut slot = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    fn stop_poller(&self) {
        let mut slot = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    // -----------------------------------------------------------------------
    // Account
    // -----------------------------------------------------------------------

    /// Safe balances plus the Delay module's view of the configured signer.
    pub async fn account(&self) -> Result<AccountView, FlowError> {
        let safe = self.settings.safe;
        let sell = &self.settings.sell_token;
        let buy = &self.settings.buy_token;

        let (sell_balance, buy_balance, cooldown, pending) = tokio::try_join!(
            self.tokens.balance_of(sell.address, safe),
            self.tokens.balance_of(buy.address, safe),
            self.delay.tx_cooldown(),
            self.delay.pending_transactions(),
        )?;

        let signer = self.delay.signer();
        let module_enabled = match signer {
            Some(address) => Some(self.delay.is_module_enabled(address).await?),
            None => None,
        };

        Ok(AccountView {
            safe,
            delay_module: self.settings.delay_module,
            signer,
            module_enabled,
            cooldown_secs: cooldown,
            pending_transactions: pending,
            balances: vec![
                BalanceView::new(sell, sell_balance),
                BalanceView::new(buy, buy_balance),
            ],
        })
    }
}

#[async_trait]
impl StatusSink for DepositService {
    async fn record_status(&self, uid: &OrderUid, status: OrderStatus) -> StatusUpdate {
        let mut flow = self.flow.lock().await;
        let previous = flow.last_status();
        let update = flow.observe_status(uid, status);
        if update == StatusUpdate::Ignored || previous == Some(status) {
            return update;
        }

        if update == StatusUpdate::Terminal {
            counter!("orders_settled_total", "status" => status.to_string()).increment(1);
            tracing::info!(order_uid = %uid, status = %status, flow_id = %flow.id(), "Deposit settled");
        }

        let _ = self.updates.send(WsMessage::OrderStatus(OrderStatusEvent {
            order_uid: uid.to_string(),
            status,
            terminal: status.is_terminal(),
            observed_at: Utc::now(),
        }));
        self.publish(&flow);
        update
    }
}

/// Outcome of resolving a previously unconfirmed transaction.
enum Confirmed {
    Queue(QueuedTx),
    Execute(TxReceipt),
}

fn secs_to_duration(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_DELAY_SECS) as i64)
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DepositView {
    #[serde(flatten)]
    pub flow: FlowView,
    pub quote: Option<QuoteView>,
    pub explorer_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceView {
    pub token: Address,
    pub symbol: String,
    pub balance: String,
    pub raw: String,
}

impl BalanceView {
    fn new(token: &TokenInfo, raw: U256) -> Self {
        Self {
            token: token.address,
            symbol: token.symbol.clone(),
            balance: format_units(raw, token.decimals),
            raw: raw.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub safe: Address,
    pub delay_module: Address,
    pub signer: Option<Address>,
    /// Whether the signer may queue through the Delay module; `None` when
    /// no signer is configured.
    pub module_enabled: Option<bool>,
    pub cooldown_secs: u64,
    pub pending_transactions: u64,
    pub balances: Vec<BalanceView>,
}
