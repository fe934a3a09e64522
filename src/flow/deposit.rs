use std::fmt;

use alloy::primitives::{Bytes, TxHash};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::error::FlowError;
use crate::chain::ModuleCall;
use crate::cow::{OrderStatus, OrderUid};
use crate::models::Quote;

// ---------------------------------------------------------------------------
// Building blocks
// ---------------------------------------------------------------------------

/// An order accepted by the order book, awaiting its on-chain pre-signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedOrder {
    pub uid: OrderUid,
    /// `setPreSignature(uid, true)` routed to the settlement contract.
    pub call: ModuleCall,
    pub quote: Quote,
    pub submitted_at: DateTime<Utc>,
}

/// A pre-signature transaction accepted into the Delay module's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedTx {
    pub tx_hash: TxHash,
    pub queued_at: DateTime<Utc>,
    pub cooldown: Duration,
    /// `None` when the module has no expiration configured.
    pub expiration: Option<Duration>,
}

impl QueuedTx {
    pub fn executable_at(&self) -> DateTime<Utc> {
        self.queued_at + self.cooldown
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiration.map(|exp| self.executable_at() + exp)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowAction {
    SubmitOrder,
    Queue,
    Execute,
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowAction::SubmitOrder => write!(f, "submit order"),
            FlowAction::Queue => write!(f, "queue"),
            FlowAction::Execute => write!(f, "execute"),
        }
    }
}

/// Timelock relay state as seen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayState {
    NoOrder,
    Queued,
    CooldownPending,
    Executable,
    Expired,
    /// Execute transaction broadcast, not yet confirmed.
    Executing,
    Executed,
}

/// Result of feeding an observed order status into the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Status belongs to an order that is no longer current.
    Ignored,
    Updated,
    /// First terminal status for the current order: the flow is complete.
    Terminal,
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    NoOrder,
    OrderSubmitted {
        order: SubmittedOrder,
    },
    /// Queue transaction broadcast, not yet mined.
    Queued {
        order: SubmittedOrder,
        tx_hash: TxHash,
    },
    /// Queue transaction mined; cooldown is counting down (or done).
    CooldownPending {
        order: SubmittedOrder,
        queued: QueuedTx,
    },
    /// Execute transaction broadcast, not yet mined.
    ExecuteSent {
        order: SubmittedOrder,
        queued: QueuedTx,
        tx_hash: TxHash,
    },
    Executed {
        order: SubmittedOrder,
        queued: QueuedTx,
        tx_hash: TxHash,
    },
    /// Order reached a terminal status.
    Settled {
        order: SubmittedOrder,
        status: OrderStatus,
    },
}

impl FlowState {
    pub fn name(&self) -> &'static str {
        match self {
            FlowState::NoOrder => "no_order",
            FlowState::OrderSubmitted { .. } => "order_submitted",
            FlowState::Queued { .. } => "queued",
            FlowState::CooldownPending { .. } => "cooldown_pending",
            FlowState::ExecuteSent { .. } => "execute_sent",
            FlowState::Executed { .. } => "executed",
            FlowState::Settled { .. } => "settled",
        }
    }

    pub fn order(&self) -> Option<&SubmittedOrder> {
        match self {
            FlowState::NoOrder => None,
            FlowState::OrderSubmitted { order }
            | FlowState::Queued { order, .. }
            | FlowState::CooldownPending { order, .. }
            | FlowState::ExecuteSent { order, .. }
            | FlowState::Executed { order, .. }
            | FlowState::Settled { order, .. } => Some(order),
        }
    }
}

/// One deposit: quote → order → queued pre-signature → execution → settlement.
///
/// Pure state; the service drives I/O and reports outcomes back through the
/// transition methods. At most one user action is in flight at a time.
#[derive(Debug, Clone)]
pub struct DepositFlow {
    id: Uuid,
    state: FlowState,
    in_flight: Option<FlowAction>,
    last_status: Option<OrderStatus>,
}

impl Default for DepositFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl DepositFlow {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: FlowState::NoOrder,
            in_flight: None,
            last_status: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn in_flight(&self) -> Option<FlowAction> {
        self.in_flight
    }

    pub fn last_status(&self) -> Option<OrderStatus> {
        self.last_status
    }

    pub fn order(&self) -> Option<&SubmittedOrder> {
        self.state.order()
    }

    pub fn relay_state(&self, now: DateTime<Utc>) -> RelayState {
        match &self.state {
            FlowState::NoOrder | FlowState::OrderSubmitted { .. } | FlowState::Settled { .. } => {
                RelayState::NoOrder
            }
            FlowState::Queued { .. } => RelayState::Queued,
            FlowState::CooldownPending { queued, .. } => {
                if queued.is_expired(now) {
                    RelayState::Expired
                } else if now >= queued.executable_at() {
                    RelayState::Executable
                } else {
                    RelayState::CooldownPending
                }
            }
            FlowState::ExecuteSent { .. } => RelayState::Executing,
            FlowState::Executed { .. } => RelayState::Executed,
        }
    }

    /// A broadcast transaction whose outcome has not been observed yet, with
    /// the action that sent it.
    pub fn unconfirmed_tx(&self) -> Option<(OrderUid, FlowAction, TxHash)> {
        match &self.state {
            FlowState::Queued { order, tx_hash } => {
                Some((order.uid.clone(), FlowAction::Queue, *tx_hash))
            }
            FlowState::ExecuteSent { order, tx_hash, .. } => {
                Some((order.uid.clone(), FlowAction::Execute, *tx_hash))
            }
            _ => None,
        }
    }

    // -- action bracketing ---------------------------------------------------

    pub fn begin(&mut self, action: FlowAction) -> Result<(), FlowError> {
        if let Some(current) = self.in_flight {
            return Err(FlowError::Busy(current));
        }
        self.in_flight = Some(action);
        Ok(())
    }

    pub fn end(&mut self, action: FlowAction) {
        if self.in_flight == Some(action) {
            self.in_flight = None;
        }
    }

    // -- order submission ------------------------------------------------------

    /// Check that an order may be created from `quote`.
    ///
    /// Returns the existing order when the current order was already created
    /// from this very quote.
    pub fn check_submit(
        &self,
        quote: &Quote,
        now: DateTime<Utc>,
    ) -> Result<Option<SubmittedOrder>, FlowError> {
        match &self.state {
            FlowState::OrderSubmitted { order } if order.quote == *quote => {
                return Ok(Some(order.clone()))
            }
            FlowState::NoOrder | FlowState::OrderSubmitted { .. } | FlowState::Settled { .. } => {}
            other => {
                return Err(FlowError::InvalidState {
                    action: "submit an order",
                    stage: other.name(),
                })
            }
        }

        if !quote.is_fresh(now) {
            return Err(FlowError::StaleQuote(quote.expires_at));
        }
        Ok(None)
    }

    pub fn order_submitted(&mut self, order: SubmittedOrder) {
        if matches!(self.state, FlowState::Settled { .. }) {
            self.id = Uuid::new_v4();
        }
        self.last_status = None;
        self.state = FlowState::OrderSubmitted { order };
    }

    // -- queue -----------------------------------------------------------------

    pub fn check_queue(&self) -> Result<SubmittedOrder, FlowError> {
        match &self.state {
            FlowState::OrderSubmitted { order } => Ok(order.clone()),
            FlowState::NoOrder => Err(FlowError::NoOrder),
            other => Err(FlowError::InvalidState {
                action: "queue the pre-signature",
                stage: other.name(),
            }),
        }
    }

    pub fn queue_sent(&mut self, uid: &OrderUid, tx_hash: TxHash) {
        if let FlowState::OrderSubmitted { order } = &self.state {
            if order.uid == *uid {
                self.state = FlowState::Queued {
                    order: order.clone(),
                    tx_hash,
                };
            }
        }
    }

    pub fn queue_confirmed(&mut self, uid: &OrderUid, queued: QueuedTx) {
        if let FlowState::Queued { order, .. } = &self.state {
            if order.uid == *uid {
                self.state = FlowState::CooldownPending {
                    order: order.clone(),
                    queued,
                };
            }
        }
    }

    /// Queue transaction rejected or reverted: back to the prior state.
    pub fn queue_failed(&mut self, uid: &OrderUid) {
        if let FlowState::Queued { order, .. } = &self.state {
            if order.uid == *uid {
                self.state = FlowState::OrderSubmitted {
                    order: order.clone(),
                };
            }
        }
    }

    // -- execute ---------------------------------------------------------------

    pub fn check_execute(&self, now: DateTime<Utc>) -> Result<SubmittedOrder, FlowError> {
        match &self.state {
            FlowState::CooldownPending { order, queued } => {
                if now < queued.executable_at() {
                    return Err(FlowError::CooldownActive(queued.executable_at()));
                }
                if let Some(expired_at) = queued.expires_at().filter(|at| now >= *at) {
                    return Err(FlowError::QueuedTxExpired(expired_at));
                }
                Ok(order.clone())
            }
            FlowState::NoOrder => Err(FlowError::NoOrder),
            other => Err(FlowError::InvalidState {
                action: "execute the pre-signature",
                stage: other.name(),
            }),
        }
    }

    pub fn execute_sent(&mut self, uid: &OrderUid, tx_hash: TxHash) {
        if let FlowState::CooldownPending { order, queued } = &self.state {
            if order.uid == *uid {
                self.state = FlowState::ExecuteSent {
                    order: order.clone(),
                    queued: *queued,
                    tx_hash,
                };
            }
        }
    }

    pub fn executed(&mut self, uid: &OrderUid, tx_hash: TxHash) {
        match &self.state {
            FlowState::CooldownPending { order, queued }
            | FlowState::ExecuteSent { order, queued, .. }
                if order.uid == *uid =>
            {
                self.state = FlowState::Executed {
                    order: order.clone(),
                    queued: *queued,
                    tx_hash,
                };
            }
            _ => {}
        }
    }

    /// Execute transaction reverted: the pre-signature is still queued.
    pub fn execute_failed(&mut self, uid: &OrderUid) {
        if let FlowState::ExecuteSent { order, queued, .. } = &self.state {
            if order.uid == *uid {
                self.state = FlowState::CooldownPending {
                    order: order.clone(),
                    queued: *queued,
                };
            }
        }
    }

    // -- status ----------------------------------------------------------------

    pub fn observe_status(&mut self, uid: &OrderUid, status: OrderStatus) -> StatusUpdate {
        let order = match &self.state {
            FlowState::Settled { .. } | FlowState::NoOrder => return StatusUpdate::Ignored,
            state => match state.order() {
                Some(order) if order.uid == *uid => order.clone(),
                _ => return StatusUpdate::Ignored,
            },
        };

        self.last_status = Some(status);
        if status.is_terminal() {
            self.state = FlowState::Settled { order, status };
            StatusUpdate::Terminal
        } else {
            StatusUpdate::Updated
        }
    }

    // -- reset -----------------------------------------------------------------

    /// Abandon the current deposit and start over.
    ///
    /// Refused while a pre-signature sits in the Delay queue: the module only
    /// holds one pending transaction for this flow.
    pub fn reset(&mut self) -> Result<(), FlowError> {
        if let Some(action) = self.in_flight {
            return Err(FlowError::Busy(action));
        }
        if matches!(
            self.state,
            FlowState::Queued { .. }
                | FlowState::CooldownPending { .. }
                | FlowState::ExecuteSent { .. }
        ) {
            return Err(FlowError::InvalidState {
                action: "start a new deposit",
                stage: self.state.name(),
            });
        }
        *self = Self::new();
        Ok(())
    }

    // -- view ------------------------------------------------------------------

    pub fn view(&self, now: DateTime<Utc>) -> FlowView {
        let order = self.order();
        let queued = match &self.state {
            FlowState::CooldownPending { queued, .. }
            | FlowState::ExecuteSent { queued, .. }
            | FlowState::Executed { queued, .. } => Some(*queued),
            _ => None,
        };
        let queue_tx = match &self.state {
            FlowState::Queued { tx_hash, .. } => Some(*tx_hash),
            _ => queued.map(|q| q.tx_hash),
        };
        let execute_tx = match &self.state {
            FlowState::ExecuteSent { tx_hash, .. } | FlowState::Executed { tx_hash, .. } => {
                Some(*tx_hash)
            }
            _ => None,
        };
        let cooldown_remaining_secs = match &self.state {
            FlowState::CooldownPending { queued, .. } => {
                Some((queued.executable_at() - now).num_seconds().max(0))
            }
            _ => None,
        };

        FlowView {
            id: self.id,
            stage: self.state.name(),
            relay: self.relay_state(now),
            in_flight: self.in_flight,
            order_uid: order.map(|o| o.uid.to_string()),
            presign_calldata: order.map(|o| o.call.data.clone()),
            queue_tx,
            execute_tx,
            queued_at: queued.map(|q| q.queued_at),
            executable_at: queued.map(|q| q.executable_at()),
            expires_at: queued.and_then(|q| q.expires_at()),
            cooldown_remaining_secs,
            order_status: self.last_status,
        }
    }
}

/// Serializable snapshot of a deposit flow.
#[derive(Debug, Clone, Serialize)]
pub struct FlowView {
    pub id: Uuid,
    pub stage: &'static str,
    pub relay: RelayState,
    pub in_flight: Option<FlowAction>,
    pub order_uid: Option<String>,
    pub presign_calldata: Option<Bytes>,
    pub queue_tx: Option<TxHash>,
    pub execute_tx: Option<TxHash>,
    pub queued_at: Option<DateTime<Utc>>,
    pub executable_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub cooldown_remaining_secs: Option<i64>,
    pub order_status: Option<OrderStatus>,
}
