pub mod deposit;
pub mod error;
pub mod quote_cache;
pub mod service;

pub use deposit::{
    DepositFlow, FlowAction, FlowState, FlowView, QueuedTx, RelayState, StatusUpdate,
    SubmittedOrder,
};
pub use error::FlowError;
pub use quote_cache::{QuoteCache, QuoteLookup, QuoteStatus};
pub use service::{AccountView, BalanceView, DepositService, DepositSettings, DepositView};
