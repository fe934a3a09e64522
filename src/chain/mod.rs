pub mod contracts;
pub mod gateway;
pub mod rpc;

pub use contracts::{ModuleCall, Operation, GPV2_SETTLEMENT};
pub use gateway::{ChainError, DelayModule, TokenInfo, TokenReader, TxReceipt};
pub use rpc::RpcChain;
