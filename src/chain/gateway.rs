use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use super::contracts::ModuleCall;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("contract call failed: {0}")]
    Contract(#[from] alloy::contract::Error),

    #[error("no signer configured; on-chain writes are disabled")]
    NoSigner,

    #[error("transaction {0} reverted")]
    Reverted(TxHash),

    #[error("transaction {0} was not mined in time")]
    Timeout(TxHash),
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

/// ERC-20 metadata needed to parse and render amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// Read/write surface of the Zodiac Delay module guarding the Safe.
#[async_trait]
pub trait DelayModule: Send + Sync {
    /// Address of the account that signs module transactions, if any.
    fn signer(&self) -> Option<Address>;

    async fn is_module_enabled(&self, module: Address) -> Result<bool, ChainError>;

    /// Cooldown in seconds between queueing and execution.
    async fn tx_cooldown(&self) -> Result<u64, ChainError>;

    /// Seconds after the cooldown during which a queued tx stays executable;
    /// zero means it never expires.
    async fn tx_expiration(&self) -> Result<u64, ChainError>;

    /// Number of queued transactions not yet executed or skipped
    /// (`queueNonce - txNonce`).
    async fn pending_transactions(&self) -> Result<u64, ChainError>;

    /// Unix time at which the most recently queued transaction was created.
    async fn last_queued_at(&self) -> Result<Option<i64>, ChainError>;

    /// Broadcast `execTransactionFromModule` for `call`.
    async fn queue(&self, call: &ModuleCall) -> Result<TxHash, ChainError>;

    /// Broadcast `executeNextTx` for `call`.
    async fn execute_next(&self, call: &ModuleCall) -> Result<TxHash, ChainError>;

    /// Look up the receipt of `tx_hash` once; `None` while it is not mined.
    /// A failed receipt is `ChainError::Reverted`.
    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, ChainError>;

    /// Wait until `tx_hash` is mined; a failed receipt is `ChainError::Reverted`.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError>;
}

#[async_trait]
pub trait TokenReader: Send + Sync {
    async fn token_info(&self, token: Address) -> Result<TokenInfo, ChainError>;

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError>;
}

/// Clamp a uint256 read from chain into seconds.
pub fn u256_to_secs(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}
