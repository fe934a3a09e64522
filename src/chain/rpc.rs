use std::str::FromStr;
use std::time::Duration;

use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use anyhow::Context;
use async_trait::async_trait;
use tokio::time::{sleep, Instant};

use super::contracts::{Delay, ModuleCall, ERC20};
use super::gateway::{u256_to_secs, ChainError, DelayModule, TokenInfo, TokenReader, TxReceipt};

/// Give up waiting for a receipt after this long; the tx may still land.
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(300);

/// JSON-RPC backed access to the Delay module and token contracts.
///
/// With a private key the provider signs and broadcasts module transactions;
/// without one only reads are available.
pub struct RpcChain {
    provider: DynProvider,
    delay_module: Address,
    signer: Option<Address>,
    receipt_poll_interval: Duration,
}

impl RpcChain {
    pub fn connect(
        rpc_url: &str,
        delay_module: Address,
        private_key: Option<&str>,
        receipt_poll_interval: Duration,
    ) -> anyhow::Result<Self> {
        let url = Url::parse(rpc_url).with_context(|| format!("invalid RPC URL {rpc_url}"))?;

        let (provider, signer) = match private_key {
            Some(key) => {
                let signer = PrivateKeySigner::from_str(key).context("invalid PRIVATE_KEY")?;
                let address = signer.address();
                let provider = ProviderBuilder::new()
                    .wallet(EthereumWallet::from(signer))
                    .connect_http(url)
                    .erased();
                (provider, Some(address))
            }
            None => (ProviderBuilder::new().connect_http(url).erased(), None),
        };

        tracing::info!(
            rpc_url,
            delay_module = %delay_module,
            signer = ?signer,
            "Chain provider configured"
        );

        Ok(Self {
            provider,
            delay_module,
            signer,
            receipt_poll_interval,
        })
    }

    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    fn delay(&self) -> Delay::DelayInstance<DynProvider> {
        Delay::new(self.delay_module, self.provider.clone())
    }

    async fn send_to_module(&self, input: Bytes) -> Result<TxHash, ChainError> {
        let from = self.signer.ok_or(ChainError::NoSigner)?;
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(self.delay_module)
            .with_input(input);

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        Ok(*pending.tx_hash())
    }
}

#[async_trait]
impl DelayModule for RpcChain {
    fn signer(&self) -> Option<Address> {
        self.signer
    }

    async fn is_module_enabled(&self, module: Address) -> Result<bool, ChainError> {
        Ok(self.delay().isModuleEnabled(module).call().await?)
    }

    async fn tx_cooldown(&self) -> Result<u64, ChainError> {
        let cooldown = self.delay().txCooldown().call().await?;
        Ok(u256_to_secs(cooldown))
    }

    async fn tx_expiration(&self) -> Result<u64, ChainError> {
        let expiration = self.delay().txExpiration().call().await?;
        Ok(u256_to_secs(expiration))
    }

    async fn pending_transactions(&self) -> Result<u64, ChainError> {
        let delay = self.delay();
        let queue_nonce = delay.queueNonce().call().await?;
        let tx_nonce = delay.txNonce().call().await?;
        Ok(u256_to_secs(queue_nonce.saturating_sub(tx_nonce)))
    }

    async fn last_queued_at(&self) -> Result<Option<i64>, ChainError> {
        let delay = self.delay();
        let queue_nonce = delay.queueNonce().call().await?;
        if queue_nonce.is_zero() {
            return Ok(None);
        }

        let created = delay.getTxCreatedAt(queue_nonce - U256::from(1u8)).call().await?;
        Ok(i64::try_from(created).ok())
    }

    async fn queue(&self, call: &ModuleCall) -> Result<TxHash, ChainError> {
        let tx_hash = self.send_to_module(call.queue_calldata()).await?;
        tracing::info!(tx_hash = %tx_hash, to = %call.to, "execTransactionFromModule broadcast");
        Ok(tx_hash)
    }

    async fn execute_next(&self, call: &ModuleCall) -> Result<TxHash, ChainError> {
        let tx_hash = self.send_to_module(call.execute_calldata()).await?;
        tracing::info!(tx_hash = %tx_hash, to = %call.to, "executeNextTx broadcast");
        Ok(tx_hash)
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<TxReceipt>, ChainError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        match receipt {
            Some(receipt) if !receipt.status() => Err(ChainError::Reverted(tx_hash)),
            Some(receipt) => Ok(Some(TxReceipt {
                tx_hash,
                block_number: receipt.block_number,
            })),
            None => Ok(None),
        }
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, ChainError> {
        let deadline = Instant::now() + RECEIPT_TIMEOUT;

        loop {
            if let Some(receipt) = self.receipt(tx_hash).await? {
                return Ok(receipt);
            }
            if Instant::now() >= deadline {
                return Err(ChainError::Timeout(tx_hash));
            }
            sleep(self.receipt_poll_interval).await;
        }
    }
}

#[async_trait]
impl TokenReader for RpcChain {
    async fn token_info(&self, token: Address) -> Result<TokenInfo, ChainError> {
        let erc20 = ERC20::new(token, self.provider.clone());
        let symbol = erc20.symbol().call().await?;
        let decimals = erc20.decimals().call().await?;
        Ok(TokenInfo {
            address: token,
            symbol,
            decimals,
        })
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        let erc20 = ERC20::new(token, self.provider.clone());
        Ok(erc20.balanceOf(owner).call().await?)
    }
}
