use std::env;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::Context;

use crate::chain::GPV2_SETTLEMENT;

const DEFAULT_RPC_URL: &str = "https://rpc.gnosischain.com";
const DEFAULT_ORDERBOOK_API_URL: &str = "https://api.cow.fi/xdai";
const DEFAULT_EXPLORER_URL: &str = "https://explorer.cow.fi/gc";
/// EURe on Gnosis Chain.
const DEFAULT_SELL_TOKEN: &str = "0xcB444e90D8198415266c6a2724b7900fb12FC56E";
/// sDAI on Gnosis Chain.
const DEFAULT_BUY_TOKEN: &str = "0xaf204776c7245bF4147c2612BF6e5972Ee483701";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token for the protected API; unset disables auth (dev mode).
    pub api_token: Option<String>,

    // Chain
    pub chain_id: u64,
    pub rpc_url: String,
    /// Signs Delay module transactions; without it the service is read-only.
    pub private_key: Option<String>,
    pub receipt_poll_interval: Duration,

    // Accounts and contracts
    pub safe_address: Address,
    pub delay_module_address: Address,
    pub settlement_address: Address,
    pub sell_token_address: Address,
    pub buy_token_address: Address,

    // Order book
    pub orderbook_api_url: String,
    pub order_poll_interval: Duration,
    pub explorer_url: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()
                .context("PORT must be a port number")?,
            api_token: env::var("API_TOKEN").ok().filter(|t| !t.is_empty()),

            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| "100".into())
                .parse()
                .context("CHAIN_ID must be an integer")?,
            rpc_url: env::var("RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.into()),
            private_key: env::var("PRIVATE_KEY").ok().filter(|k| !k.trim().is_empty()),
            receipt_poll_interval: Duration::from_millis(interval_var(
                "RECEIPT_POLL_INTERVAL_MS",
                "2000",
            )?),

            safe_address: required_address("SAFE_ADDRESS")?,
            delay_module_address: required_address("DELAY_MODULE_ADDRESS")?,
            settlement_address: optional_address("SETTLEMENT_ADDRESS")?.unwrap_or(GPV2_SETTLEMENT),
            sell_token_address: address_or("SELL_TOKEN_ADDRESS", DEFAULT_SELL_TOKEN)?,
            buy_token_address: address_or("BUY_TOKEN_ADDRESS", DEFAULT_BUY_TOKEN)?,

            orderbook_api_url: env::var("ORDERBOOK_API_URL")
                .unwrap_or_else(|_| DEFAULT_ORDERBOOK_API_URL.into()),
            order_poll_interval: Duration::from_secs(interval_var("ORDER_POLL_INTERVAL_SECS", "5")?),
            explorer_url: env::var("EXPLORER_URL").unwrap_or_else(|_| DEFAULT_EXPLORER_URL.into()),
        })
    }

    /// Returns true if a signer key is configured.
    pub fn can_sign(&self) -> bool {
        self.private_key.is_some()
    }
}

/// Polling intervals must be positive: a zero period panics the poller's
/// ticker and spins the receipt loop.
fn parse_interval(name: &str, raw: &str) -> anyhow::Result<u64> {
    let value: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{name} must be an integer: {raw}"))?;
    anyhow::ensure!(value > 0, "{name} must be greater than zero");
    Ok(value)
}

fn interval_var(name: &str, default: &str) -> anyhow::Result<u64> {
    let raw = env::var(name).unwrap_or_else(|_| default.into());
    parse_interval(name, &raw)
}

fn parse_address(name: &str, raw: &str) -> anyhow::Result<Address> {
    raw.trim()
        .parse()
        .with_context(|| format!("{name} is not a valid address: {raw}"))
}

fn required_address(name: &str) -> anyhow::Result<Address> {
    let raw = env::var(name).map_err(|_| anyhow::anyhow!("{name} must be set"))?;
    parse_address(name, &raw)
}

fn optional_address(name: &str) -> anyhow::Result<Option<Address>> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse_address(name, &raw).map(Some),
        _ => Ok(None),
    }
}

fn address_or(name: &str, default: &str) -> anyhow::Result<Address> {
    match optional_address(name)? {
        Some(address) => Ok(address),
        None => parse_address(name, default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_accepts_checksummed_and_lowercase() {
        let a = parse_address("X", DEFAULT_SELL_TOKEN).unwrap();
        let b = parse_address("X", &DEFAULT_SELL_TOKEN.to_lowercase()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_poll_intervals_are_rejected() {
        for name in ["ORDER_POLL_INTERVAL_SECS", "RECEIPT_POLL_INTERVAL_MS"] {
            let err = parse_interval(name, "0").unwrap_err();
            assert!(err.to_string().contains(name));
            assert!(err.to_string().contains("greater than zero"));
        }
    }

    #[test]
    fn test_poll_intervals_parse() {
        assert_eq!(parse_interval("ORDER_POLL_INTERVAL_SECS", "5").unwrap(), 5);
        assert_eq!(parse_interval("RECEIPT_POLL_INTERVAL_MS", " 2000 ").unwrap(), 2000);
        assert!(parse_interval("ORDER_POLL_INTERVAL_SECS", "-1").is_err());
        assert!(parse_interval("ORDER_POLL_INTERVAL_SECS", "soon").is_err());
    }

    #[test]
    fn test_parse_address_rejects_garbage() {
        let err = parse_address("SAFE_ADDRESS", "0x1234").unwrap_err();
        assert!(err.to_string().contains("SAFE_ADDRESS"));
    }
}
