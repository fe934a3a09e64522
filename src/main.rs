use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;

use hootbank::api::router::create_router;
use hootbank::api::ws_types::WsMessage;
use hootbank::chain::{RpcChain, TokenReader};
use hootbank::config::AppConfig;
use hootbank::cow::OrderBookClient;
use hootbank::flow::{DepositService, DepositSettings};
use hootbank::metrics::init_metrics;
use hootbank::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);
    let metrics_handle = init_metrics()?;

    // --- Chain access ---
    let chain = Arc::new(RpcChain::connect(
        &config.rpc_url,
        config.delay_module_address,
        config.private_key.as_deref(),
        config.receipt_poll_interval,
    )?);

    let chain_id = chain.chain_id().await.context("failed to reach RPC node")?;
    if chain_id != config.chain_id {
        anyhow::bail!(
            "RPC node is on chain {chain_id}, expected {}",
            config.chain_id
        );
    }
    if !config.can_sign() {
        tracing::warn!("No PRIVATE_KEY configured; queue and execute are disabled");
    }

    let sell_token = chain
        .token_info(config.sell_token_address)
        .await
        .context("failed to read sell token metadata")?;
    let buy_token = chain
        .token_info(config.buy_token_address)
        .await
        .context("failed to read buy token metadata")?;
    tracing::info!(
        chain_id,
        safe = %config.safe_address,
        sell = %sell_token.symbol,
        buy = %buy_token.symbol,
        "Token metadata loaded"
    );

    // --- Order book ---
    let order_book = Arc::new(OrderBookClient::with_base_url(
        reqwest::Client::new(),
        config.orderbook_api_url.clone(),
    ));

    // --- Deposit flow ---
    let (ws_tx, _) = broadcast::channel::<WsMessage>(256);

    let settings = DepositSettings {
        safe: config.safe_address,
        delay_module: config.delay_module_address,
        settlement: config.settlement_address,
        sell_token,
        buy_token,
        poll_interval: config.order_poll_interval,
        explorer_url: config.explorer_url.clone(),
    };
    let deposits = Arc::new(DepositService::new(
        order_book,
        chain.clone(),
        chain,
        settings,
        ws_tx.clone(),
    ));

    let state = AppState {
        config,
        ws_tx,
        metrics_handle,
        deposits,
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    // LOG_FORMAT=json for log shippers
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
