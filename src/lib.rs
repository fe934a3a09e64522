pub mod api;
pub mod chain;
pub mod config;
pub mod cow;
pub mod errors;
pub mod flow;
pub mod metrics;
pub mod models;
pub mod services;

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::api::ws_types::WsMessage;
use crate::config::AppConfig;
use crate::flow::DepositService;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub ws_tx: broadcast::Sender<WsMessage>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
    pub deposits: Arc<DepositService>,
}
