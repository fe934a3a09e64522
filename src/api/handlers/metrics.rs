use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics::gauge;

use crate::AppState;

pub async fn render(State(state): State<AppState>) -> impl IntoResponse {
    // Flow gauges are sampled at scrape time
    let view = state.deposits.view().await;
    gauge!("deposit_cooldown_remaining_seconds")
        .set(view.flow.cooldown_remaining_secs.unwrap_or(0) as f64);
    gauge!("deposit_action_in_flight").set(if view.flow.in_flight.is_some() { 1.0 } else { 0.0 });

    let body = state.metrics_handle.render();
    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
