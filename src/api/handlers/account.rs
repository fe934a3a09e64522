use axum::extract::State;
use axum::Json;

use crate::errors::AppError;
use crate::flow::AccountView;
use crate::AppState;

use super::ApiResponse;

/// GET /api/account: Safe balances and Delay module status
pub async fn summary(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AccountView>>, AppError> {
    let account = state.deposits.account().await?;
    Ok(Json(ApiResponse::ok(account)))
}
