use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::models::*;
use crate::{
    error::{AppError, AppResult},
    ledger::models::AccountView,
    wallet::{AccountService, YieldPreview},
};

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub admin_key: Arc<str>,
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Sign up a user: custodial wallet, funding and pool deposit
/// POST /accounts
pub async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> AppResult<Json<CreateAccountResponse>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(format!("Validation failed: {}", e)))?;

    info!("👤 Creating account for {}", request.username);

    let outcome = state
        .accounts
        .create_account(&request.username, request.initial_principal)
        .await?;

    Ok(Json(CreateAccountResponse::from(outcome)))
}

/// GET /accounts/:id
pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<AccountView>> {
    let account = state.accounts.get_account(account_id).await?;
    Ok(Json(AccountView::from(&account)))
}

/// Yield preview, computed the way the reminder cycle computes it
/// GET /accounts/:id/yield
pub async fn get_yield(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<YieldPreview>> {
    let preview = state.accounts.preview_yield(account_id).await?;
    Ok(Json(preview))
}

/// Withdraw principal plus committed profit and retire the account
/// POST /accounts/:id/liquidate
pub async fn liquidate_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Json(request): Json<LiquidateRequest>,
) -> AppResult<Json<LiquidateResponse>> {
    info!("🔄 Liquidating account {}", account_id);

    let withdrawal = state
        .accounts
        .liquidate(account_id, &request.withdraw_address, Utc::now())
        .await?;

    Ok(Json(LiquidateResponse {
        tx_hash: withdrawal.tx_hash.to_string(),
        amount: withdrawal.amount,
    }))
}

/// POST /accounts/:id/reset
pub async fn reset_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<AccountView>> {
    let account = state.accounts.reset(account_id, Utc::now()).await?;
    info!("Account {} reset by administrator", account_id);
    Ok(Json(AccountView::from(&account)))
}
