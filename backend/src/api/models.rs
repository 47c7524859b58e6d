use crate::ledger::models::AccountView;
use crate::wallet::SignupOutcome;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

// ========== REQUEST MODELS ==========

/// Admin signup request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub username: String,

    #[validate(custom = "validate_positive")]
    pub initial_principal: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct LiquidateRequest {
    pub withdraw_address: String,
}

fn validate_positive(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_positive() && !value.is_zero() {
        Ok(())
    } else {
        let mut error = ValidationError::new("positive");
        error.message = Some("must be greater than zero".into());
        Err(error)
    }
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct CreateAccountResponse {
    pub account: AccountView,
    pub created: bool,
    pub funding_tx: Option<String>,
    pub approve_tx: Option<String>,
    pub supply_tx: Option<String>,
}

impl From<SignupOutcome> for CreateAccountResponse {
    fn from(outcome: SignupOutcome) -> Self {
        Self {
            account: AccountView::from(&outcome.account),
            created: outcome.created,
            funding_tx: outcome.funding_tx.map(|tx| tx.to_string()),
            approve_tx: outcome.deposit.as_ref().map(|d| d.approve_tx.to_string()),
            supply_tx: outcome.deposit.as_ref().map(|d| d.supply_tx.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LiquidateResponse {
    pub tx_hash: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
