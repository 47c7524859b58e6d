use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Messaging error: {0}")]
    Messaging(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// On-chain and estimation errors
///
/// Any of these aborts the multi-step sequence it happens in. A step that
/// already confirmed stays confirmed.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Gas estimation failed for {operation}")]
    GasEstimationFailed {
        operation: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Network did not report a max fee per gas")]
    GasPriceUnavailable,

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Transaction {tx_hash} not confirmed after {waited_secs}s")]
    ConfirmationTimeout { tx_hash: String, waited_secs: u64 },

    #[error("Transaction {0} reverted")]
    TransactionReverted(String),

    #[error("Upstream RPC error: {0}")]
    UpstreamRpc(String),

    #[error("Stored wallet key is not a valid secp256k1 key")]
    InvalidKey,
}

/// Request/commitment ledger errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Account not found")]
    AccountNotFound,

    #[error("Access key not recognised")]
    InvalidAccessKey,

    #[error("Access key already in use")]
    AccessKeyTaken,

    #[error("Request not found or already responded")]
    RequestNotFound,

    #[error("Request expired")]
    RequestExpired,

    #[error("Withdrawal requested too soon after the previous one")]
    WithdrawalTooSoon,

    #[error("No committed profit to withdraw")]
    NoCommittedProfit,
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl AppError {
    /// Short machine-oriented code used by the admin surface.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Chain(ChainError::GasEstimationFailed { .. }) => "GAS_ESTIMATION_FAILED",
            AppError::Chain(ChainError::GasPriceUnavailable) => "GAS_PRICE_UNAVAILABLE",
            AppError::Chain(ChainError::InsufficientBalance { .. }) => "INSUFFICIENT_BALANCE",
            AppError::Chain(ChainError::InvalidAddress(_)) => "INVALID_ADDRESS",
            AppError::Chain(ChainError::ConfirmationTimeout { .. }) => "CONFIRMATION_TIMEOUT",
            AppError::Chain(ChainError::TransactionReverted(_)) => "TRANSACTION_REVERTED",
            AppError::Chain(ChainError::UpstreamRpc(_)) => "UPSTREAM_RPC_ERROR",
            AppError::Chain(ChainError::InvalidKey) => "INVALID_WALLET_KEY",
            AppError::Ledger(LedgerError::AccountNotFound) => "ACCOUNT_NOT_FOUND",
            AppError::Ledger(LedgerError::InvalidAccessKey) => "INVALID_ACCESS_KEY",
            AppError::Ledger(LedgerError::AccessKeyTaken) => "ACCESS_KEY_TAKEN",
            AppError::Ledger(LedgerError::RequestNotFound) => "REQUEST_NOT_FOUND",
            AppError::Ledger(LedgerError::RequestExpired) => "REQUEST_EXPIRED",
            AppError::Ledger(LedgerError::WithdrawalTooSoon) => "WITHDRAWAL_TOO_SOON",
            AppError::Ledger(LedgerError::NoCommittedProfit) => "NO_COMMITTED_PROFIT",
            AppError::Messaging(_) => "MESSAGING_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to hand to an administrator. Chain and database detail stays in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::InvalidInput(msg) => msg.clone(),
            AppError::Ledger(e) => e.to_string(),
            AppError::Chain(ChainError::InvalidAddress(_)) => "Invalid withdraw address".to_string(),
            AppError::Chain(ChainError::InsufficientBalance { .. }) => {
                "Insufficient balance".to_string()
            }
            AppError::Chain(_) => "On-chain operation failed".to_string(),
            AppError::Unauthorized => "Unauthorized".to_string(),
            _ => "Request failed".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        };

        if status != StatusCode::UNAUTHORIZED {
            tracing::error!("Admin request failed: {:?}", self);
        }

        let body = Json(ErrorResponse {
            error: self.public_message(),
            error_code: self.error_code().to_string(),
        });

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::Messaging(format!("HTTP request error: {:?}", error))
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
