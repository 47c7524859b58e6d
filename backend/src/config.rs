use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// Service configuration, read from the process environment.
///
/// Every key maps to the upper-cased env var of the same name
/// (`reminder_interval_minutes` <- `REMINDER_INTERVAL_MINUTES`).
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    pub treasury_private_key: String,

    #[serde(default = "default_usdc_address")]
    pub usdc_address: String,
    #[serde(default = "default_atoken_address")]
    pub atoken_address: String,
    #[serde(default = "default_pool_address")]
    pub pool_address: String,
    #[serde(default = "default_l1_gas_oracle_address")]
    pub l1_gas_oracle_address: String,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,
    #[serde(default = "default_explorer_tx_url")]
    pub explorer_tx_url: String,

    pub telegram_bot_token: String,
    #[serde(default = "default_telegram_messages_per_second")]
    pub telegram_messages_per_second: u32,

    pub admin_key: String,

    #[serde(default = "default_reminder_interval_minutes")]
    pub reminder_interval_minutes: u64,
    /// Falls back to the reminder interval when unset.
    pub response_window_secs: Option<u64>,
    #[serde(default = "default_withdrawal_interval_hours")]
    pub withdrawal_interval_hours: u64,
    #[serde(default = "default_death_threshold")]
    pub death_threshold: i32,

    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.admin_key.trim().is_empty() {
            return Err(AppError::Config("ADMIN_KEY must not be empty".to_string()));
        }
        if self.reminder_interval_minutes == 0 {
            return Err(AppError::Config(
                "REMINDER_INTERVAL_MINUTES must be positive".to_string(),
            ));
        }
        if self.death_threshold < 1 {
            return Err(AppError::Config("DEATH_THRESHOLD must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn reminder_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_interval_minutes * 60)
    }

    pub fn response_window(&self) -> chrono::Duration {
        let secs = self
            .response_window_secs
            .unwrap_or(self.reminder_interval_minutes * 60);
        chrono::Duration::seconds(secs as i64)
    }

    pub fn withdrawal_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.withdrawal_interval_hours as i64)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }
}

fn default_database_url() -> String {
    "postgresql://localhost/yieldkeeper".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_rpc_url() -> String {
    "https://rpc.scroll.io".to_string()
}

fn default_chain_id() -> u64 {
    534352
}

fn default_usdc_address() -> String {
    "0x06eFdBFf2a14a7c8E15944D1F4A48F9F95F663A4".to_string()
}

fn default_atoken_address() -> String {
    "0x1D738a3436A8C49CefFbaB7fbF04B660fb528CbD".to_string()
}

fn default_pool_address() -> String {
    "0x11fCfe756c05AD438e312a7fd934381537D3cFfe".to_string()
}

fn default_l1_gas_oracle_address() -> String {
    "0x5300000000000000000000000000000000000002".to_string()
}

fn default_token_decimals() -> u32 {
    6
}

fn default_explorer_tx_url() -> String {
    "https://scrollscan.com/tx/".to_string()
}

fn default_telegram_messages_per_second() -> u32 {
    25
}

fn default_reminder_interval_minutes() -> u64 {
    60
}

fn default_withdrawal_interval_hours() -> u64 {
    24
}

fn default_death_threshold() -> i32 {
    2
}

fn default_confirmation_timeout_secs() -> u64 {
    180
}

fn default_confirmation_poll_ms() -> u64 {
    1500
}
