use alloy::primitives::B256;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::chain::ChainClient;
use crate::config::Config;
use crate::error::{AppResult, ChainError};

/// How long to wait for inclusion and how often to ask
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl ConfirmationPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.confirmation_timeout(),
            poll_interval: config.confirmation_poll_interval(),
        }
    }
}

/// Suspend until `tx_hash` is included.
///
/// Fails with `ConfirmationTimeout` once the ceiling passes and with
/// `TransactionReverted` if the receipt reports failure.
pub async fn wait_for_confirmation(
    chain: &dyn ChainClient,
    tx_hash: B256,
    policy: ConfirmationPolicy,
) -> AppResult<()> {
    let poll = async {
        loop {
            match chain.receipt_status(tx_hash).await? {
                Some(true) => return Ok(()),
                Some(false) => {
                    return Err(ChainError::TransactionReverted(tx_hash.to_string()).into())
                }
                None => {
                    debug!("Transaction {} pending", tx_hash);
                    tokio::time::sleep(policy.poll_interval).await;
                }
            }
        }
    };

    match tokio::time::timeout(policy.timeout, poll).await {
        Ok(result) => {
            if result.is_ok() {
                info!("✓ Transaction {} confirmed", tx_hash);
            }
            result
        }
        Err(_) => {
            warn!(
                "Transaction {} not confirmed within {}s",
                tx_hash,
                policy.timeout.as_secs()
            );
            Err(ChainError::ConfirmationTimeout {
                tx_hash: tx_hash.to_string(),
                waited_secs: policy.timeout.as_secs(),
            }
            .into())
        }
    }
}
