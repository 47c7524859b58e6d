use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use uuid::Uuid;

/// Custodial account - one system-held wallet and its ledger per end user
///
/// INVARIANT: 0 <= profit_committed <= withdrawable - initial_principal
#[derive(Clone, FromRow)]
pub struct CustodialAccount {
    pub id: Uuid,
    pub username: String,
    pub access_key: String,
    pub wallet_address: String,
    /// Never rendered: not in `Debug`, not in `AccountView`.
    pub wallet_private_key: String,
    pub initial_principal: Decimal,
    pub profit_committed: Decimal,
    pub missed_reminders: i32,
    /// Unset until the user links their messaging channel
    pub channel_id: Option<String>,
    pub is_active: bool,
    pub last_reminder_at: Option<DateTime<Utc>>,
    pub last_withdrawal_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for CustodialAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustodialAccount")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("wallet_address", &self.wallet_address)
            .field("wallet_private_key", &"<redacted>")
            .field("initial_principal", &self.initial_principal)
            .field("profit_committed", &self.profit_committed)
            .field("missed_reminders", &self.missed_reminders)
            .field("channel_id", &self.channel_id)
            .field("is_active", &self.is_active)
            .finish()
    }
}

impl CustodialAccount {
    /// Eligible for a reminder tick
    pub fn is_reminder_target(&self) -> bool {
        self.is_active && self.channel_id.is_some()
    }

    pub fn has_reached_threshold(&self, death_threshold: i32) -> bool {
        self.missed_reminders >= death_threshold
    }

    /// Accrued yield not yet committed: `(withdrawable - principal) - committed`.
    /// Negative when commitments already exceed accrued interest.
    pub fn uncommitted_yield(&self, withdrawable: Decimal) -> Decimal {
        (withdrawable - self.initial_principal) - self.profit_committed
    }

    /// Whether a withdrawal at `now` respects the minimum spacing between withdrawals.
    pub fn can_withdraw_at(&self, now: DateTime<Utc>, interval: chrono::Duration) -> bool {
        match self.last_withdrawal_at {
            Some(last) => now - last >= interval,
            None => true,
        }
    }
}

/// Fields supplied at signup
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub access_key: String,
    pub wallet_address: String,
    pub wallet_private_key: String,
    pub initial_principal: Decimal,
}

/// Account as exposed to administrators (no key material)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountView {
    pub id: Uuid,
    pub username: String,
    pub access_key: String,
    pub wallet_address: String,
    pub initial_principal: Decimal,
    pub profit_committed: Decimal,
    pub missed_reminders: i32,
    pub channel_id: Option<String>,
    pub is_active: bool,
    pub last_reminder_at: Option<DateTime<Utc>>,
    pub last_withdrawal_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&CustodialAccount> for AccountView {
    fn from(account: &CustodialAccount) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            access_key: account.access_key.clone(),
            wallet_address: account.wallet_address.clone(),
            initial_principal: account.initial_principal,
            profit_committed: account.profit_committed,
            missed_reminders: account.missed_reminders,
            channel_id: account.channel_id.clone(),
            is_active: account.is_active,
            last_reminder_at: account.last_reminder_at,
            last_withdrawal_at: account.last_withdrawal_at,
            created_at: account.created_at,
        }
    }
}

/// Pending request lifecycle
///
/// Valid transitions:
/// - Pending → Responded (timely reply)
/// - Pending → Superseded (next reminder cycle opened a new request)
///
/// An expired request stays `Pending` in storage; expiry is a function of
/// its age and the response window, see [`PendingRequest::is_expired_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "request_status", rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Responded,
    Superseded,
}

/// Outstanding prompt asking the user to acknowledge accrued yield
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingRequest {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    /// Outbound message id used to correlate the reply
    pub message_id: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl PendingRequest {
    pub fn is_open(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Strictly older than the window counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now - self.created_at > window
    }
}

#[derive(Debug, Clone)]
pub struct NewPendingRequest {
    pub account_id: Uuid,
    pub amount: Decimal,
    pub message_id: String,
    pub created_at: DateTime<Utc>,
}
