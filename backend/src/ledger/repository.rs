use super::models::*;
use crate::error::{AppError, AppResult, LedgerError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

/// Record store consumed by the ledger, the scheduler and the admin surface.
///
/// Multi-record writes (`open_request`, `credit_request`) are atomic.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with `AccessKeyTaken` when the drawn access key is in use
    async fn create_account(&self, new: NewAccount) -> AppResult<CustodialAccount>;

    async fn get_account(&self, account_id: Uuid) -> AppResult<Option<CustodialAccount>>;

    async fn find_by_username(&self, username: &str) -> AppResult<Option<CustodialAccount>>;

    async fn find_by_access_key(&self, access_key: &str) -> AppResult<Option<CustodialAccount>>;

    async fn find_by_channel(&self, channel_id: &str) -> AppResult<Option<CustodialAccount>>;

    /// Active accounts with a linked channel
    async fn list_reminder_targets(&self) -> AppResult<Vec<CustodialAccount>>;

    /// Persist every mutable field of the account. Fails with
    /// `AccessKeyTaken` when another account holds the same access key.
    async fn update_account(&self, account: &CustodialAccount) -> AppResult<()>;

    /// Supersede the account's open requests, insert the new one and persist the account
    async fn open_request(
        &self,
        account: &CustodialAccount,
        request: NewPendingRequest,
    ) -> AppResult<PendingRequest>;

    async fn find_open_request(
        &self,
        account_id: Uuid,
        message_id: &str,
    ) -> AppResult<Option<PendingRequest>>;

    /// Mark the request responded and persist the account in one step.
    /// Returns `false`, writing nothing, when the request is no longer pending.
    async fn credit_request(
        &self,
        request_id: Uuid,
        account: &CustodialAccount,
        responded_at: DateTime<Utc>,
    ) -> AppResult<bool>;

    async fn delete_requests(&self, account_id: Uuid) -> AppResult<u64>;
}

const ACCOUNT_COLUMNS: &str = r#"
    id, username, access_key, wallet_address, wallet_private_key,
    initial_principal, profit_committed, missed_reminders, channel_id,
    is_active, last_reminder_at, last_withdrawal_at, created_at, updated_at
"#;

const ACCESS_KEY_CONSTRAINT: &str = "accounts_access_key_key";

const REQUEST_COLUMNS: &str = r#"
    id, account_id, amount, message_id, status, created_at, responded_at
"#;

/// Postgres-backed store - the source of truth in production
pub struct LedgerRepository {
    pub pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> AppResult<Option<CustodialAccount>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE {} = $1 LIMIT 1",
            ACCOUNT_COLUMNS, column
        );
        let account = sqlx::query_as::<_, CustodialAccount>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn write_account<'e, E>(executor: E, account: &CustodialAccount) -> AppResult<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE accounts
            SET access_key = $2,
                profit_committed = $3,
                missed_reminders = $4,
                channel_id = $5,
                is_active = $6,
                last_reminder_at = $7,
                last_withdrawal_at = $8,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(account.id)
        .bind(&account.access_key)
        .bind(account.profit_committed)
        .bind(account.missed_reminders)
        .bind(&account.channel_id)
        .bind(account.is_active)
        .bind(account.last_reminder_at)
        .bind(account.last_withdrawal_at)
        .execute(executor)
        .await
        .map_err(access_key_conflict)?;
        Ok(())
    }
}

/// A clash on the access key's unique index becomes `AccessKeyTaken`
fn access_key_conflict(error: sqlx::Error) -> AppError {
    match &error {
        sqlx::Error::Database(db)
            if db.is_unique_violation() && db.constraint() == Some(ACCESS_KEY_CONSTRAINT) =>
        {
            LedgerError::AccessKeyTaken.into()
        }
        _ => error.into(),
    }
}

#[async_trait]
impl AccountStore for LedgerRepository {
    async fn create_account(&self, new: NewAccount) -> AppResult<CustodialAccount> {
        let sql = format!(
            r#"
            INSERT INTO accounts (
                username, access_key, wallet_address, wallet_private_key, initial_principal
            )
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );
        let account = sqlx::query_as::<_, CustodialAccount>(&sql)
            .bind(&new.username)
            .bind(&new.access_key)
            .bind(&new.wallet_address)
            .bind(&new.wallet_private_key)
            .bind(new.initial_principal)
            .fetch_one(&self.pool)
            .await
            .map_err(access_key_conflict)?;

        info!("Account created: {} ({})", account.id, account.username);
        Ok(account)
    }

    async fn get_account(&self, account_id: Uuid) -> AppResult<Option<CustodialAccount>> {
        let sql = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let account = sqlx::query_as::<_, CustodialAccount>(&sql)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<CustodialAccount>> {
        self.find_one("username", username).await
    }

    async fn find_by_access_key(&self, access_key: &str) -> AppResult<Option<CustodialAccount>> {
        self.find_one("access_key", access_key).await
    }

    async fn find_by_channel(&self, channel_id: &str) -> AppResult<Option<CustodialAccount>> {
        self.find_one("channel_id", channel_id).await
    }

    async fn list_reminder_targets(&self) -> AppResult<Vec<CustodialAccount>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE is_active AND channel_id IS NOT NULL ORDER BY created_at",
            ACCOUNT_COLUMNS
        );
        let accounts = sqlx::query_as::<_, CustodialAccount>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(accounts)
    }

    async fn update_account(&self, account: &CustodialAccount) -> AppResult<()> {
        Self::write_account(&self.pool, account).await
    }

    async fn open_request(
        &self,
        account: &CustodialAccount,
        request: NewPendingRequest,
    ) -> AppResult<PendingRequest> {
        let mut tx = self.pool.begin().await?;

        let superseded = sqlx::query(
            "UPDATE pending_requests SET status = 'superseded' WHERE account_id = $1 AND status = 'pending'",
        )
        .bind(request.account_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let sql = format!(
            r#"
            INSERT INTO pending_requests (account_id, amount, message_id, status, created_at)
            VALUES ($1, $2, $3, 'pending', $4)
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        );
        let created = sqlx::query_as::<_, PendingRequest>(&sql)
            .bind(request.account_id)
            .bind(request.amount)
            .bind(&request.message_id)
            .bind(request.created_at)
            .fetch_one(&mut *tx)
            .await?;

        Self::write_account(&mut *tx, account).await?;

        tx.commit().await?;

        if superseded > 0 {
            info!(
                "Superseded {} open request(s) for account {}",
                superseded, request.account_id
            );
        }
        Ok(created)
    }

    async fn find_open_request(
        &self,
        account_id: Uuid,
        message_id: &str,
    ) -> AppResult<Option<PendingRequest>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM pending_requests
            WHERE account_id = $1 AND message_id = $2 AND status = 'pending'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            REQUEST_COLUMNS
        );
        let request = sqlx::query_as::<_, PendingRequest>(&sql)
            .bind(account_id)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(request)
    }

    async fn credit_request(
        &self,
        request_id: Uuid,
        account: &CustodialAccount,
        responded_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE pending_requests
            SET status = 'responded', responded_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(request_id)
        .bind(responded_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::write_account(&mut *tx, account).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn delete_requests(&self, account_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM pending_requests WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
