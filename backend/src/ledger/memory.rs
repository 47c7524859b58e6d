use super::models::*;
use super::repository::AccountStore;
use crate::error::{AppError, AppResult, LedgerError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// In-memory store with the same semantics as the Postgres repository,
/// unique access keys included. Backs the unit tests.
pub struct MemoryStore {
    accounts: tokio::sync::RwLock<HashMap<Uuid, CustodialAccount>>,
    requests: tokio::sync::RwLock<HashMap<Uuid, PendingRequest>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            accounts: tokio::sync::RwLock::new(HashMap::new()),
            requests: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// All requests of an account, oldest first
    pub async fn requests_for(&self, account_id: Uuid) -> Vec<PendingRequest> {
        let requests = self.requests.read().await;
        let mut found: Vec<_> = requests
            .values()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        found
    }

    async fn find_account_by<F>(&self, predicate: F) -> Option<CustodialAccount>
    where
        F: Fn(&CustodialAccount) -> bool,
    {
        let accounts = self.accounts.read().await;
        accounts.values().find(|a| predicate(a)).cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, new: NewAccount) -> AppResult<CustodialAccount> {
        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.username == new.username) {
            return Err(AppError::InvalidInput("Username already in use".to_string()));
        }
        if accounts.values().any(|a| a.access_key == new.access_key) {
            return Err(LedgerError::AccessKeyTaken.into());
        }

        let now = Utc::now();
        let account = CustodialAccount {
            id: Uuid::new_v4(),
            username: new.username,
            access_key: new.access_key,
            wallet_address: new.wallet_address,
            wallet_private_key: new.wallet_private_key,
            initial_principal: new.initial_principal,
            profit_committed: rust_decimal::Decimal::ZERO,
            missed_reminders: 0,
            channel_id: None,
            is_active: false,
            last_reminder_at: None,
            last_withdrawal_at: None,
            created_at: now,
            updated_at: now,
        };
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, account_id: Uuid) -> AppResult<Option<CustodialAccount>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&account_id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<CustodialAccount>> {
        Ok(self.find_account_by(|a| a.username == username).await)
    }

    async fn find_by_access_key(&self, access_key: &str) -> AppResult<Option<CustodialAccount>> {
        Ok(self.find_account_by(|a| a.access_key == access_key).await)
    }

    async fn find_by_channel(&self, channel_id: &str) -> AppResult<Option<CustodialAccount>> {
        Ok(self
            .find_account_by(|a| a.channel_id.as_deref() == Some(channel_id))
            .await)
    }

    async fn list_reminder_targets(&self) -> AppResult<Vec<CustodialAccount>> {
        let accounts = self.accounts.read().await;
        let mut targets: Vec<_> = accounts
            .values()
            .filter(|a| a.is_reminder_target())
            .cloned()
            .collect();
        targets.sort_by_key(|a| a.created_at);
        Ok(targets)
    }

    async fn update_account(&self, account: &CustodialAccount) -> AppResult<()> {
        let mut accounts = self.accounts.write().await;
        if accounts
            .values()
            .any(|a| a.id != account.id && a.access_key == account.access_key)
        {
            return Err(LedgerError::AccessKeyTaken.into());
        }
        let stored = accounts
            .get_mut(&account.id)
            .ok_or(LedgerError::AccountNotFound)?;

        stored.access_key = account.access_key.clone();
        stored.profit_committed = account.profit_committed;
        stored.missed_reminders = account.missed_reminders;
        stored.channel_id = account.channel_id.clone();
        stored.is_active = account.is_active;
        stored.last_reminder_at = account.last_reminder_at;
        stored.last_withdrawal_at = account.last_withdrawal_at;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn open_request(
        &self,
        account: &CustodialAccount,
        request: NewPendingRequest,
    ) -> AppResult<PendingRequest> {
        // Lock order matches credit_request: requests, then accounts.
        let mut requests = self.requests.write().await;
        for existing in requests.values_mut() {
            if existing.account_id == request.account_id && existing.is_open() {
                existing.status = RequestStatus::Superseded;
            }
        }

        let created = PendingRequest {
            id: Uuid::new_v4(),
            account_id: request.account_id,
            amount: request.amount,
            message_id: request.message_id,
            status: RequestStatus::Pending,
            created_at: request.created_at,
            responded_at: None,
        };
        requests.insert(created.id, created.clone());

        self.update_account(account).await?;
        Ok(created)
    }

    async fn find_open_request(
        &self,
        account_id: Uuid,
        message_id: &str,
    ) -> AppResult<Option<PendingRequest>> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .filter(|r| r.account_id == account_id && r.message_id == message_id && r.is_open())
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn credit_request(
        &self,
        request_id: Uuid,
        account: &CustodialAccount,
        responded_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut requests = self.requests.write().await;
        let request = match requests.get_mut(&request_id) {
            Some(r) if r.is_open() => r,
            _ => return Ok(false),
        };
        request.status = RequestStatus::Responded;
        request.responded_at = Some(responded_at);

        self.update_account(account).await?;
        Ok(true)
    }

    async fn delete_requests(&self, account_id: Uuid) -> AppResult<u64> {
        let mut requests = self.requests.write().await;
        let before = requests.len();
        requests.retain(|_, r| r.account_id != account_id);
        Ok((before - requests.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_account(username: &str, key: &str) -> NewAccount {
        NewAccount {
            username: username.to_string(),
            access_key: key.to_string(),
            wallet_address: "0x0000000000000000000000000000000000000001".to_string(),
            wallet_private_key: "0x01".to_string(),
            initial_principal: dec!(100),
        }
    }

    #[tokio::test]
    async fn test_lookup_by_each_key() {
        let store = MemoryStore::new();
        let mut account = store.create_account(new_account("alice", "AB-1234")).await.unwrap();
        account.channel_id = Some("777".to_string());
        store.update_account(&account).await.unwrap();

        assert!(store.find_by_username("alice").await.unwrap().is_some());
        assert!(store.find_by_access_key("AB-1234").await.unwrap().is_some());
        assert_eq!(
            store.find_by_channel("777").await.unwrap().map(|a| a.id),
            Some(account.id)
        );
        assert!(store.find_by_channel("778").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = MemoryStore::new();
        store.create_account(new_account("alice", "AB-1234")).await.unwrap();
        assert!(store.create_account(new_account("alice", "CD-5678")).await.is_err());
    }

    #[tokio::test]
    async fn test_open_request_supersedes_previous() {
        let store = MemoryStore::new();
        let account = store.create_account(new_account("alice", "AB-1234")).await.unwrap();

        for message_id in ["1", "2"] {
            store
                .open_request(
                    &account,
                    NewPendingRequest {
                        account_id: account.id,
                        amount: dec!(0.1),
                        message_id: message_id.to_string(),
                        created_at: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }

        let requests = store.requests_for(account.id).await;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests.iter().filter(|r| r.is_open()).count(), 1);
        assert!(store.find_open_request(account.id, "1").await.unwrap().is_none());
        assert!(store.find_open_request(account.id, "2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_credit_request_only_once() {
        let store = MemoryStore::new();
        let account = store.create_account(new_account("alice", "AB-1234")).await.unwrap();
        let request = store
            .open_request(
                &account,
                NewPendingRequest {
                    account_id: account.id,
                    amount: dec!(0.1),
                    message_id: "1".to_string(),
                    created_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        assert!(store.credit_request(request.id, &account, Utc::now()).await.unwrap());
        assert!(!store.credit_request(request.id, &account, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_access_key_must_be_unique() {
        let store = MemoryStore::new();
        let mut first = store.create_account(new_account("alice", "AB-1234")).await.unwrap();

        let clash = store.create_account(new_account("bob", "AB-1234")).await;
        assert!(matches!(clash, Err(AppError::Ledger(LedgerError::AccessKeyTaken))));

        store.create_account(new_account("bob", "CD-5678")).await.unwrap();
        first.access_key = "CD-5678".to_string();
        let rotated = store.update_account(&first).await;
        assert!(matches!(rotated, Err(AppError::Ledger(LedgerError::AccessKeyTaken))));
        assert_eq!(
            store.find_by_access_key("CD-5678").await.unwrap().map(|a| a.username),
            Some("bob".to_string())
        );
    }
}
