// Reminder Scheduler - periodic yield reminders and inactivity deactivation
//
// Every interval, each active linked account is either deactivated (too many
// unanswered reminders) or sent its uncommitted yield with an open request
// attached. Accounts are processed concurrently; one failing account never
// blocks the others.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppResult;
use crate::ledger::CommitmentLedger;
use crate::messaging::{templates, Messenger};
use crate::wallet::AccountService;

/// What one tick did to one account
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderOutcome {
    Reminded { message_id: String, available: Decimal },
    Deactivated,
    /// Deactivated or unlinked since the target list was read
    Skipped,
}

/// Per-tick tally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub reminded: usize,
    pub deactivated: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct ReminderScheduler {
    ledger: Arc<CommitmentLedger>,
    accounts: Arc<AccountService>,
    messenger: Arc<dyn Messenger>,
    interval: Duration,
    death_threshold: i32,
}

impl ReminderScheduler {
    pub fn new(
        ledger: Arc<CommitmentLedger>,
        accounts: Arc<AccountService>,
        messenger: Arc<dyn Messenger>,
        interval: Duration,
        death_threshold: i32,
    ) -> Self {
        Self {
            ledger,
            accounts,
            messenger,
            interval,
            death_threshold,
        }
    }

    /// Tick immediately, then every interval, until `stop` flips to true
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        info!(
            "⏰ Reminder scheduler started (every {}s, threshold {})",
            self.interval.as_secs(),
            self.death_threshold
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => {}
            }

            match self.tick(Utc::now()).await {
                Ok(summary) => info!(
                    "✓ Reminder cycle completed: {} reminded, {} deactivated, {} skipped, {} failed",
                    summary.reminded, summary.deactivated, summary.skipped, summary.failed
                ),
                Err(e) => error!("❌ Reminder cycle failed: {}", e),
            }

            let pruned = self.ledger.prune_locks();
            if pruned > 0 {
                info!("Pruned {} idle account locks", pruned);
            }
        }

        info!("Reminder scheduler stopped");
    }

    /// One reminder cycle over every active linked account
    pub async fn tick(&self, now: DateTime<Utc>) -> AppResult<TickSummary> {
        info!("🔄 Starting reminder cycle");
        let targets = self.ledger.store().list_reminder_targets().await?;

        let results = join_all(
            targets
                .iter()
                .map(|account| self.process_account(account.id, now)),
        )
        .await;

        let mut summary = TickSummary::default();
        for (account, result) in targets.iter().zip(results) {
            match result {
                Ok(ReminderOutcome::Reminded { .. }) => summary.reminded += 1,
                Ok(ReminderOutcome::Deactivated) => summary.deactivated += 1,
                Ok(ReminderOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!("❌ Reminder for account {} failed: {}", account.id, e);
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Remind or deactivate a single account under its lock
    pub async fn process_account(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<ReminderOutcome> {
        let guard = self.ledger.lock(account_id).await;
        let mut account = self.ledger.load(&guard).await?;

        let channel_id = match (&account.channel_id, account.is_active) {
            (Some(channel_id), true) => channel_id.clone(),
            _ => return Ok(ReminderOutcome::Skipped),
        };

        if account.has_reached_threshold(self.death_threshold) {
            self.ledger.deactivate(&guard, &mut account).await?;
            if let Err(e) = self.messenger.send(&channel_id, templates::DEACTIVATED).await {
                warn!("Deactivation notice to account {} not delivered: {}", account.id, e);
            }
            return Ok(ReminderOutcome::Deactivated);
        }

        let withdrawable = self.accounts.withdrawable_of(&account).await?;
        let available = account.uncommitted_yield(withdrawable).max(Decimal::ZERO);
        let rendered = format!("{:.8}", available);

        let message_id = self
            .messenger
            .send(&channel_id, &templates::reminder(&account.username, &rendered))
            .await?;

        self.ledger
            .open_request(&guard, &mut account, available, message_id.clone(), now)
            .await?;

        Ok(ReminderOutcome::Reminded {
            message_id,
            available,
        })
    }
}
