use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::commands::Command;
use super::templates;
use super::{InboundMessage, Messenger};
use crate::error::{AppError, ChainError, LedgerError};
use crate::ledger::CommitmentLedger;
use crate::wallet::AccountService;

/// Routes inbound user messages to the ledger and the account service and
/// answers each with a fixed template. Error detail never leaves this module.
pub struct BotDispatcher {
    ledger: Arc<CommitmentLedger>,
    accounts: Arc<AccountService>,
    messenger: Arc<dyn Messenger>,
    explorer_tx_url: String,
    withdrawal_interval_hours: i64,
}

impl BotDispatcher {
    pub fn new(
        ledger: Arc<CommitmentLedger>,
        accounts: Arc<AccountService>,
        messenger: Arc<dyn Messenger>,
        explorer_tx_url: String,
        withdrawal_interval_hours: i64,
    ) -> Self {
        Self {
            ledger,
            accounts,
            messenger,
            explorer_tx_url,
            withdrawal_interval_hours,
        }
    }

    pub async fn handle(&self, message: InboundMessage) {
        let reply = match Command::parse(&message.text) {
            Some(Command::Link { access_key }) => {
                Some(self.link(&access_key, &message.channel_id).await)
            }
            Some(Command::Start) => Some(templates::WELCOME.to_string()),
            Some(Command::Withdraw { address: None }) => {
                Some(templates::MISSING_ADDRESS.to_string())
            }
            Some(Command::Withdraw {
                address: Some(address),
            }) => Some(self.withdraw(&message.channel_id, &address).await),
            None => match &message.reply_to {
                Some(original) if original.from_bot => {
                    self.reply(&message.channel_id, &original.message_id).await
                }
                _ => None,
            },
        };

        if let Some(text) = reply {
            if let Err(e) = self.messenger.send(&message.channel_id, &text).await {
                error!("❌ Failed to answer channel {}: {}", message.channel_id, e);
            }
        }
    }

    async fn link(&self, access_key: &str, channel_id: &str) -> String {
        match self.ledger.link_channel(access_key, channel_id, Utc::now()).await {
            Ok(account) => templates::setup_complete(&account.username),
            Err(AppError::Ledger(LedgerError::InvalidAccessKey)) => {
                debug!("Channel {} sent an unknown access key", channel_id);
                templates::INVALID_ACCESS_KEY.to_string()
            }
            Err(e) => {
                error!("❌ Linking channel {} failed: {}", channel_id, e);
                templates::ERROR.to_string()
            }
        }
    }

    async fn withdraw(&self, channel_id: &str, address: &str) -> String {
        match self
            .accounts
            .withdraw_committed(channel_id, address, Utc::now())
            .await
        {
            Ok(withdrawal) => {
                let tx_url = format!("{}{}", self.explorer_tx_url, withdrawal.tx_hash);
                templates::withdraw_success(withdrawal.amount, &withdrawal.destination, &tx_url)
            }
            Err(AppError::Ledger(LedgerError::WithdrawalTooSoon)) => {
                templates::withdrawal_too_soon(self.withdrawal_interval_hours)
            }
            Err(AppError::Ledger(LedgerError::NoCommittedProfit)) => {
                templates::NO_PROFIT.to_string()
            }
            Err(AppError::Chain(ChainError::InvalidAddress(_))) => {
                templates::INVALID_ADDRESS.to_string()
            }
            Err(AppError::Ledger(LedgerError::AccountNotFound)) => templates::ERROR.to_string(),
            Err(e) => {
                error!("❌ Withdrawal for channel {} failed: {}", channel_id, e);
                templates::WITHDRAW_ERROR.to_string()
            }
        }
    }

    /// `None` for channels no account is linked to
    async fn reply(&self, channel_id: &str, message_id: &str) -> Option<String> {
        match self.ledger.handle_reply(channel_id, message_id, Utc::now()).await {
            Ok(credit) => {
                info!("🌱 Reply from {} credited {}", channel_id, credit.amount);
                Some(templates::thanks(credit.amount, credit.total))
            }
            Err(AppError::Ledger(LedgerError::RequestExpired)) => {
                Some(templates::REQUEST_EXPIRED.to_string())
            }
            Err(AppError::Ledger(LedgerError::RequestNotFound)) => {
                Some(templates::ALREADY_RESPONDED.to_string())
            }
            Err(AppError::Ledger(LedgerError::AccountNotFound)) => {
                warn!("Reply from unlinked channel {} ignored", channel_id);
                None
            }
            Err(e) => {
                error!("❌ Handling reply from {} failed: {}", channel_id, e);
                Some(templates::ERROR.to_string())
            }
        }
    }
}

/// Inbound messages in flight, one task each.
///
/// Handlers are never detached: [`HandlerSet::drain`] waits for every one of
/// them, so a withdrawal already submitted on-chain still gets its ledger
/// reset when the service shuts down.
pub struct HandlerSet {
    bot: Arc<BotDispatcher>,
    tasks: JoinSet<()>,
}

impl HandlerSet {
    pub fn new(bot: Arc<BotDispatcher>) -> Self {
        Self {
            bot,
            tasks: JoinSet::new(),
        }
    }

    pub fn dispatch(&mut self, message: InboundMessage) {
        self.reap();
        let bot = self.bot.clone();
        self.tasks.spawn(async move { bot.handle(message).await });
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every handler still running
    pub async fn drain(mut self) {
        if !self.tasks.is_empty() {
            info!("⏳ Waiting for {} in-flight message handler(s)", self.tasks.len());
        }
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                error!("❌ Message handler task failed: {}", e);
            }
        }
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                error!("❌ Message handler task failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AccountStore;
    use crate::messaging::ReplyRef;
    use crate::testing::{RecordingMessenger, TestStack};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    const DESTINATION: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn dispatcher(stack: &TestStack) -> BotDispatcher {
        BotDispatcher::new(
            stack.ledger.clone(),
            stack.accounts.clone(),
            stack.messenger.clone(),
            "https://scrollscan.com/tx/".to_string(),
            24,
        )
    }

    fn text(channel_id: &str, text: &str) -> InboundMessage {
        InboundMessage {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
            reply_to: None,
        }
    }

    fn reply_to(channel_id: &str, message_id: &str) -> InboundMessage {
        InboundMessage {
            channel_id: channel_id.to_string(),
            text: "Done".to_string(),
            reply_to: Some(ReplyRef {
                message_id: message_id.to_string(),
                from_bot: true,
            }),
        }
    }

    /// Open a request the way the scheduler does, returning its message id
    async fn remind(stack: &TestStack, channel_id: &str, amount: rust_decimal::Decimal) -> String {
        let account = stack.store.find_by_channel(channel_id).await.unwrap().unwrap();
        let guard = stack.ledger.lock(account.id).await;
        let mut account = stack.ledger.load(&guard).await.unwrap();
        let message_id = stack
            .messenger
            .send(channel_id, &templates::reminder(&account.username, "x"))
            .await
            .unwrap();
        stack
            .ledger
            .open_request(&guard, &mut account, amount, message_id.clone(), Utc::now())
            .await
            .unwrap();
        message_id
    }

    #[tokio::test]
    async fn test_link_with_valid_and_invalid_key() {
        let stack = TestStack::new();
        let bot = dispatcher(&stack);
        let outcome = stack
            .accounts
            .create_account("alice", dec!(100))
            .await
            .unwrap();

        bot.handle(text("777", "/hi not-a-key")).await;
        assert_eq!(
            stack.messenger.last_text().as_deref(),
            Some(templates::INVALID_ACCESS_KEY)
        );

        bot.handle(text("777", &format!("/hi {}", outcome.account.access_key)))
            .await;
        assert_eq!(
            stack.messenger.last_text(),
            Some(templates::setup_complete("alice"))
        );

        let linked = stack.accounts.get_account(outcome.account.id).await.unwrap();
        assert!(linked.is_active);
        assert_eq!(linked.channel_id.as_deref(), Some("777"));
    }

    #[tokio::test]
    async fn test_start_and_missing_address() {
        let stack = TestStack::new();
        let bot = dispatcher(&stack);

        bot.handle(text("1", "/start")).await;
        assert_eq!(stack.messenger.last_text().as_deref(), Some(templates::WELCOME));

        bot.handle(text("1", "/withdraw")).await;
        assert_eq!(
            stack.messenger.last_text().as_deref(),
            Some(templates::MISSING_ADDRESS)
        );
    }

    #[tokio::test]
    async fn test_reply_credit_then_duplicate() {
        let stack = TestStack::new();
        let bot = dispatcher(&stack);
        stack.linked_account("alice", "777").await;
        let message_id = remind(&stack, "777", dec!(0.0005)).await;

        bot.handle(reply_to("777", &message_id)).await;
        assert_eq!(
            stack.messenger.last_text(),
            Some(templates::thanks(dec!(0.0005), dec!(0.0005)))
        );

        bot.handle(reply_to("777", &message_id)).await;
        assert_eq!(
            stack.messenger.last_text().as_deref(),
            Some(templates::ALREADY_RESPONDED)
        );
    }

    #[tokio::test]
    async fn test_plain_text_and_unlinked_replies_ignored() {
        let stack = TestStack::new();
        let bot = dispatcher(&stack);

        bot.handle(text("999", "hello")).await;
        bot.handle(reply_to("999", "1")).await;
        bot.handle(InboundMessage {
            reply_to: Some(ReplyRef {
                message_id: "1".to_string(),
                from_bot: false,
            }),
            ..text("999", "Done")
        })
        .await;

        assert!(stack.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_outcomes() {
        let stack = TestStack::new();
        let bot = dispatcher(&stack);
        let account = stack.linked_account("alice", "777").await;

        bot.handle(text("777", &format!("/withdraw {}", DESTINATION))).await;
        assert_eq!(stack.messenger.last_text().as_deref(), Some(templates::NO_PROFIT));

        stack.accrue(&account, 500);
        let message_id = remind(&stack, "777", dec!(0.0005)).await;
        bot.handle(reply_to("777", &message_id)).await;

        bot.handle(text("777", "/withdraw 0x1234")).await;
        assert_eq!(
            stack.messenger.last_text().as_deref(),
            Some(templates::INVALID_ADDRESS)
        );

        bot.handle(text("777", &format!("/withdraw {}", DESTINATION))).await;
        let success = stack.messenger.last_text().unwrap();
        assert!(success.contains("0.0005 USDC"));
        assert!(success.contains("https://scrollscan.com/tx/0x"));

        bot.handle(text("777", &format!("/withdraw {}", DESTINATION))).await;
        assert_eq!(
            stack.messenger.last_text(),
            Some(templates::withdrawal_too_soon(24))
        );
    }

    #[tokio::test]
    async fn test_withdraw_from_unlinked_channel() {
        let stack = TestStack::new();
        let bot = dispatcher(&stack);

        bot.handle(text("404", &format!("/withdraw {}", DESTINATION))).await;
        assert_eq!(stack.messenger.last_text().as_deref(), Some(templates::ERROR));
    }

    #[tokio::test]
    async fn test_send_failure_is_swallowed() {
        let stack = TestStack::new();
        let messenger = Arc::new(RecordingMessenger::new());
        messenger.fail_sends(true);
        let bot = BotDispatcher::new(
            stack.ledger.clone(),
            stack.accounts.clone(),
            messenger.clone(),
            String::new(),
            24,
        );

        bot.handle(text("1", "/start")).await;
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn test_drain_waits_for_pending_withdrawal() {
        let stack = TestStack::new();
        let bot = Arc::new(dispatcher(&stack));
        let account = stack.linked_account("alice", "777").await;
        stack.accrue(&account, 500);
        let message_id = remind(&stack, "777", dec!(0.0005)).await;
        stack.ledger.handle_reply("777", &message_id, Utc::now()).await.unwrap();

        stack.chain.hold_receipts(true);
        let mut handlers = HandlerSet::new(bot);
        handlers.dispatch(text("777", &format!("/withdraw {}", DESTINATION)));
        assert_eq!(handlers.in_flight(), 1);

        let drained = tokio::spawn(handlers.drain());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!drained.is_finished());

        stack.chain.hold_receipts(false);
        tokio::time::timeout(Duration::from_secs(1), drained)
            .await
            .unwrap()
            .unwrap();

        let after = stack.accounts.get_account(account.id).await.unwrap();
        assert_eq!(after.profit_committed, rust_decimal::Decimal::ZERO);
        assert!(after.last_withdrawal_at.is_some());
        assert!(stack.messenger.last_text().unwrap().contains("0.0005 USDC"));
    }

    #[tokio::test]
    async fn test_finished_handlers_are_reaped() {
        let stack = TestStack::new();
        let mut handlers = HandlerSet::new(Arc::new(dispatcher(&stack)));

        handlers.dispatch(text("1", "/start"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        handlers.dispatch(text("2", "/start"));
        assert_eq!(handlers.in_flight(), 1);

        handlers.drain().await;
        assert_eq!(stack.messenger.sent().len(), 2);
    }
}
