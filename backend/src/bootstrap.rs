use std::{sync::Arc, time::Duration};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{info, warn};
use crate::{
    api::handler::AppState,
    config::Config,
    error::{AppError, AppResult},
    execution::{
        ChainClient, ConfirmationPolicy, ContractAddresses, ScrollClient, TransactionExecutor,
        WalletFunder,
    },
    ledger::{CommitmentLedger, LedgerRepository},
    messaging::{BotDispatcher, TelegramClient},
    reminder::ReminderScheduler,
    wallet::AccountService,
};

/// Everything `main` runs: the HTTP state and the two background loops
pub struct Application {
    pub state: AppState,
    pub scheduler: Arc<ReminderScheduler>,
    pub telegram: Arc<TelegramClient>,
    pub bot: Arc<BotDispatcher>,
}

pub async fn initialize_application(config: &Config) -> AppResult<Application> {
    info!("Initializing application components ...");

    // Database pool
    let pool = initialize_database(&config.database_url).await?;
    let store = Arc::new(LedgerRepository::new(pool));
    let ledger = Arc::new(CommitmentLedger::new(store, config.response_window()));
    info!("✅ Commitment ledger initialized");

    // Chain access
    let chain = Arc::new(ScrollClient::from_config(config)?);
    let contracts = ContractAddresses::from_config(config)?;
    verify_contracts(chain.as_ref(), &contracts).await?;
    info!("✅ Scroll client initialized (treasury {})", chain.treasury_address());

    let policy = ConfirmationPolicy::from_config(config);
    let funder = Arc::new(WalletFunder::new(chain.clone(), policy));
    let executor = Arc::new(TransactionExecutor::new(
        chain,
        funder,
        contracts,
        policy,
        config.token_decimals,
    ));
    info!("✅ Transaction executor initialized");

    let accounts = Arc::new(AccountService::new(
        ledger.clone(),
        executor,
        config.withdrawal_interval(),
    ));

    // Messaging
    let telegram = Arc::new(TelegramClient::new(
        config.telegram_bot_token.clone(),
        config.telegram_messages_per_second,
    )?);
    let bot = Arc::new(BotDispatcher::new(
        ledger.clone(),
        accounts.clone(),
        telegram.clone(),
        config.explorer_tx_url.clone(),
        config.withdrawal_interval_hours as i64,
    ));
    info!("✅ Telegram bot initialized");

    let scheduler = Arc::new(ReminderScheduler::new(
        ledger,
        accounts.clone(),
        telegram.clone(),
        config.reminder_interval(),
        config.death_threshold,
    ));

    let state = AppState {
        accounts,
        admin_key: config.admin_key.as_str().into(),
    };

    Ok(Application {
        state,
        scheduler,
        telegram,
        bot,
    })
}

/// The configured pool token must be the one the pool actually mints for the asset
async fn verify_contracts(chain: &dyn ChainClient, contracts: &ContractAddresses) -> AppResult<()> {
    info!("🔗 Verifying contracts on chain {}", chain.chain_id());

    let pool_token = chain
        .reserve_pool_token(contracts.pool, contracts.token)
        .await?;
    if pool_token != contracts.pool_token {
        return Err(AppError::Config(format!(
            "ATOKEN_ADDRESS {} does not match the pool's reserve token {}",
            contracts.pool_token, pool_token
        )));
    }

    let treasury = chain.treasury_address();
    let native = chain.native_balance(treasury).await?;
    if native.is_zero() {
        warn!("⚠️  Treasury {} holds no native balance, funding will fail", treasury);
    }
    Ok(())
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: 20 max connections");

    // Run migrations
    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
