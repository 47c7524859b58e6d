mod api;
mod bootstrap;
mod config;
mod error;
mod execution;
mod ledger;
mod messaging;
mod middleware;
mod reminder;
mod server;
mod wallet;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::messaging::telegram::run_update_poller;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,yieldkeeper=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting yield wallet service");

    let config = Config::from_env()?;
    let app = bootstrap::initialize_application(&config).await?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);

    let scheduler = app.scheduler.clone();
    let scheduler_stop = stop_rx.clone();
    let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_stop).await });

    let poller_task = tokio::spawn(run_update_poller(
        app.telegram.clone(),
        app.bot.clone(),
        stop_rx.clone(),
    ));

    let signal_tx = stop_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("🛑 Shutdown requested");
                let _ = signal_tx.send(true);
            }
            Err(e) => error!("❌ Failed to listen for Ctrl-C: {}", e),
        }
    });

    // Create HTTP server
    let router = server::create_app(app.state);
    let served = server::run_server(router, &config.bind_address, stop_rx).await;
    if let Err(e) = &served {
        error!("❌ HTTP server failed: {}", e);
        let _ = stop_tx.send(true);
    }

    // An in-flight reminder cycle runs to completion, confirmations included
    for (name, task) in [("scheduler", scheduler_task), ("update poller", poller_task)] {
        if let Err(e) = task.await {
            error!("❌ {} task ended abnormally: {}", name, e);
        }
    }

    served?;
    info!("👋 Shutdown complete");
    Ok(())
}
