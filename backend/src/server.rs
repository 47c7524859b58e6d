use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    api::handler::{
        create_account, get_account, get_yield, health_check, liquidate_account, reset_account,
        AppState,
    },
    middleware::require_admin_key,
};

/// Liquidation waits on chain confirmations, so the ceiling is generous
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

pub fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let admin = Router::new()
        .route("/accounts", post(create_account))
        .route("/accounts/:id", get(get_account))
        .route("/accounts/:id/yield", get(get_yield))
        .route("/accounts/:id/liquidate", post(liquidate_account))
        .route("/accounts/:id/reset", post(reset_account))
        .route_layer(from_fn_with_state(state.clone(), require_admin_key));

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(admin)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

/// Serve until `stop` flips, then drain in-flight requests
pub async fn run_server(
    app: Router,
    bind_address: &str,
    mut stop: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*stop.borrow() {
                if stop.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    info!("Server stopped");
    Ok(())
}
