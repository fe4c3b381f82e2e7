mod accounting;
mod budget;
mod config;
mod error;
mod models;
mod pipeline;
mod retry;
mod router;
mod routes;
mod secrets;
mod state;
mod stream;
mod upstream;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use accounting::AccountingManager;
use budget::RedisBudgetManager;
use config::Config;
use pipeline::Pipeline;
use secrets::VaultSecretStore;
use state::AppState;

const ACCOUNTING_WORKER_COUNT: usize = 4;
const ACCOUNTING_QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!("starting AI egress gateway on {}", config.listen_addr);

    let redis_client = redis::Client::open(config.redis_url.as_str())?;
    let redis = redis_client.get_connection_manager().await?;
    tracing::info!("connected to Redis");

    let secret_store = VaultSecretStore::authenticate(
        &config.vault_addr,
        &config.vault_role_id,
        &config.vault_secret_id,
    )
    .await?;
    tracing::info!("authenticated to the secret store");

    let budget: Arc<dyn budget::BudgetManager> = Arc::new(RedisBudgetManager::new(redis));
    let accounting =
        AccountingManager::spawn(budget.clone(), ACCOUNTING_WORKER_COUNT, ACCOUNTING_QUEUE_CAPACITY);

    let pipeline = Arc::new(Pipeline::new(
        config.gateway_bearer_token.clone(),
        budget,
        Arc::new(secret_store),
        accounting,
        reqwest::Client::new(),
        config.retry_max_attempts,
        router::BaseUrlOverrides::default(),
    ));

    let state = Arc::new(AppState { pipeline });

    let app = Router::new()
        .merge(routes::health::router())
        .nest("/v1", routes::proxy::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("listening on {}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install signal handler");
        term.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("signal received, starting graceful shutdown");
}
