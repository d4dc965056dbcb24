use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use onramp_core::adapters::{PostgresTransactionRepository, PostgresWebhookRepository};
use onramp_core::cli::{self, Cli, Commands, DbCommands, TxCommands};
use onramp_core::config::{Config, DatabaseConfig, LogFormat};
use onramp_core::gateway::DarajaClient;
use onramp_core::health::{DependencyChecker, ExchangeRateChecker, PostgresChecker};
use onramp_core::ports::{TransactionRepository, WebhookRepository};
use onramp_core::pricing::PriceResolver;
use onramp_core::services::{
    run_settlement_listener, settlement_channel, OnrampOrchestrator, WebhookReconciler,
};
use onramp_core::{create_app, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(LogFormat::from_env()?);

    // Database-only commands must work without gateway credentials.
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(Config::from_env()?).await,
        Commands::Config => cli::handle_config_validate(&Config::from_env()?).await,
        Commands::Db(DbCommands::Migrate) => {
            cli::handle_db_migrate(&DatabaseConfig::from_env()?).await
        }
        Commands::Tx(TxCommands::Show { checkout_reference }) => {
            let pool = db::create_pool(&DatabaseConfig::from_env()?).await?;
            cli::handle_tx_show(&pool, &checkout_reference).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let transactions: Arc<dyn TransactionRepository> =
        Arc::new(PostgresTransactionRepository::new(pool.clone()));
    let webhooks: Arc<dyn WebhookRepository> =
        Arc::new(PostgresWebhookRepository::new(pool.clone()));

    let gateway = Arc::new(DarajaClient::new(config.gateway.clone())?);
    tracing::info!(push_url = %config.gateway.push_url, "Daraja client initialized");

    let resolver = PriceResolver::new(&config.pricing)?;
    match &config.pricing.quote_url {
        Some(url) => tracing::info!(quote_url = %url, "Live exchange rate enabled"),
        None => tracing::info!(
            default_rate = %config.pricing.default_rate,
            "EXCHANGE_RATE_URL not set, using default exchange rate"
        ),
    }

    let settlements = settlement_channel();
    tokio::spawn(run_settlement_listener(settlements.subscribe()));

    let onramp = OnrampOrchestrator::new(
        transactions.clone(),
        gateway,
        Arc::new(resolver.clone()),
        config.gateway.callback_url.clone(),
    );
    let reconciler = WebhookReconciler::new(transactions.clone(), Some(webhooks), settlements);

    let mut dependencies: Vec<Arc<dyn DependencyChecker>> =
        vec![Arc::new(PostgresChecker::new(pool.clone()))];
    if config.pricing.quote_url.is_some() {
        dependencies.push(Arc::new(ExchangeRateChecker::new(resolver)));
    }

    let app = create_app(AppState {
        onramp: Arc::new(onramp),
        reconciler: Arc::new(reconciler),
        transactions,
        dependencies,
        start_time: Instant::now(),
        log_request_body: config.log_request_body,
        request_timeout: config.request_timeout,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
