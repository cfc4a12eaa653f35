use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use ticket_ledger::config::Config;
use ticket_ledger::gateway::{CheckoutService, MockPaymentGateway};
use ticket_ledger::ledger::Ledger;
use ticket_ledger::routes::create_routes;
use ticket_ledger::state::AppState;
use ticket_ledger::store::{LedgerStore, PgStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Successfully connected to database");

    sqlx::migrate!().run(&pool).await?;

    tracing::info!("Migrations run successfully");

    let store: Arc<dyn LedgerStore> = Arc::new(PgStore::new(pool));
    let ledger = Ledger::new(Arc::clone(&store), config.capacity_policy);
    let checkout = CheckoutService::new(store, MockPaymentGateway::shared(), &config.currency);
    tracing::info!(
        capacity_policy = ?config.capacity_policy,
        currency = %config.currency,
        "Ledger ready"
    );

    let app = create_routes(AppState { ledger, checkout });

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("🚀 Server running at http://{}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
