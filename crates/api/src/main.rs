//! ThemeLoft API server entry point

use themeloft_api::{routes, AppState, BillingServices, Config};
use themeloft_billing::StripeConfig;
use themeloft_shared::db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "themeloft_api=debug,themeloft_billing=debug,info".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Migrations run on the direct connection when one is configured
    // (PgBouncer pools cannot hold the advisory lock reliably)
    let migration_url = config
        .database_direct_url
        .as_deref()
        .unwrap_or(&config.database_url);
    let migration_pool = db::create_migration_pool(migration_url).await?;
    db::run_migrations(&migration_pool).await?;
    migration_pool.close().await;
    tracing::info!("Database migrations applied");

    let pool = db::create_pool(&config.database_url).await?;

    let billing = if config.enable_billing && !config.stripe_secret_key.is_empty() {
        match StripeConfig::from_env() {
            Ok(stripe_config) => {
                tracing::info!("Billing enabled");
                Some(BillingServices::new(
                    pool.clone(),
                    stripe_config,
                    &config.license_key_prefix,
                ))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Billing configuration incomplete, running without billing");
                None
            }
        }
    } else {
        tracing::info!("Billing disabled");
        None
    };

    let bind_address = config.bind_address.clone();
    let state = AppState::new(pool, config, billing);
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "ThemeLoft API listening");
    axum::serve(listener, app).await?;

    Ok(())
}
