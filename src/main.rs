use anyhow::{Context, Result};
use isapay_gateway::{
    api::{self, AppState},
    config::Config,
    payments::{PaymentGateway, PaymentService},
    store::{InMemoryTransactionStore, TransactionStore},
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;

    tracing::info!("Starting Isapay Gateway");
    tracing::info!("Environment: {}", config.server.environment);

    let gateway = PaymentGateway::from_config(
        config.gateway.providers.clone(),
        config.gateway.routes.clone(),
        config.gateway.provider_timeout,
    )
    .context("Failed to build payment gateway")?;

    let store = build_store(&config).await?;
    let service = PaymentService::new(Arc::new(gateway), store);

    if !config.auth.is_enabled() {
        tracing::warn!("GATEWAY_API_TOKENS not set: payment endpoints are unauthenticated");
    }

    let app = api::router(AppState::new(service, &config));

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(feature = "cache")]
async fn build_store(config: &Config) -> Result<Arc<dyn TransactionStore>> {
    use isapay_gateway::store::{RedisStoreConfig, RedisTransactionStore};

    let Some(redis) = &config.redis else {
        tracing::warn!("REDIS_URL not set: transactions are kept in memory only");
        return Ok(Arc::new(InMemoryTransactionStore::new()));
    };

    let store_config = RedisStoreConfig {
        redis_url: redis.url.clone(),
        ..RedisStoreConfig::default()
    };
    let store = RedisTransactionStore::connect(&store_config)
        .await
        .context("Failed to connect to Redis")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "cache"))]
async fn build_store(config: &Config) -> Result<Arc<dyn TransactionStore>> {
    if config.redis.is_some() {
        tracing::warn!("REDIS_URL is set but the cache feature is disabled: using memory");
    }
    Ok(Arc::new(InMemoryTransactionStore::new()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
