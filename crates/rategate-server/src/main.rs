//! Pricing service entry point

mod config;
mod error;
mod facade;
mod routes;
mod upstream;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use rategate::{CacheConfig, CoalescingCache, RedisConfig, RedisStore};

use config::Config;
use facade::PricingFacade;
use upstream::OracleClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let store = Arc::new(RedisStore::connect(RedisConfig::new(&config.redis_url)).await?);
    let cache = CoalescingCache::new(store, CacheConfig::default());
    let oracle = OracleClient::new(&config.rate_api_url, &config.api_token)?;
    let facade = Arc::new(PricingFacade::new(cache, oracle));

    let addr = config.bind_addr();
    tracing::info!(%addr, "pricing service listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, routes::router(facade)).await?;
    Ok(())
}
