//! Protecphone Orders - order lifecycle and carrier sync service

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use protecphone_orders::api::{router, AppState};
use protecphone_orders::carrier::YalidineClient;
use protecphone_orders::catalog::Catalog;
use protecphone_orders::config::Config;
use protecphone_orders::service::OrderService;
use protecphone_orders::store::init_store;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let config = Config::from_env()?;
    let store = init_store(config.database_url.as_deref()).await?;

    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path)?,
        None => Catalog::with_default_prices(),
    };
    tracing::info!(products = catalog.len(), "catalog loaded");

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, order events will not be published");
                None
            }
        },
        None => None,
    };

    let mut service = OrderService::new(store, catalog).with_nats(nats);
    match config.carrier.clone() {
        Some(credentials) => {
            let client = YalidineClient::new(&config.carrier_base_url, credentials, config.carrier_timeout).context("carrier client")?;
            service = service.with_carrier(Arc::new(client));
        }
        None => tracing::warn!("YALIDINE_API_ID / YALIDINE_API_TOKEN missing: carrier operations are disabled"),
    }

    let app = router(AppState::new(Arc::new(service)));

    tracing::info!("🚀 Protecphone Orders listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
