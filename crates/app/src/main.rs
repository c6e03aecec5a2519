mod api;
mod bulk;
mod envelope;
mod router;
mod sync;
mod telemetry;

#[cfg(test)]
mod testing;

use std::{net::SocketAddr, sync::Arc};

use tracing::info;

use spend_goals_shopify::AdminClient;
use spend_goals_storage::Database;
use spend_goals_util::{load_env_file, AppConfig};

use crate::sync::SyncOrchestrator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;

    let http = reqwest::Client::builder()
        .timeout(config.shopify.timeout)
        .build()?;
    let gateway = AdminClient::for_shop(
        &config.shopify.shop_domain,
        &config.shopify.api_version,
        config.shopify.access_token.clone(),
        http,
    )?;
    info!(
        stage = "app",
        shop = %config.shopify.shop_domain,
        api_version = %config.shopify.api_version,
        "promotion gateway configured"
    );

    let orchestrator = SyncOrchestrator::new(Arc::new(database.goals()), Arc::new(gateway));
    let state = router::AppState::new(metrics, orchestrator, config.bulk_concurrency);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
