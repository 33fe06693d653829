use finance_manager_core::{
    api::{start_server, ApiState},
    config::AppConfig,
    store,
    tools::create_default_registry,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = AppConfig::from_env()?;

    info!("Finance Manager - API Server");
    info!(port = config.port, default_user_id = %config.default_user_id, "Configuration loaded");

    let store = store::open(&config.store).await?;
    let registry = Arc::new(create_default_registry(store.clone()));

    info!(tools = registry.list().len(), "Tool registry initialized");

    let state = ApiState {
        registry,
        store: store.clone(),
        default_user_id: config.default_user_id,
    };

    let served = start_server(state, config.port).await;
    store.close().await;
    served?;

    Ok(())
}
