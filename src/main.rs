use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use bcma_core::{
    AdministrationStore, BcmaConfig, FileAdministrationStore, InMemoryAdministrationStore,
    SystemClock,
};

/// Main entry point for the BCMA application
///
/// Resolves configuration once from the environment, then serves the REST API.
///
/// # Environment Variables
/// - `BCMA_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `BCMA_STORE_DIR`: Directory for administration logs. Without it logs are kept in memory
///   and lost on exit.
/// - `BCMA_EARLY_MINUTES`, `BCMA_LATE_MINUTES`, `BCMA_DEBOUNCE_MS`, `BCMA_GLUCOSE_CATEGORIES`:
///   verification policy overrides
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, startup or the server itself fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bcma_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(BcmaConfig::from_env_lookup(|key| std::env::var(key).ok())?);
    let rest_addr = std::env::var("BCMA_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let store: Arc<dyn AdministrationStore> = match std::env::var("BCMA_STORE_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let store = FileAdministrationStore::open(dir.trim())?;
            tracing::info!("-- Writing administration logs to {}", store.root().display());
            Arc::new(store)
        }
        _ => {
            tracing::warn!("-- BCMA_STORE_DIR not set; administration logs are kept in memory only");
            Arc::new(InMemoryAdministrationStore::new())
        }
    };

    let state = AppState::new(config, Arc::new(SystemClock), store);
    api_rest::serve(&rest_addr, state).await
}
