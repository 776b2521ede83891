use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::router;
use crate::store::{FeatureStore, InMemoryFeatureStore, StoreError};
use crate::webhooks::{HttpWebhookDispatcher, LoggingWebhookDispatcher, WebhookDispatcher};

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = match load_store(&config).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(
                "Failed to load seed data from {}: {}",
                config.seed_data_path,
                e
            );
            return;
        }
    };

    serve_with_store(config, store, listener, shutdown).await
}

/// Serves on top of an already populated store.
pub async fn serve_with_store<F>(
    config: Config,
    store: Arc<dyn FeatureStore + Send + Sync>,
    listener: TcpListener,
    shutdown: F,
) where
    F: Future<Output = ()> + Send + 'static,
{
    let webhooks: Arc<dyn WebhookDispatcher + Send + Sync> = if config.webhook_url.is_empty() {
        Arc::new(LoggingWebhookDispatcher)
    } else {
        match HttpWebhookDispatcher::new(config.webhook_url.clone(), config.webhook_timeout()) {
            Ok(dispatcher) => Arc::new(dispatcher),
            Err(e) => {
                tracing::error!("Failed to create webhook client: {}", e);
                return;
            }
        }
    };

    let app = router::router(store, webhooks, config);

    match listener.local_addr() {
        Ok(addr) => tracing::info!("listening on {:?}", addr),
        Err(e) => tracing::warn!("could not read listener address: {}", e),
    }

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    {
        tracing::error!("server error: {}", e);
    }
}

async fn load_store(config: &Config) -> Result<InMemoryFeatureStore, StoreError> {
    if config.seed_data_path.is_empty() {
        tracing::info!("no seed data configured, starting with an empty store");
        return Ok(InMemoryFeatureStore::new());
    }
    let store = InMemoryFeatureStore::from_file(&config.seed_data_path).await?;
    tracing::info!(path = %config.seed_data_path, "loaded seed data");
    Ok(store)
}
