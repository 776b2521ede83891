use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use feature_definitions::config::{Config, DEFAULT_TEST_CONFIG};
use feature_definitions::server::serve_with_store;
use feature_definitions::store::InMemoryFeatureStore;

pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl ServerHandle {
    pub async fn for_store(store: InMemoryFeatureStore) -> ServerHandle {
        Self::for_config(DEFAULT_TEST_CONFIG.clone(), store).await
    }

    pub async fn for_config(config: Config, store: InMemoryFeatureStore) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        tokio::spawn(async move {
            serve_with_store(config, Arc::new(store), listener, async move {
                notify.notified().await
            })
            .await
        });
        ServerHandle { addr, shutdown }
    }

    pub async fn get_payload(&self, api_key: &str) -> reqwest::Response {
        reqwest::Client::new()
            .get(format!("http://{:?}/api/features/{}", self.addr, api_key))
            .send()
            .await
            .expect("failed to send request")
    }

    pub async fn get(&self, path_and_query: &str) -> reqwest::Response {
        reqwest::Client::new()
            .get(format!("http://{:?}{}", self.addr, path_and_query))
            .send()
            .await
            .expect("failed to send request")
    }

    pub async fn send_admin_request(
        &self,
        method: reqwest::Method,
        path: &str,
        organization: &str,
        body: Value,
    ) -> reqwest::Response {
        reqwest::Client::new()
            .request(method, format!("http://{:?}{}", self.addr, path))
            .header(CONTENT_TYPE, "application/json")
            .header("X-Organization", organization)
            .body(body.to_string())
            .send()
            .await
            .expect("failed to send request")
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}
