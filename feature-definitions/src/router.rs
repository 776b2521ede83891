use std::{future::ready, sync::Arc};

use axum::{
    http::{Method, StatusCode},
    routing::{get, post, put},
    Router,
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    api::endpoint,
    config::Config,
    metrics::utils::{setup_metrics_recorder, track_metrics},
    store::{FeatureStore, StoreError},
    webhooks::WebhookDispatcher,
};

#[derive(Clone)]
pub struct State {
    pub store: Arc<dyn FeatureStore + Send + Sync>,
    pub webhooks: Arc<dyn WebhookDispatcher + Send + Sync>,
    pub config: Config,
}

pub fn router(
    store: Arc<dyn FeatureStore + Send + Sync>,
    webhooks: Arc<dyn WebhookDispatcher + Send + Sync>,
    config: Config,
) -> Router {
    let state = State {
        store: store.clone(),
        webhooks,
        config: config.clone(),
    };

    // SDKs fetch payloads straight from browsers, so CORS stays permissive
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
            Method::HEAD,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .allow_origin(AllowOrigin::mirror_request());

    // liveness/readiness checks
    let status_router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(move || readiness(store.clone())))
        .route("/_liveness", get(|| ready("ok")));

    let payload_router = Router::new()
        .route("/api/features", get(endpoint::features))
        .route("/api/features/", get(endpoint::features))
        .route("/api/features/:key", get(endpoint::features_by_key))
        .layer(ConcurrencyLimitLayer::new(config.max_concurrency));

    let admin_router = Router::new()
        .route("/api/v1/features", post(endpoint::create_feature))
        .route("/api/v1/features/:id", put(endpoint::update_feature))
        .route(
            "/api/v1/features/:id/publish",
            post(endpoint::publish_feature),
        );

    let router = Router::new()
        .merge(status_router)
        .merge(payload_router)
        .merge(admin_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Global metrics recorders can play poorly with e.g. tests
    if !config.enable_metrics {
        return router;
    }
    match setup_metrics_recorder() {
        Ok(recorder_handle) => {
            router.route("/metrics", get(move || ready(recorder_handle.render())))
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to install metrics recorder");
            router
        }
    }
}

pub async fn index() -> &'static str {
    "feature definitions service"
}

pub async fn readiness(
    store: Arc<dyn FeatureStore + Send + Sync>,
) -> Result<&'static str, (StatusCode, String)> {
    // a lookup that finds nothing still proves the store answers
    match store.get_organization("").await {
        Ok(_) | Err(StoreError::NotFound) => Ok("ready"),
        Err(e) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            format!("store unavailable: {e}"),
        )),
    }
}
