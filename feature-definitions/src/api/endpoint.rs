use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    api::{
        errors::FlagError,
        request_handler::{process_payload_request, PayloadRequest},
        types::{PayloadQueryParams, SdkPayloadResponse},
    },
    features::{
        feature_models::{Feature, NewFeature},
        feature_service::{FeatureService, PublishRequest},
    },
    metrics::{consts::PAYLOAD_ERRORS_COUNTER, utils::inc},
    router,
};

/// Header naming the organization an admin request acts on
pub const ORGANIZATION_HEADER: &str = "x-organization";

/// `GET /api/features/:key`
pub async fn features_by_key(
    state: State<router::State>,
    Path(key): Path<String>,
    Query(params): Query<PayloadQueryParams>,
    headers: HeaderMap,
) -> Result<Json<SdkPayloadResponse>, FlagError> {
    let request = PayloadRequest::new(Some(key), params.project, &headers);
    payload(&state, request).await
}

/// `GET /api/features?api_key=...`, or with an `Authorization: Bearer` header
pub async fn features(
    state: State<router::State>,
    Query(params): Query<PayloadQueryParams>,
    headers: HeaderMap,
) -> Result<Json<SdkPayloadResponse>, FlagError> {
    let request = PayloadRequest::new(params.api_key, params.project, &headers);
    payload(&state, request).await
}

#[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
async fn payload(
    state: &router::State,
    request: PayloadRequest,
) -> Result<Json<SdkPayloadResponse>, FlagError> {
    match process_payload_request(state, request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            inc(
                PAYLOAD_ERRORS_COUNTER,
                &[("error".to_string(), e.error_code().to_string())],
                1,
            );
            Err(e)
        }
    }
}

fn organization_id(headers: &HeaderMap) -> Result<String, FlagError> {
    headers
        .get(ORGANIZATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(FlagError::MissingOrganization)
}

fn service(state: &router::State) -> FeatureService {
    FeatureService::new(state.store.clone(), state.webhooks.clone())
}

/// `POST /api/v1/features`
pub async fn create_feature(
    state: State<router::State>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Feature>), FlagError> {
    let organization = organization_id(&headers)?;
    let new_feature: NewFeature = serde_json::from_slice(&body)?;
    let feature = service(&state)
        .create_feature(&organization, new_feature)
        .await?;
    Ok((StatusCode::CREATED, Json(feature)))
}

/// `PUT /api/v1/features/:id`
pub async fn update_feature(
    state: State<router::State>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Feature>, FlagError> {
    let organization = organization_id(&headers)?;
    let update: Value = serde_json::from_slice(&body)?;
    let feature = service(&state)
        .update_feature(&organization, &id, &update)
        .await?;
    Ok(Json(feature))
}

/// `POST /api/v1/features/:id/publish`
pub async fn publish_feature(
    state: State<router::State>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Feature>, FlagError> {
    let organization = organization_id(&headers)?;
    let request: PublishRequest = serde_json::from_slice(&body)?;
    let feature = service(&state).publish(&organization, &id, request).await?;
    Ok(Json(feature))
}
