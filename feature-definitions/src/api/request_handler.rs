use axum::http::{header::AUTHORIZATION, HeaderMap};
use tracing::instrument;

use crate::{
    api::{errors::FlagError, types::SdkPayloadResponse},
    encryption::PayloadEncryptor,
    environments::project_filter::filter_projects,
    features::feature_definitions::{assemble, last_updated},
    metrics::{
        consts::{
            FEATURES_COMPILED_COUNTER, FEATURES_SKIPPED_COUNTER, PAYLOAD_COMPILE_TIME,
            PAYLOAD_ENCRYPTED_COUNTER, PAYLOAD_REQUESTS_COUNTER,
        },
        utils::{inc, timing_guard},
    },
    router,
    store::StoreError,
};

#[derive(Debug, Default, Clone)]
pub struct PayloadRequest {
    pub api_key: Option<String>,
    pub project: Option<String>,
}

impl PayloadRequest {
    /// Takes the key from the path or query string, falling back to an
    /// `Authorization: Bearer` header.
    pub fn new(api_key: Option<String>, project: Option<String>, headers: &HeaderMap) -> Self {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .or_else(|| bearer_token(headers));
        Self {
            api_key,
            project: project.filter(|p| !p.is_empty()),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Resolves the SDK connection behind an API key and compiles its payload.
///
/// The environment comes from the connection (or the configured default), and
/// the project scope from the connection's projects, or the `project` query
/// parameter when it has none, narrowed by what the environment allows.
#[instrument(skip_all)]
pub async fn process_payload_request(
    state: &router::State,
    request: PayloadRequest,
) -> Result<SdkPayloadResponse, FlagError> {
    let api_key = request.api_key.ok_or(FlagError::MissingApiKey)?;

    let connection = state
        .store
        .get_sdk_connection(api_key.trim())
        .await
        .map_err(|e| match e {
            StoreError::NotFound => FlagError::InvalidApiKey,
            other => other.into(),
        })?;

    let organization = state
        .store
        .get_organization(&connection.organization)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => {
                tracing::warn!(
                    organization = %connection.organization,
                    "sdk connection points at a missing organization"
                );
                FlagError::InvalidApiKey
            }
            other => other.into(),
        })?;

    let environment_id = state
        .config
        .resolve_environment(connection.environment.as_deref());
    let environment = organization
        .environment(environment_id)
        .ok_or_else(|| FlagError::UnknownEnvironment(environment_id.to_string()))?;

    let requested: Vec<String> = if connection.projects.is_empty() {
        request.project.into_iter().collect()
    } else {
        connection.projects.clone()
    };
    let allowed = filter_projects(
        &requested,
        environment,
        *state.config.strict_environment_projects,
    );

    let labels = [
        ("organization".to_string(), organization.id.clone()),
        ("environment".to_string(), environment_id.to_string()),
    ];
    inc(PAYLOAD_REQUESTS_COUNTER, &labels, 1);

    let features = state.store.get_features(&organization.id, &allowed).await?;

    let (definitions, date_updated) = {
        let _timer = timing_guard(PAYLOAD_COMPILE_TIME, &labels);
        let definitions = assemble(&features, environment_id);
        let date_updated = last_updated(&features, &definitions);
        (definitions, date_updated)
    };

    inc(FEATURES_COMPILED_COUNTER, &labels, definitions.len() as u64);
    inc(
        FEATURES_SKIPPED_COUNTER,
        &labels,
        (features.len() - definitions.len()) as u64,
    );

    if !connection.encrypt_payload {
        return Ok(SdkPayloadResponse {
            status: 200,
            features: definitions,
            date_updated,
            encrypted_features: None,
        });
    }

    let key = connection
        .encryption_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or(FlagError::MissingEncryptionKey)?;
    let encryptor = PayloadEncryptor::from_base64_key(key)?;
    let plaintext =
        serde_json::to_string(&definitions).map_err(|e| FlagError::Internal(e.to_string()))?;
    let encrypted = encryptor.encrypt(&plaintext)?;
    inc(PAYLOAD_ENCRYPTED_COUNTER, &labels, 1);

    Ok(SdkPayloadResponse {
        status: 200,
        features: Default::default(),
        date_updated,
        encrypted_features: Some(encrypted),
    })
}
