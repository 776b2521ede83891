use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::feature_models::FeatureDefinitions;

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PayloadQueryParams {
    pub api_key: Option<String>,
    /// Only consulted when the SDK connection declares no projects itself
    pub project: Option<String>,
}

/// What SDKs fetch. When the connection encrypts its payload, `features` is
/// empty and the definitions travel in `encryptedFeatures` instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkPayloadResponse {
    pub status: u16,
    pub features: FeatureDefinitions,
    pub date_updated: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_features: Option<String>,
}
