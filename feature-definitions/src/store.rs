use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::environments::{
    environment_models::{Organization, SdkConnection},
    project_filter::AllowedProjects,
};
use crate::features::feature_models::Feature;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("failed to read seed data: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse seed data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read/write access to feature documents and the organization settings around them.
/// Feature documents are owned by the store; callers get snapshots.
#[async_trait]
pub trait FeatureStore {
    async fn get_organization(&self, id: &str) -> Result<Organization, StoreError>;

    async fn get_sdk_connection(&self, key: &str) -> Result<SdkConnection, StoreError>;

    /// All features of an organization that the allowed project set admits.
    async fn get_features(
        &self,
        organization: &str,
        projects: &AllowedProjects,
    ) -> Result<Vec<Feature>, StoreError>;

    async fn get_feature(&self, organization: &str, id: &str) -> Result<Feature, StoreError>;

    /// Fails with `AlreadyExists` when the id is taken within the organization.
    async fn insert_feature(&self, feature: Feature) -> Result<(), StoreError>;

    /// Replaces an existing feature. Fails with `NotFound` when there is nothing to replace.
    async fn save_feature(&self, feature: Feature) -> Result<(), StoreError>;
}

/// Seed file layout for the in-memory store.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedData {
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub sdk_connections: Vec<SdkConnection>,
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Default)]
struct StoreData {
    organizations: HashMap<String, Organization>,
    connections: HashMap<String, SdkConnection>,
    // keyed by (organization, feature id)
    features: BTreeMap<(String, String), Feature>,
}

#[derive(Default)]
pub struct InMemoryFeatureStore {
    data: RwLock<StoreData>,
}

impl InMemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: SeedData) -> Self {
        let data = StoreData {
            organizations: seed
                .organizations
                .into_iter()
                .map(|org| (org.id.clone(), org))
                .collect(),
            connections: seed
                .sdk_connections
                .into_iter()
                .map(|conn| (conn.key.clone(), conn))
                .collect(),
            features: seed
                .features
                .into_iter()
                .map(|f| ((f.organization.clone(), f.id.clone()), f))
                .collect(),
        };
        Self {
            data: RwLock::new(data),
        }
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let seed: SeedData = serde_json::from_str(&raw)?;
        Ok(Self::from_seed(seed))
    }

    pub async fn upsert_organization(&self, organization: Organization) {
        let mut data = self.data.write().await;
        data.organizations
            .insert(organization.id.clone(), organization);
    }

    pub async fn upsert_sdk_connection(&self, connection: SdkConnection) {
        let mut data = self.data.write().await;
        data.connections.insert(connection.key.clone(), connection);
    }
}

#[async_trait]
impl FeatureStore for InMemoryFeatureStore {
    async fn get_organization(&self, id: &str) -> Result<Organization, StoreError> {
        let data = self.data.read().await;
        data.organizations.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_sdk_connection(&self, key: &str) -> Result<SdkConnection, StoreError> {
        let data = self.data.read().await;
        data.connections.get(key).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_features(
        &self,
        organization: &str,
        projects: &AllowedProjects,
    ) -> Result<Vec<Feature>, StoreError> {
        if projects.is_empty() {
            return Ok(vec![]);
        }
        let data = self.data.read().await;
        Ok(data
            .features
            .values()
            .filter(|f| f.organization == organization)
            .filter(|f| projects.admits(f.project.as_deref()))
            .cloned()
            .collect())
    }

    async fn get_feature(&self, organization: &str, id: &str) -> Result<Feature, StoreError> {
        let data = self.data.read().await;
        data.features
            .get(&(organization.to_string(), id.to_string()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn insert_feature(&self, feature: Feature) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        let key = (feature.organization.clone(), feature.id.clone());
        if data.features.contains_key(&key) {
            return Err(StoreError::AlreadyExists(feature.id));
        }
        data.features.insert(key, feature);
        Ok(())
    }

    async fn save_feature(&self, feature: Feature) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        let key = (feature.organization.clone(), feature.id.clone());
        match data.features.get_mut(&key) {
            Some(existing) => {
                *existing = feature;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }
}
