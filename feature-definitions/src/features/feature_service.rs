use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::environments::environment_models::Organization;
use crate::features::feature_models::{Feature, NewFeature};
use crate::features::feature_operations::{
    apply_feature_update, build_new_feature, parse_feature_update, publish_draft,
    FeatureOperationError, ValidationError,
};
use crate::metrics::consts::FEATURE_OPERATIONS_COUNTER;
use crate::metrics::utils::inc;
use crate::store::{FeatureStore, StoreError};
use crate::webhooks::{queue_webhook, PayloadInvalidation, WebhookDispatcher};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    /// The draft exactly as the caller reviewed it
    pub draft: Value,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub published_by: Option<String>,
}

/// Feature lifecycle operations on top of the store. Every validation happens
/// before anything is written; webhooks go out after a successful write.
pub struct FeatureService {
    store: Arc<dyn FeatureStore + Send + Sync>,
    webhooks: Arc<dyn WebhookDispatcher + Send + Sync>,
}

impl FeatureService {
    pub fn new(
        store: Arc<dyn FeatureStore + Send + Sync>,
        webhooks: Arc<dyn WebhookDispatcher + Send + Sync>,
    ) -> Self {
        Self { store, webhooks }
    }

    async fn organization(&self, id: &str) -> Result<Organization, FeatureOperationError> {
        self.store.get_organization(id).await.map_err(|e| match e {
            StoreError::NotFound => FeatureOperationError::OrganizationNotFound(id.to_string()),
            other => other.into(),
        })
    }

    async fn feature(
        &self,
        organization: &str,
        id: &str,
    ) -> Result<Feature, FeatureOperationError> {
        let id = id.to_lowercase();
        self.store
            .get_feature(organization, &id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => FeatureOperationError::FeatureNotFound(id.clone()),
                other => other.into(),
            })
    }

    #[instrument(skip_all, fields(organization = %organization_id))]
    pub async fn create_feature(
        &self,
        organization_id: &str,
        new_feature: NewFeature,
    ) -> Result<Feature, FeatureOperationError> {
        let organization = self.organization(organization_id).await?;
        let feature = build_new_feature(&organization, new_feature, Utc::now())?;

        self.store
            .insert_feature(feature.clone())
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists(id) => ValidationError::DuplicateId(id).into(),
                other => FeatureOperationError::from(other),
            })?;

        track_operation("create");
        tracing::info!(feature = %feature.id, "feature created");

        // a new feature only matters to payloads it is already enabled in
        if let Some(invalidation) =
            PayloadInvalidation::between(organization_id, &[], feature.project.as_deref(), &feature)
        {
            queue_webhook(self.webhooks.clone(), invalidation);
        }

        Ok(feature)
    }

    #[instrument(skip_all, fields(organization = %organization_id, feature = %id))]
    pub async fn update_feature(
        &self,
        organization_id: &str,
        id: &str,
        body: &Value,
    ) -> Result<Feature, FeatureOperationError> {
        let update = parse_feature_update(body)?;
        let organization = self.organization(organization_id).await?;
        let mut feature = self.feature(organization_id, id).await?;

        let previous_environments = feature.enabled_environments();
        let previous_project = feature.project.clone();

        apply_feature_update(&organization, &mut feature, update, Utc::now())?;
        self.store.save_feature(feature.clone()).await?;

        track_operation("update");
        self.notify(
            organization_id,
            &previous_environments,
            previous_project.as_deref(),
            &feature,
        );

        Ok(feature)
    }

    #[instrument(skip_all, fields(organization = %organization_id, feature = %id))]
    pub async fn publish(
        &self,
        organization_id: &str,
        id: &str,
        request: PublishRequest,
    ) -> Result<Feature, FeatureOperationError> {
        let organization = self.organization(organization_id).await?;
        let mut feature = self.feature(organization_id, id).await?;

        let previous_environments = feature.enabled_environments();
        let previous_project = feature.project.clone();

        if let Err(e) = publish_draft(
            &organization,
            &mut feature,
            &request.draft,
            request.comment,
            request.published_by,
            Utc::now(),
        ) {
            if matches!(e, FeatureOperationError::DraftConflict) {
                tracing::warn!("draft changed since it was reviewed");
            }
            return Err(e);
        }
        self.store.save_feature(feature.clone()).await?;

        track_operation("publish");
        self.notify(
            organization_id,
            &previous_environments,
            previous_project.as_deref(),
            &feature,
        );

        Ok(feature)
    }

    fn notify(
        &self,
        organization_id: &str,
        previous_environments: &[String],
        previous_project: Option<&str>,
        feature: &Feature,
    ) {
        match PayloadInvalidation::between(
            organization_id,
            previous_environments,
            previous_project,
            feature,
        ) {
            Some(invalidation) => queue_webhook(self.webhooks.clone(), invalidation),
            None => tracing::debug!("no payload affected, skipping webhook"),
        }
    }
}

fn track_operation(operation: &str) {
    inc(
        FEATURE_OPERATIONS_COUNTER,
        &[("operation".to_string(), operation.to_string())],
        1,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environments::environment_models::SdkConnection;
    use crate::features::feature_models::{EnvironmentSettings, ValueType};
    use crate::store::InMemoryFeatureStore;
    use crate::test_utils::{organization, RecordingWebhookDispatcher};
    use serde_json::json;

    async fn setup() -> (
        FeatureService,
        Arc<InMemoryFeatureStore>,
        Arc<RecordingWebhookDispatcher>,
    ) {
        let store = Arc::new(InMemoryFeatureStore::new());
        store
            .upsert_organization(organization("org_1", &["production", "staging"]))
            .await;
        store
            .upsert_sdk_connection(SdkConnection {
                key: "sdk-abc".to_string(),
                organization: "org_1".to_string(),
                environment: None,
                projects: vec![],
                encrypt_payload: false,
                encryption_key: None,
            })
            .await;
        let webhooks = Arc::new(RecordingWebhookDispatcher::default());
        let service = FeatureService::new(store.clone(), webhooks.clone());
        (service, store, webhooks)
    }

    fn request(id: &str) -> NewFeature {
        NewFeature {
            id: id.to_string(),
            owner: "jane".to_string(),
            value_type: Some(ValueType::String),
            default_value: Some("blue".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let (service, store, _) = setup().await;

        let created = service.create_feature("org_1", request("Color")).await.unwrap();
        assert_eq!(created.id, "color");
        assert!(store.get_feature("org_1", "color").await.is_ok());

        let err = service
            .create_feature("org_1", request("COLOR"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FeatureOperationError::Validation(ValidationError::DuplicateId(_))
        ));
    }

    #[tokio::test]
    async fn test_create_enabled_feature_sends_webhook() {
        let (service, _, webhooks) = setup().await;
        let mut new_feature = request("color");
        new_feature.environment_settings.insert(
            "staging".to_string(),
            EnvironmentSettings {
                enabled: true,
                rules: vec![],
            },
        );
        service.create_feature("org_1", new_feature).await.unwrap();

        let received = webhooks.wait_for(1).await;
        assert_eq!(received[0].environments, vec!["staging"]);
    }

    #[tokio::test]
    async fn test_create_in_unknown_organization() {
        let (service, _, _) = setup().await;
        assert!(matches!(
            service.create_feature("org_404", request("a")).await,
            Err(FeatureOperationError::OrganizationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_project_change_sends_webhook() {
        let (service, _, webhooks) = setup().await;
        service.create_feature("org_1", request("color")).await.unwrap();

        let updated = service
            .update_feature("org_1", "color", &json!({"project": "prj_a"}))
            .await
            .unwrap();
        assert_eq!(updated.project.as_deref(), Some("prj_a"));

        let received = webhooks.wait_for(1).await;
        assert_eq!(
            received[0].projects,
            vec![None, Some("prj_a".to_string())]
        );
    }

    #[tokio::test]
    async fn test_update_rejected_before_write() {
        let (service, store, _) = setup().await;
        service.create_feature("org_1", request("color")).await.unwrap();

        let err = service
            .update_feature("org_1", "color", &json!({"defaultValue": "red", "owner": "x"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid update fields: defaultValue");

        let stored = store.get_feature("org_1", "color").await.unwrap();
        assert_eq!(stored.owner, "jane");
    }

    #[tokio::test]
    async fn test_update_missing_feature() {
        let (service, _, _) = setup().await;
        assert!(matches!(
            service
                .update_feature("org_1", "nope", &json!({"owner": "x"}))
                .await,
            Err(FeatureOperationError::FeatureNotFound(_))
        ));
    }
}
