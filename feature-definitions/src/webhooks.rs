use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::features::feature_models::Feature;
use crate::metrics::consts::WEBHOOKS_QUEUED_COUNTER;
use crate::metrics::utils::inc;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook endpoint returned {0}")]
    Status(u16),
}

/// Notification that the SDK payloads for some environments/projects are stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadInvalidation {
    pub organization: String,
    pub environments: Vec<String>,
    /// Old and new project. `None` is the organization-wide (unassigned) scope.
    pub projects: Vec<Option<String>>,
}

impl PayloadInvalidation {
    /// Works out which payloads a feature change affects. Returns `None` when
    /// neither the enabled environments nor the project moved.
    pub fn between(
        organization: &str,
        previous_environments: &[String],
        previous_project: Option<&str>,
        current: &Feature,
    ) -> Option<Self> {
        let previous: BTreeSet<&String> = previous_environments.iter().collect();
        let current_environments = current.enabled_environments();
        let now: BTreeSet<&String> = current_environments.iter().collect();
        let project_changed = previous_project != current.project.as_deref();

        if previous == now && !project_changed {
            return None;
        }

        let environments = previous.union(&now).map(|env| env.to_string()).collect();
        let mut projects = vec![previous_project.map(str::to_string)];
        if project_changed {
            projects.push(current.project.clone());
        }

        Some(Self {
            organization: organization.to_string(),
            environments,
            projects,
        })
    }
}

#[async_trait]
pub trait WebhookDispatcher {
    async fn dispatch(&self, invalidation: PayloadInvalidation) -> Result<(), WebhookError>;
}

/// Fires a dispatch without waiting for it. Payload compilation never depends on the result.
pub fn queue_webhook(
    dispatcher: Arc<dyn WebhookDispatcher + Send + Sync>,
    invalidation: PayloadInvalidation,
) {
    inc(
        WEBHOOKS_QUEUED_COUNTER,
        &[("organization".to_string(), invalidation.organization.clone())],
        1,
    );
    tokio::spawn(async move {
        let organization = invalidation.organization.clone();
        if let Err(e) = dispatcher.dispatch(invalidation).await {
            tracing::warn!(organization = %organization, error = %e, "failed to dispatch webhook");
        }
    });
}

pub struct HttpWebhookDispatcher {
    client: reqwest::Client,
    url: String,
}

impl HttpWebhookDispatcher {
    pub fn new(url: String, timeout: Duration) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl WebhookDispatcher for HttpWebhookDispatcher {
    async fn dispatch(&self, invalidation: PayloadInvalidation) -> Result<(), WebhookError> {
        let response = self.client.post(&self.url).json(&invalidation).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::Status(response.status().as_u16()));
        }
        tracing::debug!(
            organization = %invalidation.organization,
            environments = ?invalidation.environments,
            "webhook dispatched"
        );
        Ok(())
    }
}

/// Used when no webhook endpoint is configured.
pub struct LoggingWebhookDispatcher;

#[async_trait]
impl WebhookDispatcher for LoggingWebhookDispatcher {
    async fn dispatch(&self, invalidation: PayloadInvalidation) -> Result<(), WebhookError> {
        tracing::info!(
            organization = %invalidation.organization,
            environments = ?invalidation.environments,
            projects = ?invalidation.projects,
            "sdk payload invalidated"
        );
        Ok(())
    }
}
