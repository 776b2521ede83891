use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use tokio::sync::Notify;

use crate::{
    environments::environment_models::{Environment, Organization, Project, SdkConnection},
    features::feature_models::{Feature, FeatureRule, RuleKind, ValueType},
    webhooks::{PayloadInvalidation, WebhookDispatcher, WebhookError},
};

pub fn random_string(prefix: &str, length: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, suffix)
}

/// A live feature in `org_1` with no environment settings.
pub fn feature(id: &str, value_type: ValueType, default_value: &str) -> Feature {
    let now = Utc::now();
    Feature {
        id: id.to_string(),
        organization: "org_1".to_string(),
        project: None,
        owner: "jane".to_string(),
        description: String::new(),
        value_type,
        default_value: default_value.to_string(),
        archived: false,
        tags: vec![],
        environment_settings: BTreeMap::new(),
        draft: None,
        revision: None,
        date_created: now,
        date_updated: now,
    }
}

pub fn rule(kind: RuleKind) -> FeatureRule {
    FeatureRule {
        id: Some("fr_test".to_string()),
        enabled: true,
        description: None,
        condition: None,
        kind,
    }
}

/// Organization with unrestricted environments and projects `prj_a`, `prj_b`.
pub fn organization(id: &str, environments: &[&str]) -> Organization {
    Organization {
        id: id.to_string(),
        environments: environments
            .iter()
            .map(|env| Environment {
                id: env.to_string(),
                description: String::new(),
                projects: vec![],
            })
            .collect(),
        projects: ["prj_a", "prj_b"]
            .iter()
            .map(|project| Project {
                id: project.to_string(),
                name: project.to_string(),
            })
            .collect(),
    }
}

pub fn sdk_connection(organization: &str, environment: Option<&str>) -> SdkConnection {
    SdkConnection {
        key: random_string("sdk-", 16),
        organization: organization.to_string(),
        environment: environment.map(str::to_string),
        projects: vec![],
        encrypt_payload: false,
        encryption_key: None,
    }
}

/// Keeps every invalidation it receives so tests can wait for background dispatches.
#[derive(Default)]
pub struct RecordingWebhookDispatcher {
    received: Mutex<Vec<PayloadInvalidation>>,
    notify: Notify,
}

impl RecordingWebhookDispatcher {
    pub fn received(&self) -> Vec<PayloadInvalidation> {
        self.received
            .lock()
            .map(|received| received.clone())
            .unwrap_or_default()
    }

    /// Waits until at least `count` invalidations arrived, giving up after a second.
    pub async fn wait_for(&self, count: usize) -> Vec<PayloadInvalidation> {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
        loop {
            let notified = self.notify.notified();
            let received = self.received();
            if received.len() >= count {
                return received;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.received();
            }
        }
    }
}

#[async_trait]
impl WebhookDispatcher for RecordingWebhookDispatcher {
    async fn dispatch(&self, invalidation: PayloadInvalidation) -> Result<(), WebhookError> {
        if let Ok(mut received) = self.received.lock() {
            received.push(invalidation);
        }
        self.notify.notify_waiters();
        Ok(())
    }
}
