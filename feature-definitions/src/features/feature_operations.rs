use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::environments::environment_models::Organization;
use crate::features::feature_models::{
    EnvironmentSettings, Feature, FeatureDraft, FeatureRevision, FeatureRule, NewFeature,
    RULE_ID_PREFIX,
};
use crate::store::StoreError;

static FEATURE_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_.:|-]+$").expect("feature key pattern is valid"));

const RULE_ID_SUFFIX_LEN: usize = 12;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Must specify feature key")]
    MissingId,
    #[error("Feature keys can only include letters, numbers, and the characters _ . : | - (got {0:?})")]
    InvalidId(String),
    #[error("This feature key already exists. Feature keys must be unique.")]
    DuplicateId(String),
    #[error("Value type must be one of boolean, number, string or json")]
    InvalidValueType,
    #[error("Must specify a feature owner")]
    MissingOwner,
    #[error("Must specify a default value")]
    MissingDefaultValue,
    #[error("Unknown project: {0}")]
    UnknownProject(String),
    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),
    #[error("Invalid update fields: {}", .0.join(", "))]
    InvalidUpdateFields(Vec<String>),
    #[error("Invalid value for {0}: {1}")]
    InvalidFieldValue(String, String),
    #[error("Update body must be a JSON object")]
    InvalidUpdateBody,
    #[error("There are no changes to publish")]
    NoDraft,
}

#[derive(Error, Debug)]
pub enum FeatureOperationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Could not find feature {0}")]
    FeatureNotFound(String),
    #[error("Could not find organization {0}")]
    OrganizationNotFound(String),
    #[error("New changes have been made to this feature. Please review and try again.")]
    DraftConflict,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Mutable,
    Immutable,
}

/// Every field a stored feature carries, and whether the update operation may change it.
/// Fields missing from this table are rejected just like immutable ones.
pub const FEATURE_UPDATE_SCHEMA: &[(&str, Mutability)] = &[
    ("id", Mutability::Immutable),
    ("organization", Mutability::Immutable),
    ("project", Mutability::Mutable),
    ("owner", Mutability::Mutable),
    ("description", Mutability::Mutable),
    ("valueType", Mutability::Immutable),
    ("defaultValue", Mutability::Immutable),
    ("archived", Mutability::Immutable),
    ("tags", Mutability::Mutable),
    ("environmentSettings", Mutability::Immutable),
    ("draft", Mutability::Immutable),
    ("revision", Mutability::Immutable),
    ("dateCreated", Mutability::Immutable),
    ("dateUpdated", Mutability::Immutable),
];

fn is_mutable(field: &str) -> bool {
    FEATURE_UPDATE_SCHEMA
        .iter()
        .any(|(name, mutability)| *name == field && *mutability == Mutability::Mutable)
}

/// Validated set of changes for an existing feature.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureUpdate {
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
    /// `Some(None)` clears the project
    #[serde(default, deserialize_with = "deserialize_present")]
    pub project: Option<Option<String>>,
    #[serde(default)]
    pub owner: Option<String>,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(Some(value.filter(|p| !p.is_empty())))
}

/// Checks an update body against [`FEATURE_UPDATE_SCHEMA`] in one pass.
/// All offending fields are reported together.
pub fn parse_feature_update(body: &Value) -> Result<FeatureUpdate, ValidationError> {
    let fields: &Map<String, Value> = body.as_object().ok_or(ValidationError::InvalidUpdateBody)?;

    let mut invalid: Vec<String> = fields
        .keys()
        .filter(|field| !is_mutable(field))
        .cloned()
        .collect();
    if !invalid.is_empty() {
        invalid.sort();
        return Err(ValidationError::InvalidUpdateFields(invalid));
    }

    for (field, value) in fields {
        let ok = match field.as_str() {
            "tags" => value
                .as_array()
                .is_some_and(|tags| tags.iter().all(Value::is_string)),
            "project" => value.is_null() || value.is_string(),
            _ => value.is_string(),
        };
        if !ok {
            return Err(ValidationError::InvalidFieldValue(
                field.clone(),
                format!("unexpected {}", json_type(value)),
            ));
        }
    }

    serde_json::from_value(body.clone())
        .map_err(|e| ValidationError::InvalidFieldValue("body".to_string(), e.to_string()))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn validate_feature_key(id: &str) -> Result<String, ValidationError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ValidationError::MissingId);
    }
    if !FEATURE_KEY_PATTERN.is_match(id) {
        return Err(ValidationError::InvalidId(id.to_string()));
    }
    Ok(id.to_lowercase())
}

fn validate_project(
    organization: &Organization,
    project: Option<&str>,
) -> Result<Option<String>, ValidationError> {
    match project.filter(|p| !p.is_empty()) {
        None => Ok(None),
        Some(p) if organization.has_project(p) => Ok(Some(p.to_string())),
        Some(p) => Err(ValidationError::UnknownProject(p.to_string())),
    }
}

fn generate_rule_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(RULE_ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{RULE_ID_PREFIX}{}", suffix.to_lowercase())
}

/// Makes rule ids unique across `rules` and everything already in `taken`.
///
/// The first rule carrying a given id keeps it. Rules without an id, or
/// repeating one that is already taken, get a fresh one.
pub fn assign_rule_ids<'a>(
    rules: impl IntoIterator<Item = &'a mut FeatureRule>,
    taken: &mut HashSet<String>,
) {
    for rule in rules {
        if let Some(id) = rule.id.as_deref().filter(|id| !id.is_empty()) {
            if taken.insert(id.to_string()) {
                continue;
            }
            tracing::debug!(rule_id = %id, "replacing duplicate rule id");
        }
        let id = loop {
            let candidate = generate_rule_id();
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        taken.insert(id.clone());
        rule.id = Some(id);
    }
}

fn validate_environments<'a>(
    organization: &Organization,
    mut environments: impl Iterator<Item = &'a String>,
) -> Result<(), ValidationError> {
    match environments.find(|env| organization.environment(env).is_none()) {
        Some(unknown) => Err(ValidationError::UnknownEnvironment(unknown.clone())),
        None => Ok(()),
    }
}

/// Validates a creation request and turns it into a feature ready to persist.
/// Uniqueness of the id is checked by the caller against the store.
pub fn build_new_feature(
    organization: &Organization,
    new_feature: NewFeature,
    now: DateTime<Utc>,
) -> Result<Feature, ValidationError> {
    let id = validate_feature_key(&new_feature.id)?;

    let value_type = new_feature
        .value_type
        .filter(|t| t.is_known())
        .ok_or(ValidationError::InvalidValueType)?;

    if new_feature.owner.trim().is_empty() {
        return Err(ValidationError::MissingOwner);
    }
    let default_value = new_feature
        .default_value
        .ok_or(ValidationError::MissingDefaultValue)?;

    let project = validate_project(organization, new_feature.project.as_deref())?;

    validate_environments(organization, new_feature.environment_settings.keys())?;

    let mut environment_settings: BTreeMap<String, EnvironmentSettings> = organization
        .environments
        .iter()
        .map(|env| (env.id.clone(), EnvironmentSettings::default()))
        .collect();
    environment_settings.extend(new_feature.environment_settings);

    let mut taken = HashSet::new();
    assign_rule_ids(
        environment_settings.values_mut().flat_map(|s| &mut s.rules),
        &mut taken,
    );

    Ok(Feature {
        id,
        organization: organization.id.clone(),
        project,
        owner: new_feature.owner,
        description: new_feature.description,
        value_type,
        default_value,
        archived: false,
        tags: new_feature.tags,
        environment_settings,
        draft: None,
        revision: Some(FeatureRevision {
            version: 1,
            comment: "New feature".to_string(),
            date: now,
            published_by: None,
        }),
        date_created: now,
        date_updated: now,
    })
}

/// Applies a validated update to a feature. The project must exist in the organization.
pub fn apply_feature_update(
    organization: &Organization,
    feature: &mut Feature,
    update: FeatureUpdate,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if let Some(project) = &update.project {
        feature.project = validate_project(organization, project.as_deref())?;
    }
    if let Some(tags) = update.tags {
        feature.tags = tags;
    }
    if let Some(description) = update.description {
        feature.description = description;
    }
    if let Some(owner) = update.owner {
        feature.owner = owner;
    }
    feature.date_updated = now;
    Ok(())
}

/// Publishes the stored draft, provided it is exactly the one the caller reviewed.
/// Draft rules replace the rules of their environment wholesale.
pub fn publish_draft(
    organization: &Organization,
    feature: &mut Feature,
    reviewed_draft: &Value,
    comment: String,
    published_by: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), FeatureOperationError> {
    let draft = match &feature.draft {
        Some(draft) if draft.active => draft.clone(),
        _ => return Err(ValidationError::NoDraft.into()),
    };

    if !draft_matches(&draft, reviewed_draft) {
        return Err(FeatureOperationError::DraftConflict);
    }

    if let Some(rules_by_env) = &draft.rules {
        validate_environments(organization, rules_by_env.keys())?;
    }

    if let Some(default_value) = draft.default_value {
        feature.default_value = default_value;
    }

    if let Some(mut rules_by_env) = draft.rules {
        // ids of rules in environments the draft leaves untouched stay reserved
        let mut taken: HashSet<String> = feature
            .environment_settings
            .iter()
            .filter(|(env, _)| !rules_by_env.contains_key(*env))
            .flat_map(|(_, settings)| &settings.rules)
            .filter_map(|rule| rule.id.clone())
            .collect();
        assign_rule_ids(rules_by_env.values_mut().flatten(), &mut taken);
        for (env, rules) in rules_by_env {
            feature.environment_settings.entry(env).or_default().rules = rules;
        }
    }

    let version = feature.revision.as_ref().map_or(1, |r| r.version + 1);
    feature.revision = Some(FeatureRevision {
        version,
        comment,
        date: now,
        published_by,
    });
    feature.draft = None;
    feature.date_updated = now;
    Ok(())
}

// Structural comparison: field order and formatting of the submitted draft don't matter
fn draft_matches(stored: &FeatureDraft, reviewed: &Value) -> bool {
    match serde_json::from_value::<FeatureDraft>(reviewed.clone()) {
        Ok(reviewed) => &reviewed == stored,
        Err(_) => false,
    }
}
