use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix for rule ids assigned on the server when a stored rule has none.
pub const RULE_ID_PREFIX: &str = "fr_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Number,
    String,
    Json,
    // Stored documents occasionally carry a tag we don't know about; those coerce to null
    #[serde(other)]
    Unknown,
}

impl ValueType {
    pub fn is_known(&self) -> bool {
        !matches!(self, ValueType::Unknown)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExperimentValue {
    pub value: String,
    #[serde(default)]
    pub weight: f64,
}

/// A namespace range bound. Older documents store these as strings, and
/// anything else is kept as-is so one bad bound can't fail the whole document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NamespaceBound {
    Number(f64),
    Text(String),
    Malformed(Value),
}

impl From<Value> for NamespaceBound {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(n) => match n.as_f64() {
                Some(v) => NamespaceBound::Number(v),
                None => NamespaceBound::Malformed(Value::Number(n)),
            },
            Value::String(text) => NamespaceBound::Text(text),
            other => NamespaceBound::Malformed(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NamespaceValue {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default = "missing_range", deserialize_with = "deserialize_range")]
    pub range: (NamespaceBound, NamespaceBound),
}

fn missing_range() -> (NamespaceBound, NamespaceBound) {
    (
        NamespaceBound::Malformed(Value::Null),
        NamespaceBound::Malformed(Value::Null),
    )
}

// Takes the first two entries of whatever is stored. Missing entries become malformed bounds.
fn deserialize_range<'de, D>(deserializer: D) -> Result<(NamespaceBound, NamespaceBound), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        _ => vec![],
    };
    let mut bounds = items.into_iter().map(NamespaceBound::from);
    let (low, high) = missing_range();
    Ok((bounds.next().unwrap_or(low), bounds.next().unwrap_or(high)))
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleKind {
    Force {
        value: String,
    },
    #[serde(rename_all = "camelCase")]
    Experiment {
        #[serde(alias = "variations", default)]
        values: Vec<ExperimentValue>,
        #[serde(default = "full_coverage")]
        coverage: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tracking_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hash_attribute: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<NamespaceValue>,
    },
    #[serde(rename_all = "camelCase")]
    Rollout {
        value: String,
        #[serde(default = "full_coverage")]
        coverage: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hash_attribute: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

fn full_coverage() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FeatureRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(flatten)]
    pub kind: RuleKind,
}

/// Helpers to present empty strings the same way as missing ones, matching how documents are stored
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EnvironmentSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<FeatureRule>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureDraft {
    #[serde(default)]
    pub active: bool,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<BTreeMap<String, Vec<FeatureRule>>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRevision {
    pub version: u32,
    #[serde(default)]
    pub comment: String,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub id: String,
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub description: String,
    pub value_type: ValueType,
    pub default_value: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub environment_settings: BTreeMap<String, EnvironmentSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<FeatureDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<FeatureRevision>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl Feature {
    /// Environments this feature is currently switched on in, sorted.
    pub fn enabled_environments(&self) -> Vec<String> {
        self.environment_settings
            .iter()
            .filter(|(_, settings)| settings.enabled)
            .map(|(env, _)| env.clone())
            .collect()
    }
}

/// Shape of a feature as submitted for creation. Everything server-owned is filled in later.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFeature {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub description: String,
    pub value_type: Option<ValueType>,
    pub default_value: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub environment_settings: BTreeMap<String, EnvironmentSettings>,
}

/// The compiled, SDK-facing version of a single rule. Each variant only carries
/// the fields that matter for it; a forced value that coerced to null is still emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CompiledRule {
    Force {
        #[serde(skip_serializing_if = "Option::is_none")]
        condition: Option<Value>,
        force: Value,
    },
    #[serde(rename_all = "camelCase")]
    Experiment {
        #[serde(skip_serializing_if = "Option::is_none")]
        condition: Option<Value>,
        variations: Vec<Value>,
        coverage: f64,
        weights: Vec<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        hash_attribute: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        namespace: Option<(String, f64, f64)>,
    },
    #[serde(rename_all = "camelCase")]
    Rollout {
        #[serde(skip_serializing_if = "Option::is_none")]
        condition: Option<Value>,
        force: Value,
        coverage: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        hash_attribute: Option<String>,
    },
}

impl CompiledRule {
    pub fn condition(&self) -> Option<&Value> {
        match self {
            CompiledRule::Force { condition, .. }
            | CompiledRule::Experiment { condition, .. }
            | CompiledRule::Rollout { condition, .. } => condition.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledFeatureDefinition {
    pub default_value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<CompiledRule>>,
}

/// Compiled payload keyed by feature id. A BTreeMap keeps the serialized output stable.
pub type FeatureDefinitions = BTreeMap<String, CompiledFeatureDefinition>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_deserializes_by_type_tag() {
        let rule: FeatureRule = serde_json::from_value(json!({
            "id": "fr_1",
            "type": "experiment",
            "enabled": true,
            "condition": "{\"country\":\"US\"}",
            "values": [{"value": "a", "weight": 0.5}, {"value": "b", "weight": 0.5}],
            "coverage": 0.8,
            "trackingKey": "exp-1",
            "namespace": {"enabled": true, "name": "n1", "range": ["0.1", 0.6]}
        }))
        .unwrap();

        match rule.kind {
            RuleKind::Experiment {
                values,
                coverage,
                tracking_key,
                hash_attribute,
                namespace,
            } => {
                assert_eq!(values.len(), 2);
                assert_eq!(coverage, 0.8);
                assert_eq!(tracking_key.as_deref(), Some("exp-1"));
                assert!(hash_attribute.is_none());
                let namespace = namespace.unwrap();
                assert_eq!(namespace.range.0, NamespaceBound::Text("0.1".to_string()));
                assert_eq!(namespace.range.1, NamespaceBound::Number(0.6));
            }
            other => panic!("Expected experiment rule, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_namespace_range_still_deserializes() {
        let namespace = |range: Value| -> NamespaceValue {
            serde_json::from_value(json!({"enabled": true, "name": "n1", "range": range})).unwrap()
        };

        let null_low = namespace(json!([null, "0.5"]));
        assert_eq!(null_low.range.0, NamespaceBound::Malformed(Value::Null));
        assert_eq!(null_low.range.1, NamespaceBound::Text("0.5".to_string()));

        let short = namespace(json!(["0.1"]));
        assert_eq!(short.range.0, NamespaceBound::Text("0.1".to_string()));
        assert_eq!(short.range.1, NamespaceBound::Malformed(Value::Null));

        let nested = namespace(json!([{"low": 0}, [1]]));
        assert_eq!(nested.range.0, NamespaceBound::Malformed(json!({"low": 0})));
        assert_eq!(nested.range.1, NamespaceBound::Malformed(json!([1])));

        let not_a_list = namespace(json!("0.1-0.5"));
        assert_eq!(not_a_list.range, missing_range());

        let missing: NamespaceValue =
            serde_json::from_value(json!({"enabled": true, "name": "n1"})).unwrap();
        assert_eq!(missing.range, missing_range());
    }

    #[test]
    fn test_unknown_rule_type_is_preserved_as_unknown() {
        let rule: FeatureRule = serde_json::from_value(json!({
            "type": "schedule",
            "enabled": true,
            "value": "true"
        }))
        .unwrap();
        assert_eq!(rule.kind, RuleKind::Unknown);
        assert!(rule.enabled);
    }

    #[test]
    fn test_unknown_value_type() {
        let value_type: ValueType = serde_json::from_value(json!("date")).unwrap();
        assert_eq!(value_type, ValueType::Unknown);
        assert!(!value_type.is_known());
        assert!(ValueType::Json.is_known());
    }

    #[test]
    fn test_compiled_definition_omits_missing_rules() {
        let definition = CompiledFeatureDefinition {
            default_value: json!(true),
            rules: None,
        };
        assert_eq!(
            serde_json::to_value(&definition).unwrap(),
            json!({"defaultValue": true})
        );
    }

    #[test]
    fn test_compiled_force_rule_keeps_null_value() {
        let rule = CompiledRule::Force {
            condition: None,
            force: Value::Null,
        };
        assert_eq!(serde_json::to_value(&rule).unwrap(), json!({"force": null}));
    }
}
