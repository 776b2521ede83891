use serde_json::Value;
use thiserror::Error;

use crate::features::{
    feature_models::{
        non_empty, CompiledRule, FeatureRule, NamespaceBound, NamespaceValue, RuleKind, ValueType,
    },
    value_coercion::{coerce, parse_float},
    weights::{clamp_unit, normalize},
};

/// Conditions stored as the empty object mean "no targeting" and are never emitted.
const EMPTY_CONDITION: &str = "{}";

#[derive(Error, Debug)]
#[error("invalid namespace bound {0:?}")]
pub struct InvalidBound(pub String);

/// Parses a stored targeting condition.
/// `Ok(None)` means there is nothing to emit, `Err` means the stored string was malformed.
pub fn parse_condition(condition: Option<&str>) -> Result<Option<Value>, serde_json::Error> {
    match condition {
        None | Some("") | Some(EMPTY_CONDITION) => Ok(None),
        Some(raw) => serde_json::from_str(raw).map(Some),
    }
}

pub fn parse_namespace_bound(bound: &NamespaceBound) -> Result<f64, InvalidBound> {
    match bound {
        NamespaceBound::Number(v) if v.is_finite() => Ok(*v),
        NamespaceBound::Number(v) => Err(InvalidBound(v.to_string())),
        NamespaceBound::Text(text) => parse_float(text).ok_or_else(|| InvalidBound(text.clone())),
        NamespaceBound::Malformed(value) => Err(InvalidBound(value.to_string())),
    }
}

fn compile_namespace(namespace: Option<&NamespaceValue>) -> Option<(String, f64, f64)> {
    let namespace = namespace.filter(|ns| ns.enabled && !ns.name.is_empty())?;
    let (low, high) = &namespace.range;
    Some((
        namespace.name.clone(),
        parse_namespace_bound(low).unwrap_or(0.0),
        parse_namespace_bound(high).unwrap_or(0.0),
    ))
}

/// Compiles one stored rule into its SDK form.
///
/// Only an unknown rule type yields `None`. Malformed conditions and namespace
/// bounds never fail the rule, they are dropped or zeroed instead.
pub fn compile_rule(rule: &FeatureRule, value_type: ValueType) -> Option<CompiledRule> {
    let condition = parse_condition(rule.condition.as_deref()).unwrap_or_else(|e| {
        tracing::debug!(rule_id = ?rule.id, error = %e, "dropping unparseable rule condition");
        None
    });

    let compiled = match &rule.kind {
        RuleKind::Force { value } => CompiledRule::Force {
            condition,
            force: coerce(value_type, value),
        },
        RuleKind::Experiment {
            values,
            coverage,
            tracking_key,
            hash_attribute,
            namespace,
        } => CompiledRule::Experiment {
            condition,
            variations: values
                .iter()
                .map(|v| coerce(value_type, &v.value))
                .collect(),
            coverage: *coverage,
            weights: values.iter().map(|v| normalize(v.weight)).collect(),
            key: non_empty(tracking_key).map(str::to_string),
            hash_attribute: non_empty(hash_attribute).map(str::to_string),
            namespace: compile_namespace(namespace.as_ref()),
        },
        RuleKind::Rollout {
            value,
            coverage,
            hash_attribute,
        } => CompiledRule::Rollout {
            condition,
            force: coerce(value_type, value),
            coverage: clamp_unit(*coverage),
            hash_attribute: non_empty(hash_attribute).map(str::to_string),
        },
        RuleKind::Unknown => {
            tracing::debug!(rule_id = ?rule.id, "skipping rule of unknown type");
            return None;
        }
    };

    Some(compiled)
}
