use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::features::{
    feature_models::{CompiledFeatureDefinition, CompiledRule, Feature, FeatureDefinitions},
    rule_compiler::compile_rule,
    value_coercion::coerce,
};

/// Compiles a single feature for an environment.
///
/// Returns `None` when the feature must not appear in the payload at all:
/// it is archived, or the environment has no settings for it, or they are disabled.
pub fn compile_feature(feature: &Feature, environment: &str) -> Option<CompiledFeatureDefinition> {
    if feature.archived {
        return None;
    }

    let settings = feature
        .environment_settings
        .get(environment)
        .filter(|settings| settings.enabled)?;

    let rules: Vec<CompiledRule> = settings
        .rules
        .iter()
        .filter(|rule| rule.enabled)
        .filter_map(|rule| compile_rule(rule, feature.value_type))
        .collect();

    Some(CompiledFeatureDefinition {
        default_value: coerce(feature.value_type, &feature.default_value),
        rules: if rules.is_empty() { None } else { Some(rules) },
    })
}

/// Builds the SDK payload for one environment out of an already project-scoped set of features.
#[instrument(skip_all, fields(environment = %environment, features = features.len()))]
pub fn assemble(features: &[Feature], environment: &str) -> FeatureDefinitions {
    let definitions: FeatureDefinitions = features
        .iter()
        .filter_map(|feature| {
            compile_feature(feature, environment).map(|def| (feature.id.clone(), def))
        })
        .collect();

    tracing::debug!(
        compiled = definitions.len(),
        skipped = features.len() - definitions.len(),
        "assembled feature definitions"
    );

    definitions
}

/// Most recent update among the features that made it into the payload.
pub fn last_updated(
    features: &[Feature],
    definitions: &FeatureDefinitions,
) -> Option<DateTime<Utc>> {
    features
        .iter()
        .filter(|feature| definitions.contains_key(&feature.id))
        .map(|feature| feature.date_updated)
        .max()
}
