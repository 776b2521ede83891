pub mod feature_definitions;
pub mod feature_models;
pub mod feature_operations;
pub mod feature_service;
pub mod rule_compiler;
pub mod value_coercion;
pub mod weights;
