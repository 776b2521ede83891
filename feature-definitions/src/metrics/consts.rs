// Payload requests
pub const PAYLOAD_REQUESTS_COUNTER: &str = "feature_definitions_payload_requests_total";
pub const PAYLOAD_ERRORS_COUNTER: &str = "feature_definitions_payload_errors_total";
pub const PAYLOAD_ENCRYPTED_COUNTER: &str = "feature_definitions_payload_encrypted_total";

// Compilation
pub const FEATURES_COMPILED_COUNTER: &str = "feature_definitions_features_compiled_total";
pub const FEATURES_SKIPPED_COUNTER: &str = "feature_definitions_features_skipped_total";
pub const PAYLOAD_COMPILE_TIME: &str = "feature_definitions_compile_time";

// Feature lifecycle
pub const FEATURE_OPERATIONS_COUNTER: &str = "feature_definitions_feature_operations_total";
pub const WEBHOOKS_QUEUED_COUNTER: &str = "feature_definitions_webhooks_queued_total";
