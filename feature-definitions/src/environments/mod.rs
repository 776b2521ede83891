pub mod environment_models;
pub mod project_filter;
